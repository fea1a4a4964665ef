use std::path::{Path, PathBuf};
use trellis_core::paths;

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `TRELLIS_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of the working directory containing `.trellis/`
/// 3. Nearest ancestor containing `.git/`
/// 4. The working directory itself
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_marker(&cwd, paths::TRELLIS_DIR)
        .or_else(|| find_marker(&cwd, ".git"))
        .unwrap_or(cwd)
}

fn find_marker(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}
