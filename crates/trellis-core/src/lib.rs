pub mod board;
pub mod builtin;
pub mod checklist;
pub mod config;
pub mod document;
pub mod error;
pub mod github;
pub mod hierarchy;
pub mod io;
pub mod labels;
pub mod merge;
pub mod paths;
pub mod relation;
pub mod roadmap;
pub mod template;
pub mod tracker;

pub use error::{Result, TrellisError};
