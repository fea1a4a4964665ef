use crate::document::{Document, Mapping, Value};

/// Deep-merge `overrides` onto a copy of `base`.
///
/// Mappings present on both sides merge key by key; every other override
/// value (scalars, sequences, a mapping replacing a scalar) replaces the base
/// value wholesale. Keys only in `base` are kept, keys only in `overrides` are
/// added. Neither argument is modified.
pub fn merge(base: &Document, overrides: &Document) -> Document {
    let mut result = base.clone();
    deep_update(result.as_mapping_mut(), overrides.as_mapping());
    result
}

/// In-place form of [`merge`]: applies `update` to `target`.
pub fn deep_update(target: &mut Mapping, update: &Mapping) {
    for (key, value) in update {
        match (target.get_mut(key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(incoming)) => {
                deep_update(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Format;

    fn yaml(text: &str) -> Document {
        Document::parse(text, Format::Yaml).unwrap()
    }

    const BASE: &str = r###"
name: Bug Report
labels: [bug, needs-triage]
fields:
  title:
    description: A clear title
  body:
    template: "## Description"
    required: true
"###;

    #[test]
    fn empty_overrides_are_identity() {
        let base = yaml(BASE);
        assert_eq!(merge(&base, &Document::new()), base);
    }

    #[test]
    fn nested_leaf_overwritten_siblings_preserved() {
        let base = yaml(BASE);
        let overrides = yaml("fields:\n  body:\n    template: custom\n");
        let merged = merge(&base, &overrides);

        assert_eq!(merged.get_str("fields.body.template"), Some("custom"));
        assert_eq!(
            merged.get_path("fields.body.required"),
            Some(&Value::Bool(true))
        );
        assert_eq!(
            merged.get_str("fields.title.description"),
            Some("A clear title")
        );
        assert_eq!(merged.get_str("name"), Some("Bug Report"));
    }

    #[test]
    fn sequences_replaced_wholesale() {
        let base = yaml(BASE);
        let merged = merge(&base, &yaml("labels: [urgent]\n"));
        assert_eq!(merged.get_strings("labels"), vec!["urgent"]);
    }

    #[test]
    fn override_only_keys_added() {
        let base = yaml(BASE);
        let merged = merge(&base, &yaml("values:\n  quarter: Q3\n"));
        assert_eq!(merged.get_str("values.quarter"), Some("Q3"));
        assert_eq!(merged.len(), base.len() + 1);
    }

    #[test]
    fn mapping_replaces_scalar_and_scalar_replaces_mapping() {
        let base = yaml("a: 1\nb:\n  c: 2\n");
        let merged = merge(&base, &yaml("a:\n  x: y\nb: flat\n"));
        assert_eq!(merged.get_str("a.x"), Some("y"));
        assert_eq!(merged.get_str("b"), Some("flat"));
    }

    #[test]
    fn arguments_untouched() {
        let base = yaml(BASE);
        let overrides = yaml("fields:\n  body:\n    template: custom\n");
        let base_before = base.clone();
        let overrides_before = overrides.clone();
        let _ = merge(&base, &overrides);
        assert_eq!(base, base_before);
        assert_eq!(overrides, overrides_before);
    }

    #[test]
    fn every_override_leaf_lands_in_result() {
        let base = yaml(BASE);
        let overrides = yaml("name: Defect\nfields:\n  title:\n    description: Short\n  extra: 3\n");
        let merged = merge(&base, &overrides);
        assert_eq!(merged.get_str("name"), Some("Defect"));
        assert_eq!(merged.get_str("fields.title.description"), Some("Short"));
        assert_eq!(merged.get_path("fields.extra"), Some(&Value::Integer(3)));
    }
}
