//! Normalizer - canonical form for a single theme
//!
//! Pure: the output depends only on the definition passed in.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::error::{BuildError, Result};
use crate::theme::{AttributeValue, ColorLiteral, NormalizedTheme, Rgba, SourceValue, ThemeDefinition};

pub fn normalize(definition: &ThemeDefinition) -> Result<NormalizedTheme> {
    let mut attributes = BTreeMap::new();

    for (key, value) in &definition.attributes {
        let canonical = normalize_value(value).map_err(|kind| BuildError::UnsupportedValue {
            theme: definition.id.clone(),
            key: key.clone(),
            kind,
        })?;

        match attributes.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(canonical);
            }
            Entry::Occupied(_) => {
                return Err(BuildError::parse(
                    &definition.origin,
                    format!("attribute '{}' declared twice in theme '{}'", key, definition.id),
                ));
            }
        }
    }

    Ok(NormalizedTheme {
        id: definition.id.clone(),
        origin: definition.origin.clone(),
        attributes,
    })
}

/// Canonicalize one value, or name the kind that cannot be carried.
pub fn normalize_value(value: &SourceValue) -> std::result::Result<AttributeValue, String> {
    match value {
        SourceValue::Color(literal) => Ok(AttributeValue::Color(normalize_color(literal))),
        SourceValue::Text(s) => Ok(AttributeValue::Text(s.clone())),
        SourceValue::Number(n) => canonical_number(*n)
            .map(AttributeValue::Number)
            .ok_or_else(|| format!("non-finite number {}", n)),
        SourceValue::Unsupported(kind) => Err(format!("unsupported value type '{}'", kind)),
    }
}

/// Expand short hex to 8 bits per channel. Alpha survives only if authored.
pub fn normalize_color(literal: &ColorLiteral) -> Rgba {
    match *literal {
        ColorLiteral::Nibbles { rgb: [r, g, b], alpha } => Rgba {
            r: expand_nibble(r),
            g: expand_nibble(g),
            b: expand_nibble(b),
            a: alpha.map(expand_nibble),
        },
        ColorLiteral::Bytes { rgb: [r, g, b], alpha } => Rgba { r, g, b, a: alpha },
    }
}

fn expand_nibble(n: u8) -> u8 {
    (n & 0x0f) * 17
}

/// `-0.0` folds to `0.0`; non-finite values have no canonical form.
pub fn canonical_number(n: f64) -> Option<f64> {
    if !n.is_finite() {
        return None;
    }
    Some(if n == 0.0 { 0.0 } else { n })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn definition(attributes: Vec<(&str, SourceValue)>) -> ThemeDefinition {
        ThemeDefinition {
            id: "dark".to_string(),
            origin: PathBuf::from("themes/dark.json"),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    #[test]
    fn test_keys_sorted_bytewise() {
        let def = definition(vec![
            ("z", SourceValue::Number(1.0)),
            ("B", SourceValue::Number(2.0)),
            ("a", SourceValue::Number(3.0)),
        ]);
        let theme = normalize(&def).unwrap();
        let keys: Vec<_> = theme.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["B", "a", "z"]);
    }

    #[test]
    fn test_short_hex_expands() {
        let literal = ColorLiteral::Nibbles { rgb: [0xf, 0x0, 0xa], alpha: None };
        assert_eq!(normalize_color(&literal), Rgba::rgb(0xff, 0x00, 0xaa));

        let literal = ColorLiteral::Nibbles { rgb: [1, 2, 3], alpha: Some(0xf) };
        assert_eq!(normalize_color(&literal), Rgba::rgba(0x11, 0x22, 0x33, 0xff));
    }

    #[test]
    fn test_equivalent_spellings_normalize_identically() {
        let short = definition(vec![("bg", SourceValue::Color(ColorLiteral::Nibbles { rgb: [0xf, 0xf, 0xf], alpha: None }))]);
        let long = definition(vec![("bg", SourceValue::Color(ColorLiteral::Bytes { rgb: [255, 255, 255], alpha: None }))]);
        assert_eq!(normalize(&short).unwrap(), normalize(&long).unwrap());
    }

    #[test]
    fn test_negative_zero_folds() {
        let v = normalize_value(&SourceValue::Number(-0.0)).unwrap();
        match v {
            AttributeValue::Number(n) => assert!(n.is_sign_positive()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_kind_names_theme_and_key() {
        let def = definition(vec![("flag", SourceValue::Unsupported("boolean".into()))]);
        let err = normalize(&def).unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedValue { .. }));
        let msg = err.to_string();
        assert!(msg.contains("flag"));
        assert!(msg.contains("dark"));
        assert!(msg.contains("boolean"));
    }

    #[test]
    fn test_non_finite_number_rejected() {
        let def = definition(vec![("size", SourceValue::Number(f64::NAN))]);
        assert!(matches!(normalize(&def).unwrap_err(), BuildError::UnsupportedValue { .. }));
    }

    #[test]
    fn test_repeated_key_rejected() {
        let def = definition(vec![
            ("bg", SourceValue::Text("a".into())),
            ("bg", SourceValue::Text("b".into())),
        ]);
        assert!(matches!(normalize(&def).unwrap_err(), BuildError::Parse { .. }));
    }

    #[test]
    fn test_normalize_is_pure() {
        let def = definition(vec![
            ("fg", SourceValue::Color(ColorLiteral::Bytes { rgb: [1, 2, 3], alpha: Some(4) })),
            ("font", SourceValue::Text("Fira Code".into())),
        ]);
        assert_eq!(normalize(&def).unwrap(), normalize(&def).unwrap());
    }
}
