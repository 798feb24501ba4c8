/// Municipality registry for the regional income map.
///
/// Defines the canonical list of municipalities whose sub-regions are
/// fetched, optimized and joined. The boundary filter and the configuration
/// defaults take their municipality codes from here.

use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Municipality metadata
// ---------------------------------------------------------------------------

/// Metadata for a single municipality.
pub struct Municipality {
    /// Three-digit Statistics Finland municipality code, zero-padded.
    pub code: &'static str,
    /// Finnish name, as used in the statistics area labels.
    pub name: &'static str,
}

/// The three capital-region municipalities covered by the income map.
///
/// Sources:
///   - Codes: Statistics Finland municipality classification
///   - Boundaries: Helsinki region map service, `Seutukartta_aluejako_pienalue`
pub static MUNICIPALITY_REGISTRY: &[Municipality] = &[
    Municipality {
        code: "091",
        name: "Helsinki",
    },
    Municipality {
        code: "049",
        name: "Espoo",
    },
    Municipality {
        code: "092",
        name: "Vantaa",
    },
];

/// Returns every registered municipality code.
pub fn all_municipality_codes() -> Vec<&'static str> {
    MUNICIPALITY_REGISTRY.iter().map(|m| m.code).collect()
}

/// Returns the registered codes as an owned set, the shape the boundary
/// filter and the configuration expect.
pub fn default_allowed_codes() -> BTreeSet<String> {
    all_municipality_codes()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Looks up a municipality by code. Returns `None` if not registered.
pub fn find_municipality(code: &str) -> Option<&'static Municipality> {
    MUNICIPALITY_REGISTRY.iter().find(|m| m.code == code)
}

/// Normalizes a raw municipality attribute into the zero-padded string form.
///
/// The map service usually reports `kunta` as a string ("091") but numeric
/// attributes (`91`) occur in some layers; both normalize to "091".
pub fn normalize_municipality_code(raw: &serde_json::Value) -> Option<String> {
    match raw {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                Some(format!("{:0>3}", trimmed))
            } else {
                None
            }
        }
        serde_json::Value::Number(n) => n.as_u64().map(|v| format!("{:03}", v)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_municipality_codes_are_three_digits() {
        for municipality in MUNICIPALITY_REGISTRY {
            assert_eq!(
                municipality.code.len(),
                3,
                "code for '{}' should be 3 digits, got '{}'",
                municipality.name,
                municipality.code
            );
            assert!(
                municipality.code.chars().all(|c| c.is_ascii_digit()),
                "code for '{}' should be numeric, got '{}'",
                municipality.name,
                municipality.code
            );
        }
    }

    #[test]
    fn test_no_duplicate_municipality_codes() {
        let mut seen = std::collections::HashSet::new();
        for municipality in MUNICIPALITY_REGISTRY {
            assert!(
                seen.insert(municipality.code),
                "duplicate municipality code '{}' in MUNICIPALITY_REGISTRY",
                municipality.code
            );
        }
    }

    #[test]
    fn test_registry_contains_capital_region() {
        let codes = all_municipality_codes();
        for expected in ["091", "049", "092"] {
            assert!(codes.contains(&expected), "registry missing '{}'", expected);
        }
        assert_eq!(default_allowed_codes().len(), MUNICIPALITY_REGISTRY.len());
    }

    #[test]
    fn test_find_municipality() {
        assert_eq!(find_municipality("049").map(|m| m.name), Some("Espoo"));
        assert!(find_municipality("000").is_none());
    }

    #[test]
    fn test_normalize_municipality_code_variants() {
        assert_eq!(normalize_municipality_code(&json!("091")), Some("091".to_string()));
        assert_eq!(normalize_municipality_code(&json!(" 49 ")), Some("049".to_string()));
        assert_eq!(normalize_municipality_code(&json!(92)), Some("092".to_string()));
        assert_eq!(normalize_municipality_code(&json!("Helsinki")), None);
        assert_eq!(normalize_municipality_code(&json!(null)), None);
    }
}
