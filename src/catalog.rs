//! Token catalog
//!
//! A token is identified solely by how many contacts its base produces. The
//! catalog is immutable once loaded and is consulted only when a new object
//! is created; re-matching of tracked objects never re-classifies them.

use crate::cluster::Cluster;
use crate::error::TrackingError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A physical token model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenType {
    /// Stable identifier (e.g. "prod_a")
    pub type_id: String,
    /// Display name
    pub name: String,
    /// Short descriptive line shown under the name
    #[serde(default)]
    pub subtitle: String,
    /// Number of simultaneous contacts the base produces
    pub contact_count: usize,
    /// Key of the external effect (map region) this token can light up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_key: Option<String>,
    /// Accent colour for the presentation layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl TokenType {
    fn builtin(
        type_id: &str,
        name: &str,
        subtitle: &str,
        contact_count: usize,
        effect_key: &str,
        color: &str,
    ) -> Self {
        Self {
            type_id: type_id.to_string(),
            name: name.to_string(),
            subtitle: subtitle.to_string(),
            contact_count,
            effect_key: Some(effect_key.to_string()),
            color: Some(color.to_string()),
        }
    }
}

/// The set of known tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub tokens: Vec<TokenType>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            tokens: vec![
                TokenType::builtin("prod_a", "PROD A", "4-POINT SERIES", 4, "karnataka", "#ef4444"),
                TokenType::builtin("prod_b", "PROD B", "5-POINT SERIES", 5, "tamilnadu", "#f97316"),
                TokenType::builtin("prod_c", "PROD C", "6-POINT SERIES", 6, "kerala", "#eab308"),
                TokenType::builtin("prod_d", "PROD D", "7-POINT SERIES", 7, "andhra", "#84cc16"),
                TokenType::builtin("prod_e", "PROD E", "9-POINT SERIES", 9, "telangana", "#3b82f6"),
            ],
        }
    }
}

impl Catalog {
    pub fn new(tokens: Vec<TokenType>) -> Self {
        Self { tokens }
    }

    /// Exact-count lookup. No fuzzy matching here.
    pub fn classify(&self, cluster: &Cluster) -> Option<&TokenType> {
        self.by_contact_count(cluster.count)
    }

    pub fn by_contact_count(&self, count: usize) -> Option<&TokenType> {
        self.tokens.iter().find(|t| t.contact_count == count)
    }

    pub fn get(&self, type_id: &str) -> Option<&TokenType> {
        self.tokens.iter().find(|t| t.type_id == type_id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Check the catalog is usable with the given noise floor
    pub fn validate(&self, min_cluster_size: usize) -> Result<(), TrackingError> {
        if self.tokens.is_empty() {
            return Err(TrackingError::InvalidCatalog("catalog is empty".to_string()));
        }

        let mut ids = HashSet::new();
        let mut counts = HashSet::new();
        for token in &self.tokens {
            if token.type_id.trim().is_empty() {
                return Err(TrackingError::InvalidCatalog(
                    "token with empty type_id".to_string(),
                ));
            }
            if !ids.insert(token.type_id.as_str()) {
                return Err(TrackingError::InvalidCatalog(format!(
                    "duplicate type_id {}",
                    token.type_id
                )));
            }
            if !counts.insert(token.contact_count) {
                return Err(TrackingError::InvalidCatalog(format!(
                    "contact count {} is used by more than one token",
                    token.contact_count
                )));
            }
            if token.contact_count < min_cluster_size {
                return Err(TrackingError::InvalidCatalog(format!(
                    "{} needs {} contacts, below the minimum cluster size {}",
                    token.type_id, token.contact_count, min_cluster_size
                )));
            }
        }
        Ok(())
    }

    /// Load a catalog from JSON, either `{"tokens": [...]}` or a bare array
    pub fn from_json(json: &str) -> Result<Self, TrackingError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let catalog = if value.is_array() {
            Catalog::new(serde_json::from_value(value)?)
        } else {
            serde_json::from_value(value)?
        };
        Ok(catalog)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_of(count: usize) -> Cluster {
        Cluster {
            x: 0.0,
            y: 0.0,
            count,
            angle: 0.0,
        }
    }

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = Catalog::default();
        assert_eq!(catalog.len(), 5);
        assert!(catalog.validate(3).is_ok());
    }

    #[test]
    fn test_classify_exact_count() {
        let catalog = Catalog::default();
        assert_eq!(catalog.classify(&cluster_of(4)).unwrap().type_id, "prod_a");
        assert_eq!(catalog.classify(&cluster_of(9)).unwrap().type_id, "prod_e");
        // no 8-point token
        assert!(catalog.classify(&cluster_of(8)).is_none());
        assert!(catalog.classify(&cluster_of(3)).is_none());
    }

    #[test]
    fn test_rejects_duplicate_counts() {
        let mut catalog = Catalog::default();
        catalog.tokens[1].contact_count = 4;
        assert!(matches!(
            catalog.validate(3),
            Err(TrackingError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn test_rejects_undetectable_token() {
        let mut catalog = Catalog::default();
        catalog.tokens[0].contact_count = 2;
        assert!(catalog.validate(3).is_err());
    }

    #[test]
    fn test_from_json_bare_array() {
        let json = r#"[
            {"type_id": "mug", "name": "Mug", "contact_count": 3},
            {"type_id": "plate", "name": "Plate", "contact_count": 8, "effect_key": "goa"}
        ]"#;
        let catalog = Catalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("plate").unwrap().effect_key.as_deref(), Some("goa"));
        assert!(catalog.get("mug").unwrap().effect_key.is_none());
    }

    #[test]
    fn test_from_json_object() {
        let json = Catalog::default().to_json().unwrap();
        assert_eq!(Catalog::from_json(&json).unwrap(), Catalog::default());
    }
}
