//! Configuration for the soma engine.
//!
//! Maps directly to `soma.toml`; every field has a default so an empty
//! document is a valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level soma engine configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SomaConfig {
    /// Part-graph behavior.
    #[serde(default)]
    pub graph: GraphConfig,
    /// Blueprint validation limits.
    #[serde(default)]
    pub blueprint: BlueprintConfig,
    /// Spirit retethering policy.
    #[serde(default)]
    pub spirits: SpiritConfig,
}

impl SomaConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`SomaError::Config`](crate::SomaError::Config) if the TOML
    /// is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::SomaError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::SomaError::Config(e.to_string()))?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Part-graph behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Integrity assigned to connections created without an explicit value.
    #[serde(default = "default_integrity")]
    pub default_connection_integrity: f32,
    /// Tolerance when checking that relative sizes sum to 1.0.
    #[serde(default = "default_epsilon")]
    pub size_epsilon: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_connection_integrity: 1.0,
            size_epsilon: 1e-4,
        }
    }
}

/// Blueprint validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintConfig {
    /// Hard cap on parts per blueprint-built body.
    #[serde(default = "default_max_parts")]
    pub max_parts: usize,
}

impl Default for BlueprintConfig {
    fn default() -> Self {
        Self { max_parts: 256 }
    }
}

/// Spirit retethering policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpiritConfig {
    /// Whether a `MoveTo` target outside the current owning soma set
    /// ejects the spirit (`true`) or leaves it in place (`false`).
    #[serde(default = "default_true")]
    pub eject_on_invalid_move: bool,
}

impl Default for SpiritConfig {
    fn default() -> Self {
        Self {
            eject_on_invalid_move: true,
        }
    }
}

fn default_integrity() -> f32 {
    1.0
}

fn default_epsilon() -> f32 {
    1e-4
}

fn default_max_parts() -> usize {
    256
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = SomaConfig::from_toml("").expect("parse");
        assert!((config.graph.default_connection_integrity - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.blueprint.max_parts, 256);
        assert!(config.spirits.eject_on_invalid_move);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config = SomaConfig::from_toml(
            r#"
            [graph]
            default_connection_integrity = 0.8

            [blueprint]
            max_parts = 32
            "#,
        )
        .expect("parse");
        assert!((config.graph.default_connection_integrity - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.blueprint.max_parts, 32);
        // Untouched section keeps its default.
        assert!((config.graph.size_epsilon - 1e-4).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        assert!(matches!(
            SomaConfig::from_toml("graph = 3"),
            Err(crate::SomaError::Config(_))
        ));
    }
}
