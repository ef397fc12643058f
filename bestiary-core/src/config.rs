//! Pipeline configuration.
//!
//! Every field has a default, so an empty file is valid:
//! ```toml
//! integer_columns = ["hp", "str", "dex", "con", "int", "wis", "cha", "ac"]
//! dropped_columns = ["align", "font", "additional_info", "author"]
//! delimiter = ","
//! ```

use crate::error::{BestiaryError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Columns coerced to integers, with `-1` for unreadable values.
    pub integer_columns: Vec<String>,
    /// Columns removed from the main table before it is flushed.
    pub dropped_columns: Vec<String>,
    pub delimiter: char,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            integer_columns: ["hp", "str", "dex", "con", "int", "wis", "cha", "ac"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            dropped_columns: ["align", "font", "additional_info", "author"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            delimiter: ',',
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BestiaryError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read pipeline config from {:?}: {}", path, e),
            ))
        })?;

        Self::from_str(&content)
    }

    /// Parse pipeline configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            BestiaryError::Config(format!("Failed to parse pipeline config TOML: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() {
            return Err(BestiaryError::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )));
        }
        if let Some(column) = self.integer_columns.iter().find(|c| c.trim().is_empty()) {
            return Err(BestiaryError::Config(format!(
                "integer_columns contains an empty name: {:?}",
                column
            )));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        // validate() guarantees ASCII
        self.delimiter as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PipelineConfig::from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.integer_columns.len(), 8);
        assert_eq!(config.delimiter_byte(), b',');
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
delimiter = ";"
dropped_columns = ["align"]
"#;
        let config = PipelineConfig::from_str(toml).unwrap();
        assert_eq!(config.delimiter_byte(), b';');
        assert_eq!(config.dropped_columns, vec!["align".to_string()]);
    }

    #[test]
    fn test_rejects_unknown_keys_and_bad_values() {
        assert!(PipelineConfig::from_str("relation = \"x\"").is_err());
        assert!(PipelineConfig::from_str("integer_columns = [\"hp\", \" \"]").is_err());
        assert!(PipelineConfig::from_str("delimiter = \"é\"").is_err());
    }
}
