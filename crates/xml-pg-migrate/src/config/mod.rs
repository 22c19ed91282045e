//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::is_plain_identifier;

use crate::error::{MigrateError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Target schema name: the configured one, or the dump directory's base
    /// name with dots replaced by underscores (`stackoverflow.com` becomes
    /// `stackoverflow_com`).
    pub fn schema_name(&self) -> Result<String> {
        if let Some(schema) = &self.target.schema {
            return Ok(schema.clone());
        }

        let base = self
            .paths
            .xml_dumps_dir
            .file_name()
            .map(|n| n.to_string_lossy().replace(['.', '-', ' '], "_"))
            .unwrap_or_default();

        if !is_plain_identifier(&base) {
            return Err(MigrateError::Config(format!(
                "cannot derive a schema name from {:?}; set target.schema",
                self.paths.xml_dumps_dir
            )));
        }
        Ok(base)
    }
}
