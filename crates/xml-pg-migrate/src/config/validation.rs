//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::target::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    SslMode::parse(&config.target.ssl_mode)?;

    if let Some(schema) = &config.target.schema {
        if !is_plain_identifier(schema) {
            return Err(MigrateError::Config(format!(
                "target.schema '{}' must be a plain identifier ([A-Za-z_][A-Za-z0-9_]*)",
                schema
            )));
        }
    }

    // Paths validation
    if config.paths.xml_dumps_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("paths.xml_dumps_dir is required".into()));
    }
    if config.paths.schema_file.as_os_str().is_empty() {
        return Err(MigrateError::Config("paths.schema_file is required".into()));
    }
    if config.paths.output_sql_file.as_os_str().is_empty() {
        return Err(MigrateError::Config(
            "paths.output_sql_file must not be empty".into(),
        ));
    }

    // Migration config validation - only check if explicitly set
    if let Some(0) = config.migration.workers {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.inspect_workers {
        return Err(MigrateError::Config(
            "migration.inspect_workers must be at least 1".into(),
        ));
    }
    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = config.migration.max_pg_connections {
        return Err(MigrateError::Config(
            "migration.max_pg_connections must be at least 1".into(),
        ));
    }

    Ok(())
}

/// Whether `name` can be spliced into SQL unquoted.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, PathsConfig, TargetConfig};
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config {
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "target_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: None,
                ssl_mode: "disable".to_string(),
            },
            paths: PathsConfig {
                xml_dumps_dir: PathBuf::from("dumps/stackoverflow.com"),
                schema_file: PathBuf::from("schema.sql"),
                output_sql_file: PathBuf::from("out.sql"),
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.target.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_schema_must_be_identifier() {
        let mut config = valid_config();
        config.target.schema = Some("stack; DROP TABLE x".to_string());
        assert!(validate(&config).is_err());

        config.target.schema = Some("stackoverflow_com".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.migration.workers = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("Users"));
        assert!(is_plain_identifier("_tmp_1"));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier("a.b"));
        assert!(!is_plain_identifier(""));
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }
}
