//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

/// Default number of rows per INSERT batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of logical CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len().max(1);

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Input and output file locations.
    pub paths: PathsConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.migration = self.migration.with_auto_tuning(&resources);
        self
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema. Derived from the dump directory name when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// SSL mode: disable, require, verify-ca, verify-full (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Input and output file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding one `<table>.xml` dump per table.
    pub xml_dumps_dir: PathBuf,

    /// Source DDL file with CREATE TABLE and ALTER TABLE ... FOREIGN KEY statements.
    pub schema_file: PathBuf,

    /// Where the filtered PostgreSQL schema is written.
    #[serde(default = "default_output_sql_file")]
    pub output_sql_file: PathBuf,
}

/// Migration behavior configuration.
/// Performance-related fields use Option<T> to distinguish between
/// "not set" (use auto-tuned default) and "explicitly set" (use provided value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Number of parallel import workers. Auto-tuned to CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Number of parallel dump inspection workers. Auto-tuned to 2x CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspect_workers: Option<usize>,

    /// Rows per multi-row INSERT statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum PostgreSQL connections. Auto-tuned from workers if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pg_connections: Option<usize>,

    /// Emit DROP TABLE ... CASCADE for imported tables before creating them (default: true).
    #[serde(default = "default_true")]
    pub drop_existing: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            workers: None,
            inspect_workers: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_pg_connections: None,
            drop_existing: true,
        }
    }
}

impl MigrationConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        let cores = resources.cpu_cores.max(1);

        // One import worker per core; each holds a connection and a transaction
        if self.workers.is_none() {
            self.workers = Some(cores);
        }

        // Inspection is mostly IO bound, so oversubscribe
        if self.inspect_workers.is_none() {
            self.inspect_workers = Some(cores * 2);
        }

        // Every worker needs one connection, plus headroom for schema execution
        if self.max_pg_connections.is_none() {
            let conns = (self.get_workers() + 2).min(64);
            self.max_pg_connections = Some(conns);
        }

        info!(
            "Auto-tuned config: workers={}, inspect_workers={}, batch_size={}, pg_conns={}",
            self.get_workers(),
            self.get_inspect_workers(),
            self.batch_size,
            self.get_max_pg_connections(),
        );

        self
    }

    // Accessors return the effective value (with fallback defaults)
    // for configs that haven't been auto-tuned yet.

    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(4)
    }

    pub fn get_inspect_workers(&self) -> usize {
        self.inspect_workers.unwrap_or(8)
    }

    pub fn get_max_pg_connections(&self) -> usize {
        self.max_pg_connections
            .unwrap_or_else(|| self.get_workers() + 2)
    }
}

// Default value functions for serde
fn default_pg_port() -> u16 {
    5432
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_output_sql_file() -> PathBuf {
    PathBuf::from("filtered_schema.sql")
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}
