//! # xml-pg-migrate
//!
//! Migrates per-table XML dumps plus a SQL Server flavoured DDL file into
//! PostgreSQL.
//!
//! - **DDL extraction** of tables and single-column foreign keys
//! - **Parallel dump inspection** to find the tables and columns that hold data
//! - **Filtered schema generation** with type mapping to PostgreSQL
//! - **Parallel batch import**, one transaction per table
//!
//! ## Example
//!
//! ```rust,no_run
//! use xml_pg_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> xml_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let orchestrator = Orchestrator::new(config)?;
//!     let result = orchestrator.run(CancellationToken::new(), false).await?;
//!     println!("Imported {} rows", result.rows_imported);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod ddl;
pub mod dump;
pub mod emit;
pub mod error;
pub mod import;
pub mod orchestrator;
pub mod target;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, PathsConfig, TargetConfig};
pub use ddl::{Column, Relation, Table};
pub use dump::{inspect_dumps, DumpShape};
pub use error::{MigrateError, Result};
pub use import::{import_tables, ImportConfig, ImportReport, TableOutcome, TableStatus};
pub use orchestrator::{
    HealthCheckResult, InspectionReport, MigrationResult, Orchestrator, RowCountCheck, TablePlan,
};
pub use target::PgTarget;
