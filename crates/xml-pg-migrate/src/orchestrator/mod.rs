//! Migration orchestrator - main workflow coordinator.
//!
//! Phases of a run:
//! 1. parse the source DDL,
//! 2. inspect the XML dumps,
//! 3. write the filtered schema (a dry run stops here),
//! 4. connect and execute that schema,
//! 5. import the rows.

use crate::config::Config;
use crate::ddl::{self, Relation, Table};
use crate::dump::{self, DumpShape};
use crate::emit;
use crate::error::{MigrateError, Result};
use crate::import::{self, select_columns, ImportConfig, ImportReport, TableOutcome, TableStatus};
use crate::target::PgTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    schema: String,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: completed, completed_with_errors or dry_run.
    pub status: String,

    /// Target schema the tables were created in.
    pub schema: String,

    /// Filtered schema file written during the run.
    pub schema_file: PathBuf,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Time spent inspecting dumps.
    pub inspect_seconds: f64,

    /// Time spent importing rows.
    pub import_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Tables declared in the DDL.
    pub tables_declared: usize,

    /// Dump files found.
    pub tables_discovered: usize,

    /// Tables loaded and committed.
    pub tables_imported: usize,

    /// Tables whose import failed.
    pub tables_failed: usize,

    /// Tables scheduled but without any common column.
    pub tables_skipped: usize,

    /// Total rows committed.
    pub rows_imported: u64,

    /// Average import throughput (rows/second).
    pub rows_per_second: u64,

    /// List of failed table names.
    pub failed_tables: Vec<String>,

    /// Per-table outcomes in declared order.
    pub tables: Vec<TableOutcome>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// How one declared table relates to the dumps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePlan {
    pub table: String,
    pub declared_columns: usize,
    pub discovered_columns: usize,
    /// Columns that will be created and imported, in declared order.
    pub columns: Vec<String>,
    /// Well-formed rows in the dump.
    pub rows: u64,
    /// import, no_dump or no_common_columns.
    pub action: String,
}

/// Result of the inspection phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionReport {
    pub schema: String,
    pub tables: Vec<TablePlan>,
    /// Dumps with no matching declared table.
    pub undeclared_dumps: Vec<String>,
    pub foreign_keys: usize,
    pub duration_seconds: f64,
}

/// Row count comparison between a dump and its imported table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowCountCheck {
    pub table: String,
    pub dump_rows: u64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub schema_file_readable: bool,
    pub dump_files: usize,
    pub healthy: bool,
}

/// Declared schema plus what the dumps contain.
struct Discovery {
    tables: Vec<Table>,
    relations: Vec<Relation>,
    dumps: HashMap<String, DumpShape>,
    inspect_seconds: f64,
}

impl Orchestrator {
    /// Create a new orchestrator. Resolves the target schema name.
    pub fn new(config: Config) -> Result<Self> {
        let schema = config.schema_name()?;
        Ok(Self { config, schema })
    }

    /// Target schema name.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the migration. With `dry_run` the filtered schema file is written
    /// but the target database is never contacted.
    pub async fn run(&self, cancel: CancellationToken, dry_run: bool) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        let discovery = self.discover(&cancel).await?;

        info!("Phase 3: Writing filtered schema");
        let sql = emit::write_filtered_schema(
            &discovery.tables,
            &discovery.relations,
            &discovery.dumps,
            &self.schema,
            self.config.migration.drop_existing,
            &self.config.paths.output_sql_file,
        )?;

        let mut import_seconds = 0.0;
        let report = if dry_run {
            info!("Dry run: skipping schema execution and import");
            ImportReport::default()
        } else {
            info!("Phase 4: Creating schema {}", self.schema);
            let target = self.connect().await?;
            target.execute_script(&sql).await?;

            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            info!("Phase 5: Importing data");
            let import_start = Instant::now();
            let report = import::import_tables(
                target.pool(),
                &discovery.tables,
                &discovery.dumps,
                &self.config.paths.xml_dumps_dir,
                &self.schema,
                &self.import_config(),
                cancel.clone(),
            )
            .await;
            target.close();
            let report = report?;
            import_seconds = import_start.elapsed().as_secs_f64();

            if cancel.is_cancelled() {
                warn!(
                    "Migration cancelled after committing {} rows",
                    report.total_rows()
                );
                return Err(MigrateError::Cancelled);
            }
            report
        };

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let rows = report.total_rows();
        let rows_per_second = if import_seconds > 0.0 {
            (rows as f64 / import_seconds) as u64
        } else {
            0
        };
        let failed_tables = report.failed_tables();

        let status = if dry_run {
            "dry_run"
        } else if failed_tables.is_empty() {
            "completed"
        } else {
            "completed_with_errors"
        };

        info!(
            "Migration {}: {} rows in {:.2}s ({} rows/sec)",
            status, rows, duration, rows_per_second
        );
        if !failed_tables.is_empty() {
            warn!("Failed tables: {}", failed_tables.join(", "));
        }

        Ok(MigrationResult {
            run_id,
            status: status.to_string(),
            schema: self.schema.clone(),
            schema_file: self.config.paths.output_sql_file.clone(),
            duration_seconds: duration,
            inspect_seconds: discovery.inspect_seconds,
            import_seconds,
            started_at,
            completed_at,
            tables_declared: discovery.tables.len(),
            tables_discovered: discovery.dumps.len(),
            tables_imported: report.count(TableStatus::Completed),
            tables_failed: failed_tables.len(),
            tables_skipped: report.count(TableStatus::Skipped),
            rows_imported: rows,
            rows_per_second,
            failed_tables,
            tables: report.tables,
        })
    }

    /// Parse the DDL and inspect the dumps without touching the target.
    pub async fn inspect(&self, cancel: CancellationToken) -> Result<InspectionReport> {
        let discovery = self.discover(&cancel).await?;
        Ok(self.plan(&discovery))
    }

    /// Write the filtered schema file without touching the target.
    pub async fn generate(&self, cancel: CancellationToken) -> Result<InspectionReport> {
        let discovery = self.discover(&cancel).await?;
        emit::write_filtered_schema(
            &discovery.tables,
            &discovery.relations,
            &discovery.dumps,
            &self.schema,
            self.config.migration.drop_existing,
            &self.config.paths.output_sql_file,
        )?;
        Ok(self.plan(&discovery))
    }

    /// Compare dump row counts with the rows present in the target tables.
    pub async fn validate(&self, cancel: CancellationToken) -> Result<Vec<RowCountCheck>> {
        let discovery = self.discover(&cancel).await?;
        let target = self.connect().await?;
        let mut results = Vec::new();

        for table in &discovery.tables {
            let Some(shape) = discovery.dumps.get(&table.name) else {
                continue;
            };
            if select_columns(table, shape).is_empty() {
                continue;
            }

            let target_rows = match target.get_row_count(&self.schema, &table.name).await {
                Ok(count) => count,
                Err(e) => {
                    warn!("{}: cannot count target rows: {}", table.name, e);
                    -1
                }
            };
            let matches = target_rows >= 0 && target_rows as u64 == shape.rows;

            if matches {
                info!("{}: {} rows (match)", table.name, shape.rows);
            } else {
                warn!(
                    "{}: dump={} target={} (MISMATCH)",
                    table.name, shape.rows, target_rows
                );
            }
            results.push(RowCountCheck {
                table: table.name.clone(),
                dump_rows: shape.rows,
                target_rows,
                matches,
            });
        }

        target.close();
        Ok(results)
    }

    /// Check that the target is reachable and the input paths are usable.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let (target_connected, target_error) = match PgTarget::new(&self.config.target, 1).await {
            Ok(target) => {
                target.close();
                (true, None)
            }
            Err(e) => (false, Some(e.to_string())),
        };
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let schema_file_readable = std::fs::metadata(&self.config.paths.schema_file)
            .map(|m| m.is_file())
            .unwrap_or(false);
        let dump_files = dump::discover_dump_files(&self.config.paths.xml_dumps_dir).len();

        Ok(HealthCheckResult {
            target_connected,
            target_latency_ms,
            target_error,
            schema_file_readable,
            dump_files,
            healthy: target_connected && schema_file_readable && dump_files > 0,
        })
    }

    async fn discover(&self, cancel: &CancellationToken) -> Result<Discovery> {
        info!("Phase 1: Parsing schema {:?}", self.config.paths.schema_file);
        let (tables, relations) = ddl::load_schema(&self.config.paths.schema_file)?;

        if cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }

        info!(
            "Phase 2: Inspecting dumps in {:?}",
            self.config.paths.xml_dumps_dir
        );
        let start = Instant::now();
        let dumps = dump::inspect_dumps(
            &self.config.paths.xml_dumps_dir,
            self.config.migration.get_inspect_workers(),
            cancel.clone(),
        )
        .await;
        let inspect_seconds = start.elapsed().as_secs_f64();

        if cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }

        Ok(Discovery {
            tables,
            relations,
            dumps,
            inspect_seconds,
        })
    }

    fn plan(&self, discovery: &Discovery) -> InspectionReport {
        let tables = discovery
            .tables
            .iter()
            .map(|table| match discovery.dumps.get(&table.name) {
                Some(shape) => {
                    let columns: Vec<String> = select_columns(table, shape)
                        .into_iter()
                        .map(|c| c.name.clone())
                        .collect();
                    let action = if columns.is_empty() {
                        "no_common_columns"
                    } else {
                        "import"
                    };
                    TablePlan {
                        table: table.name.clone(),
                        declared_columns: table.columns.len(),
                        discovered_columns: shape.columns.len(),
                        columns,
                        rows: shape.rows,
                        action: action.to_string(),
                    }
                }
                None => TablePlan {
                    table: table.name.clone(),
                    declared_columns: table.columns.len(),
                    discovered_columns: 0,
                    columns: Vec::new(),
                    rows: 0,
                    action: "no_dump".to_string(),
                },
            })
            .collect();

        let mut undeclared_dumps: Vec<String> = discovery
            .dumps
            .keys()
            .filter(|name| !discovery.tables.iter().any(|t| &t.name == *name))
            .cloned()
            .collect();
        undeclared_dumps.sort();

        InspectionReport {
            schema: self.schema.clone(),
            tables,
            undeclared_dumps,
            foreign_keys: discovery.relations.len(),
            duration_seconds: discovery.inspect_seconds,
        }
    }

    async fn connect(&self) -> Result<PgTarget> {
        PgTarget::new(
            &self.config.target,
            self.config.migration.get_max_pg_connections(),
        )
        .await
    }

    fn import_config(&self) -> ImportConfig {
        ImportConfig {
            workers: self.config.migration.get_workers(),
            batch_size: self.config.migration.batch_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const DDL: &str = "CREATE TABLE Users (Id int, Name nvarchar(50), CreatedAt datetime);\n\
                       CREATE TABLE Badges (Id int, UserId int);\n";

    fn setup() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let dumps = dir.path().join("stackoverflow.com");
        fs::create_dir(&dumps).unwrap();
        fs::write(
            dumps.join("Users.xml"),
            r#"<users><row Id="1" Name="Ann"/><row Id="2" Name="Bob" Location="Oslo"/></users>"#,
        )
        .unwrap();
        fs::write(dumps.join("Tags.xml"), r#"<tags><row Id="1"/></tags>"#).unwrap();
        fs::write(dir.path().join("schema.sql"), DDL).unwrap();

        let yaml = format!(
            "target:\n  host: localhost\n  database: stack\n  user: postgres\n\
             paths:\n  xml_dumps_dir: {}\n  schema_file: {}\n  output_sql_file: {}\n",
            dumps.display(),
            dir.path().join("schema.sql").display(),
            dir.path().join("filtered_schema.sql").display()
        );
        let config = Config::from_yaml(&yaml).unwrap();
        (dir, config)
    }

    #[tokio::test]
    async fn test_dry_run_writes_schema_only() {
        let (dir, config) = setup();
        let orchestrator = Orchestrator::new(config).unwrap();
        assert_eq!(orchestrator.schema(), "stackoverflow_com");

        let result = orchestrator
            .run(CancellationToken::new(), true)
            .await
            .unwrap();

        assert_eq!(result.status, "dry_run");
        assert_eq!(result.tables_declared, 2);
        assert_eq!(result.tables_discovered, 2);
        assert_eq!(result.rows_imported, 0);

        let sql = fs::read_to_string(dir.path().join("filtered_schema.sql")).unwrap();
        assert!(sql.contains("\"stackoverflow_com\".\"Users\""));
        assert!(!sql.contains("\"Badges\""));
        assert!(!sql.contains("\"Location\""));
        assert!(!sql.contains("\"CreatedAt\""));
    }

    #[tokio::test]
    async fn test_inspect_reports_plan() {
        let (_dir, config) = setup();
        let report = Orchestrator::new(config)
            .unwrap()
            .inspect(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.tables.len(), 2);
        assert_eq!(report.tables[0].action, "import");
        assert_eq!(report.tables[0].columns, vec!["Id", "Name"]);
        assert_eq!(report.tables[0].rows, 2);
        assert_eq!(report.tables[1].action, "no_dump");
        assert_eq!(report.undeclared_dumps, vec!["Tags"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (_dir, config) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Orchestrator::new(config)
            .unwrap()
            .run(cancel, true)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_schema_file_is_io_error() {
        let (dir, mut config) = setup();
        config.paths.schema_file = dir.path().join("absent.sql");
        let err = Orchestrator::new(config)
            .unwrap()
            .generate(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Io(_)));
        assert!(!Path::new(&dir.path().join("filtered_schema.sql")).exists());
    }
}
