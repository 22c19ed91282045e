//! Parallel batch import of dump rows into the target schema.
//!
//! Each table is loaded by one worker inside one transaction. Triggers
//! (including foreign key enforcement) are disabled and re-enabled inside
//! that same transaction, so a table that fails or is cancelled rolls back
//! both its rows and its trigger state.

mod batch;
mod table;

pub use batch::{
    build_insert_sql, effective_batch_size, fill_batches, write_batches, Batch, BatchSink,
    ReadSummary, WriteStats, MAX_BIND_PARAMS,
};

use crate::config::DEFAULT_BATCH_SIZE;
use crate::ddl::{Column, Table};
use crate::dump::{dump_path, DumpShape};
use crate::error::{MigrateError, Result};
use deadpool_postgres::Pool;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Import engine settings.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Tables loaded concurrently.
    pub workers: usize,
    /// Rows per INSERT statement before clamping to the bind parameter limit.
    pub batch_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// One table scheduled for import.
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub table: Table,
    pub shape: DumpShape,
    pub path: PathBuf,
    pub schema: String,
}

/// Final state of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

/// Result of importing one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table: String,
    pub status: TableStatus,
    /// Rows committed. Zero unless the table completed.
    pub rows: u64,
    pub batches: u64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableOutcome {
    fn new(table: &str, status: TableStatus) -> Self {
        Self {
            table: table.to_string(),
            status,
            rows: 0,
            batches: 0,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn completed(table: &str, rows: u64, batches: u64, elapsed: Duration) -> Self {
        Self {
            rows,
            batches,
            duration_ms: elapsed.as_millis() as u64,
            ..Self::new(table, TableStatus::Completed)
        }
    }

    pub fn failed(table: &str, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            duration_ms: elapsed.as_millis() as u64,
            error: Some(error.into()),
            ..Self::new(table, TableStatus::Failed)
        }
    }

    pub fn skipped(table: &str) -> Self {
        Self::new(table, TableStatus::Skipped)
    }

    pub fn cancelled(table: &str) -> Self {
        Self::new(table, TableStatus::Cancelled)
    }
}

/// Outcomes of an import run, in declared table order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub tables: Vec<TableOutcome>,
}

impl ImportReport {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn count(&self, status: TableStatus) -> usize {
        self.tables.iter().filter(|t| t.status == status).count()
    }

    pub fn failed_tables(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .map(|t| t.table.clone())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.tables
            .iter()
            .all(|t| matches!(t.status, TableStatus::Completed | TableStatus::Skipped))
    }
}

/// Declared tables that also have a dump, in declared order.
pub fn select_jobs(
    tables: &[Table],
    dumps: &HashMap<String, DumpShape>,
    dump_dir: &Path,
    schema: &str,
) -> Vec<ImportJob> {
    tables
        .iter()
        .filter_map(|table| {
            let shape = dumps.get(&table.name)?;
            let path = if shape.path.as_os_str().is_empty() {
                dump_path(dump_dir, &table.name)
            } else {
                shape.path.clone()
            };
            Some(ImportJob {
                table: table.clone(),
                shape: shape.clone(),
                path,
                schema: schema.to_string(),
            })
        })
        .collect()
}

/// Declared columns that were discovered in the dump, in declared order.
pub fn select_columns<'a>(table: &'a Table, shape: &DumpShape) -> Vec<&'a Column> {
    table
        .columns
        .iter()
        .filter(|c| shape.contains(&c.name))
        .collect()
}

/// Load every declared table that has a dump into `schema`.
///
/// Per-table failures are contained and reported. A failed trigger statement
/// stops scheduling new tables, lets in-flight ones finish, then returns
/// `MigrateError::Integrity`.
pub async fn import_tables(
    pool: &Pool,
    tables: &[Table],
    dumps: &HashMap<String, DumpShape>,
    dump_dir: &Path,
    schema: &str,
    config: &ImportConfig,
    cancel: CancellationToken,
) -> Result<ImportReport> {
    let jobs = select_jobs(tables, dumps, dump_dir, schema);
    if jobs.is_empty() {
        warn!("No declared table has a dump; nothing to import");
        return Ok(ImportReport::default());
    }

    let workers = config.workers.max(1).min(jobs.len());
    info!(
        "Importing {} tables with {} workers (batch size {})",
        jobs.len(),
        workers,
        config.batch_size
    );

    let order: Vec<String> = jobs.iter().map(|j| j.table.name.clone()).collect();
    let (job_tx, job_rx) = async_channel::bounded::<ImportJob>(workers * 2);
    // Cancelled on an integrity failure; also follows the caller's token
    let stop = cancel.child_token();

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let job_rx = job_rx.clone();
        let pool = pool.clone();
        let cancel = cancel.clone();
        let stop = stop.clone();
        let batch_size = config.batch_size;

        handles.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            let mut structural = None;

            while let Ok(job) = job_rx.recv().await {
                if stop.is_cancelled() {
                    outcomes.push(TableOutcome::cancelled(&job.table.name));
                    continue;
                }
                match table::import_table(&pool, &job, batch_size, &cancel).await {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => {
                        error!("{}; cancelling remaining tables", e);
                        stop.cancel();
                        outcomes.push(TableOutcome::failed(
                            &job.table.name,
                            e.to_string(),
                            Duration::ZERO,
                        ));
                        if structural.is_none() {
                            structural = Some(e);
                        }
                    }
                }
            }

            debug!("Import worker {} finished", worker_id);
            (outcomes, structural)
        }));
    }
    drop(job_rx);

    for job in jobs {
        if job_tx.send(job).await.is_err() {
            break;
        }
    }
    job_tx.close();

    let mut by_table: HashMap<String, TableOutcome> = HashMap::with_capacity(order.len());
    let mut structural: Option<MigrateError> = None;
    for joined in join_all(handles).await {
        match joined {
            Ok((outcomes, err)) => {
                for outcome in outcomes {
                    by_table.insert(outcome.table.clone(), outcome);
                }
                if structural.is_none() {
                    structural = err;
                }
            }
            Err(e) => error!("Import worker panicked: {}", e),
        }
    }

    if let Some(err) = structural {
        return Err(err);
    }

    let report = ImportReport {
        tables: order
            .iter()
            .map(|name| {
                by_table.remove(name).unwrap_or_else(|| {
                    TableOutcome::failed(name, "import worker panicked", Duration::ZERO)
                })
            })
            .collect(),
    };

    info!(
        "Import finished: {} completed, {} failed, {} skipped, {} cancelled, {} rows",
        report.count(TableStatus::Completed),
        report.count(TableStatus::Failed),
        report.count(TableStatus::Skipped),
        report.count(TableStatus::Cancelled),
        report.total_rows()
    );

    Ok(report)
}
