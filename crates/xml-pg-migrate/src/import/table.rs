//! Loading one table inside its own transaction.

use super::batch::{
    build_insert_sql, effective_batch_size, fill_batches, write_batches, Batch, BatchSink,
};
use super::{select_columns, ImportJob, TableOutcome};
use crate::dump::RowReader;
use crate::error::{pg_error_detail, MigrateError, Result};
use crate::target::qualify_table;
use crate::typemap;
use async_trait::async_trait;
use deadpool_postgres::{Pool, Transaction};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_postgres::types::ToSql;
use tokio_postgres::Statement;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Batches buffered between the file reader and the inserting task.
const READ_AHEAD: usize = 2;

/// Inserts batches through an open transaction.
struct PgSink<'a> {
    tx: &'a Transaction<'a>,
    schema: &'a str,
    table: &'a str,
    columns: &'a [String],
    pg_types: &'a [String],
    capacity: usize,
    full: Statement,
}

impl<'a> PgSink<'a> {
    async fn new(
        tx: &'a Transaction<'a>,
        job: &'a ImportJob,
        columns: &'a [String],
        pg_types: &'a [String],
        capacity: usize,
    ) -> Result<Self> {
        let sql = build_insert_sql(&job.schema, &job.table.name, columns, pg_types, capacity);
        let full = tx.prepare(&sql).await?;
        Ok(Self {
            tx,
            schema: &job.schema,
            table: &job.table.name,
            columns,
            pg_types,
            capacity,
            full,
        })
    }
}

#[async_trait]
impl BatchSink for PgSink<'_> {
    async fn insert(&mut self, batch: &Batch) -> Result<()> {
        let params: Vec<&(dyn ToSql + Sync)> = batch
            .values
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect();

        if batch.rows == self.capacity {
            self.tx.execute(&self.full, &params).await?;
        } else {
            let sql = build_insert_sql(
                self.schema,
                self.table,
                self.columns,
                self.pg_types,
                batch.rows,
            );
            self.tx.execute(sql.as_str(), &params).await?;
        }
        Ok(())
    }
}

enum Loaded {
    Done { rows: u64, batches: u64 },
    Cancelled,
}

/// Import one table. Per-table failures are reported in the outcome; only
/// a failed trigger statement comes back as `Err(MigrateError::Integrity)`.
pub(crate) async fn import_table(
    pool: &Pool,
    job: &ImportJob,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<TableOutcome> {
    let table = job.table.name.as_str();
    let columns: Vec<String> = select_columns(&job.table, &job.shape)
        .into_iter()
        .map(|c| c.name.clone())
        .collect();

    if columns.is_empty() {
        warn!("{}: no declared column appears in the dump, skipping", table);
        return Ok(TableOutcome::skipped(table));
    }

    info!("Start batch import for table {}", table);
    let start = Instant::now();

    match load(pool, job, &columns, batch_size, cancel).await {
        Ok(Loaded::Done { rows, batches }) => {
            let elapsed = start.elapsed();
            info!(
                "Finished import table {}: {} rows in {:?}",
                table, rows, elapsed
            );
            Ok(TableOutcome::completed(table, rows, batches, elapsed))
        }
        Ok(Loaded::Cancelled) => {
            warn!("{}: import cancelled, transaction rolled back", table);
            Ok(TableOutcome::cancelled(table))
        }
        Err(e @ MigrateError::Integrity { .. }) => Err(e),
        Err(e) => {
            error!("Error importing table {}: {}", table, e);
            Ok(TableOutcome::failed(table, e.to_string(), start.elapsed()))
        }
    }
}

async fn load(
    pool: &Pool,
    job: &ImportJob,
    columns: &[String],
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<Loaded> {
    let table = job.table.name.as_str();
    let pg_types: Vec<String> = select_columns(&job.table, &job.shape)
        .into_iter()
        .map(|c| typemap::to_postgres(&c.data_type))
        .collect();
    let capacity = effective_batch_size(batch_size, columns.len());
    let qualified = qualify_table(&job.schema, table);

    let mut client = pool
        .get()
        .await
        .map_err(|e| MigrateError::pool(e, format!("getting connection to import {}", table)))?;
    let tx = client.transaction().await?;

    tx.batch_execute(&format!("ALTER TABLE {} DISABLE TRIGGER ALL", qualified))
        .await
        .map_err(|e| MigrateError::integrity(table, pg_error_detail(&e)))?;

    let mut sink = PgSink::new(&tx, job, columns, &pg_types, capacity).await?;

    let (batch_tx, mut batch_rx) = mpsc::channel::<Batch>(READ_AHEAD);
    let path = job.path.clone();
    let reader_columns = columns.to_vec();
    let reader_cancel = cancel.clone();
    let reader = tokio::task::spawn_blocking(move || {
        let mut rows = RowReader::open(&path)?;
        Ok::<_, MigrateError>(fill_batches(
            &mut rows,
            &reader_columns,
            capacity,
            &reader_cancel,
            |batch| batch_tx.blocking_send(batch).is_ok(),
        ))
    });

    let written = write_batches(&mut sink, &mut batch_rx, cancel).await;
    // Unblocks the reader if the writer stopped first
    drop(batch_rx);
    drop(sink);

    let summary = reader
        .await
        .map_err(|e| MigrateError::transfer(table, format!("reader task failed: {}", e)))?;
    let written = written?;
    let summary = summary?;

    if written.cancelled || cancel.is_cancelled() {
        return Ok(Loaded::Cancelled);
    }
    if let Some(err) = &summary.stream_error {
        warn!(
            "{}: dump ended early ({}); committing {} rows read before the error",
            table, err, summary.rows
        );
    }
    if summary.malformed > 0 {
        warn!("{}: skipped {} malformed rows", table, summary.malformed);
    }

    tx.batch_execute(&format!("ALTER TABLE {} ENABLE TRIGGER ALL", qualified))
        .await
        .map_err(|e| MigrateError::integrity(table, pg_error_detail(&e)))?;
    tx.commit().await?;

    Ok(Loaded::Done {
        rows: written.rows,
        batches: written.batches,
    })
}
