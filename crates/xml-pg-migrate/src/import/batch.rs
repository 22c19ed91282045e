//! Row batching and multi-row INSERT generation.

use crate::dump::RowReader;
use crate::error::Result;
use crate::target::{qualify_table, quote_ident};
use async_trait::async_trait;
use std::io::BufRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// PostgreSQL accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Row-major values for up to `batch_size` rows. `None` binds NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub values: Vec<Option<String>>,
    pub rows: usize,
}

impl Batch {
    fn with_capacity(rows: usize, columns: usize) -> Self {
        Self {
            values: Vec::with_capacity(rows * columns),
            rows: 0,
        }
    }
}

/// What the reader side saw while filling batches.
#[derive(Debug, Default)]
pub struct ReadSummary {
    /// Rows handed to the consumer.
    pub rows: u64,
    /// Rows skipped because their attributes could not be decoded.
    pub malformed: u64,
    /// Stream-level parse error that ended the file early.
    pub stream_error: Option<String>,
    /// Reading stopped because of cancellation or a closed consumer.
    pub interrupted: bool,
}

/// Rows and statements written by [`write_batches`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub rows: u64,
    pub batches: u64,
    pub cancelled: bool,
}

/// Destination for batches of one table.
#[async_trait]
pub trait BatchSink: Send {
    /// Insert every row of `batch`.
    async fn insert(&mut self, batch: &Batch) -> Result<()>;
}

/// Rows per statement for `columns` columns, clamped to the bind parameter limit.
pub fn effective_batch_size(batch_size: usize, columns: usize) -> usize {
    let limit = MAX_BIND_PARAMS / columns.max(1);
    batch_size.clamp(1, limit.max(1))
}

/// Type a text placeholder is cast to before it reaches the column, or
/// `None` for character columns.
///
/// An explicit cast to `VARCHAR(n)` or `CHAR(n)` truncates; the assignment
/// into the column rejects values that are too long.
fn placeholder_cast(pg_type: &str) -> Option<&str> {
    let upper = pg_type.trim().to_ascii_uppercase();
    let base = upper.split('(').next().unwrap_or_default().trim_end();
    match base {
        "CHAR" | "CHARACTER" | "BPCHAR" | "VARCHAR" | "CHARACTER VARYING" | "TEXT" => None,
        _ => Some(pg_type),
    }
}

/// Multi-row INSERT for `rows` rows. Every placeholder is bound as text and
/// cast to the column's target type, so PostgreSQL does the coercion.
pub fn build_insert_sql(
    schema: &str,
    table: &str,
    columns: &[String],
    pg_types: &[String],
    rows: usize,
) -> String {
    let col_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        qualify_table(schema, table),
        col_list
    );

    let mut idx = 1;
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (col, pg_type) in pg_types.iter().enumerate() {
            if col > 0 {
                sql.push_str(", ");
            }
            match placeholder_cast(pg_type) {
                Some(cast) => sql.push_str(&format!("${}::text::{}", idx, cast)),
                None => sql.push_str(&format!("${}::text", idx)),
            }
            idx += 1;
        }
        sql.push(')');
    }

    sql
}

/// Stream rows from `reader` into batches of `batch_size` rows and hand each
/// full batch, then the final partial one, to `emit` in document order.
///
/// `emit` returns false when the consumer has gone away.
pub fn fill_batches<R: BufRead>(
    reader: &mut RowReader<R>,
    columns: &[String],
    batch_size: usize,
    cancel: &CancellationToken,
    mut emit: impl FnMut(Batch) -> bool,
) -> ReadSummary {
    let batch_size = batch_size.max(1);
    let mut summary = ReadSummary::default();
    let mut batch = Batch::with_capacity(batch_size, columns.len());

    for row in reader.by_ref() {
        if cancel.is_cancelled() {
            summary.interrupted = true;
            break;
        }
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("Stopping read early: {}", e);
                summary.stream_error = Some(e.to_string());
                break;
            }
        };

        batch
            .values
            .extend(columns.iter().map(|c| row.get(c).map(str::to_string)));
        batch.rows += 1;
        summary.rows += 1;

        if batch.rows == batch_size {
            let full = std::mem::replace(
                &mut batch,
                Batch::with_capacity(batch_size, columns.len()),
            );
            if !emit(full) {
                summary.interrupted = true;
                break;
            }
        }
    }

    if batch.rows > 0 && !summary.interrupted && !emit(batch) {
        summary.interrupted = true;
    }

    summary.malformed = reader.malformed();
    summary
}

/// Drain `rx` into `sink` until the channel closes or `cancel` fires.
pub async fn write_batches<S: BatchSink + ?Sized>(
    sink: &mut S,
    rx: &mut mpsc::Receiver<Batch>,
    cancel: &CancellationToken,
) -> Result<WriteStats> {
    let mut stats = WriteStats::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                stats.cancelled = true;
                break;
            }
            batch = rx.recv() => match batch {
                Some(batch) => {
                    sink.insert(&batch).await?;
                    stats.rows += batch.rows as u64;
                    stats.batches += 1;
                    debug!("Inserted batch {} ({} rows)", stats.batches, batch.rows);
                }
                None => break,
            },
        }
    }

    Ok(stats)
}
