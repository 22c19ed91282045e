//! XML dump inspection.
//!
//! Scans a directory of per-table dump files in parallel and records which
//! attribute names actually occur on `<row>` elements. The result decides
//! which tables and columns make it into the target schema.
//!
//! Workers run on the blocking pool and pull paths from a shared bounded
//! queue. Each finished [`DumpShape`] is sent back over a result channel to a
//! single aggregating task, so the result map has exactly one writer.

mod reader;

pub use reader::{DumpRow, RowReader, ROW_ELEMENT};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// File extension of dump files.
pub const DUMP_EXTENSION: &str = "xml";

/// Columns discovered in one dump file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpShape {
    /// Table name (file stem of the dump).
    pub name: String,

    /// Union of attribute names over every well-formed row.
    pub columns: BTreeSet<String>,

    /// Well-formed rows seen while scanning.
    pub rows: u64,

    /// File the shape was read from.
    #[serde(default)]
    pub path: PathBuf,
}

impl DumpShape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: BTreeSet::new(),
            rows: 0,
            path: PathBuf::new(),
        }
    }

    /// Whether `column` was seen on at least one row.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// Fold another scan of the same table into this one. The first file's
    /// path is kept.
    pub fn merge(&mut self, other: DumpShape) {
        self.columns.extend(other.columns);
        self.rows += other.rows;
    }
}

/// Location of the dump file for `table` under `dir`.
pub fn dump_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{}.{}", table, DUMP_EXTENSION))
}

/// Table name for a dump file: its base name without extension.
pub fn table_name(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Recursively list dump files under `dir`, sorted by path.
///
/// Unreadable directories and entries are logged and skipped.
pub fn discover_dump_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read directory {}: {}", current.display(), e);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read entry in {}: {}", current.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => pending.push(path),
                Ok(_) => {
                    let is_dump = path
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case(DUMP_EXTENSION))
                        .unwrap_or(false);
                    if is_dump {
                        files.push(path);
                    }
                }
                Err(e) => warn!("Cannot stat {}: {}", path.display(), e),
            }
        }
    }

    files.sort();
    files
}

/// Scan one dump file and collect its column names.
///
/// Returns `Ok(None)` if `cancel` fired mid-scan. A stream-level parse error
/// ends the scan early but keeps what was discovered up to that point.
pub fn inspect_file(path: &Path, cancel: &CancellationToken) -> Result<Option<DumpShape>> {
    let name = table_name(path).unwrap_or_default();
    let mut shape = DumpShape::new(name);
    shape.path = path.to_path_buf();
    let mut rows = RowReader::open(path)?;

    for row in rows.by_ref() {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        match row {
            Ok(row) => {
                for column in row.names() {
                    if !shape.columns.contains(column) {
                        shape.columns.insert(column.to_string());
                    }
                }
                shape.rows += 1;
            }
            Err(e) => {
                warn!("{}: stopping scan early: {}", shape.name, e);
                break;
            }
        }
    }

    if rows.malformed() > 0 {
        debug!("{}: skipped {} malformed rows", shape.name, rows.malformed());
    }

    Ok(Some(shape))
}

/// Inspect every dump file under `dir` with a pool of `workers` tasks.
///
/// Never fails: files that cannot be opened are logged and left out of the
/// result. After cancellation the map holds only files finished before it.
pub async fn inspect_dumps(
    dir: &Path,
    workers: usize,
    cancel: CancellationToken,
) -> HashMap<String, DumpShape> {
    let files = discover_dump_files(dir);
    let mut dumps: HashMap<String, DumpShape> = HashMap::with_capacity(files.len());
    if files.is_empty() {
        warn!("No .{} dump files found in {}", DUMP_EXTENSION, dir.display());
        return dumps;
    }

    let workers = workers.max(1).min(files.len());
    info!(
        "Inspecting {} dump files with {} workers",
        files.len(),
        workers
    );

    let (job_tx, job_rx) = async_channel::bounded::<PathBuf>(workers * 2);
    let (result_tx, mut result_rx) = mpsc::channel::<DumpShape>(workers * 2);

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let cancel = cancel.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            while let Ok(path) = job_rx.recv_blocking() {
                if cancel.is_cancelled() {
                    break;
                }
                match inspect_file(&path, &cancel) {
                    Ok(Some(shape)) => {
                        info!("Parsed {}: {} cols, {} rows", shape.name, shape.columns.len(), shape.rows);
                        if result_tx.blocking_send(shape).is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!("Inspection of {} cancelled", path.display()),
                    Err(e) => warn!("Error opening {}: {}", path.display(), e),
                }
            }
            debug!("Inspection worker {} finished", worker_id);
        }));
    }

    // Workers hold the only receivers and senders from here on
    drop(job_rx);
    drop(result_tx);

    let producer = tokio::spawn(async move {
        for path in files {
            if job_tx.send(path).await.is_err() {
                break;
            }
        }
    });

    while let Some(shape) = result_rx.recv().await {
        match dumps.get_mut(&shape.name) {
            Some(existing) => {
                warn!("Duplicate dump for table {}; merging columns", shape.name);
                existing.merge(shape);
            }
            None => {
                dumps.insert(shape.name.clone(), shape);
            }
        }
    }

    if let Err(e) = producer.await {
        warn!("Dump file producer failed: {}", e);
    }
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Inspection worker panicked: {}", e);
        }
    }

    info!("Discovered {} tables in dumps", dumps.len());
    dumps
}
