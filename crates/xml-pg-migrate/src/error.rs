//! Error types for the migration library.

use thiserror::Error;

/// Exit code for a successful run.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for configuration errors (invalid YAML, missing fields, etc.).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for DDL parsing and schema generation errors.
pub const EXIT_SCHEMA_ERROR: u8 = 2;
/// Exit code for target database errors.
pub const EXIT_TARGET_ERROR: u8 = 3;
/// Exit code for trigger disable/enable failures.
pub const EXIT_INTEGRITY_ERROR: u8 = 4;
/// Exit code when tables failed to import and the caller asked to fail on it.
pub const EXIT_TABLE_ERROR: u8 = 5;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code for a cancelled run (SIGINT, SIGTERM).
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// DDL could not be parsed or the filtered schema could not be produced
    #[error("Schema error: {0}")]
    Schema(String),

    /// Target database connection or query error
    #[error("Target database error: {}", pg_error_detail(.0))]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Disabling or re-enabling triggers failed for a table
    #[error("Integrity enforcement failed for table {table}: {message}")]
    Integrity { table: String, message: String },

    /// Data import failed for a specific table
    #[error("Import failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// One or more tables failed to import
    #[error("{} table(s) failed to import: {}", .0.len(), .0.join(", "))]
    TablesFailed(Vec<String>),

    /// XML dump could not be read
    #[error("XML error in {path}: {message}")]
    Xml { path: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Integrity error
    pub fn integrity(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Integrity {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create an Xml error
    pub fn xml(path: impl AsRef<std::path::Path>, message: impl ToString) -> Self {
        MigrateError::Xml {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Schema(_) => EXIT_SCHEMA_ERROR,
            MigrateError::Target(_) | MigrateError::Pool { .. } => EXIT_TARGET_ERROR,
            MigrateError::Integrity { .. } => EXIT_INTEGRITY_ERROR,
            MigrateError::Transfer { .. } | MigrateError::TablesFailed(_) => EXIT_TABLE_ERROR,
            MigrateError::Xml { .. } | MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Json(_) => EXIT_CONFIG_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Describe a driver error with the server's message and SQLSTATE, which the
/// driver's own `Display` ("db error") leaves out.
pub fn pg_error_detail(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => {
            let mut out = format!(
                "{}: {} (SQLSTATE {})",
                db.severity(),
                db.message(),
                db.code().code()
            );
            if let Some(detail) = db.detail() {
                out.push_str(&format!("; detail: {}", detail));
            }
            if let Some(hint) = db.hint() {
                out.push_str(&format!("; hint: {}", hint));
            }
            out
        }
        None => match std::error::Error::source(err) {
            Some(source) => format!("{}: {}", err, source),
            None => err.to_string(),
        },
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
