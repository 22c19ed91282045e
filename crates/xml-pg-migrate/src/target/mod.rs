//! PostgreSQL target database operations.

mod tls;

pub use tls::{make_tls_connect, SslMode};

use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

/// Connection pool to the target database.
#[derive(Clone)]
pub struct PgTarget {
    pool: Pool,
}

impl PgTarget {
    /// Create a pool from the target configuration and verify it can connect.
    pub async fn new(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        let target = Self::build(pg_config, ssl_mode, max_conns)?;
        target.test_connection().await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(target)
    }

    /// Create a pool from a `postgres://` URL or key/value connection string.
    /// TLS is not used.
    pub async fn from_url(url: &str, max_conns: usize) -> Result<Self> {
        let pg_config: PgConfig = url
            .parse()
            .map_err(|e| MigrateError::Config(format!("invalid connection string: {}", e)))?;
        let target = Self::build(pg_config, SslMode::Disable, max_conns)?;
        target.test_connection().await?;
        Ok(target)
    }

    fn build(pg_config: PgConfig, ssl_mode: SslMode, max_conns: usize) -> Result<Self> {
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match make_tls_connect(ssl_mode)? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, NoTls, mgr_config)
            }
        };

        let pool = Pool::builder(mgr)
            .max_size(max_conns.max(1))
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        Ok(Self { pool })
    }

    /// Run `SELECT 1` on a pooled connection.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL target connection"))?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// The underlying pool, shared by import workers.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Execute a multi-statement SQL script in one round trip.
    pub async fn execute_script(&self, sql: &str) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting connection for schema script"))?;
        client.batch_execute(sql).await?;
        debug!("Executed SQL script ({} bytes)", sql.len());
        Ok(())
    }

    /// Count rows in `schema.table`.
    pub async fn get_row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting connection for get_row_count"))?;

        let sql = format!("SELECT COUNT(*) FROM {}", qualify_table(schema, table));
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }

    /// Close all pooled connections.
    pub fn close(&self) {
        self.pool.close();
    }
}

/// Quote a PostgreSQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualify a table name.
pub(crate) fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}
