use anyhow::{Result, Context};
use async_trait::async_trait;
use log::debug;
use sqlx::{Connection, PgConnection};

use crate::config::DatabaseConfig;

/// Relational store the table sink writes through. Every call to
/// [`RelationalStore::connect`] opens a fresh connection.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StoreSession>>;
}

/// One open connection.
#[async_trait]
pub trait StoreSession: Send {
    /// Runs a raw statement in autocommit mode.
    async fn execute(&mut self, statement: &str) -> Result<()>;

    /// Runs `statement` once per row inside a single transaction, then commits.
    async fn commit_batch(&mut self, statement: &str, rows: &[Vec<String>]) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}

pub struct Database {
    url: String,
}

impl Database {
    pub fn new(config: &DatabaseConfig) -> Self {
        debug!("Database target: {}@{}:{}/{}",
               config.username, config.host, config.port, config.database);
        Database { url: config.url() }
    }
}

#[async_trait]
impl RelationalStore for Database {
    async fn connect(&self) -> Result<Box<dyn StoreSession>> {
        let conn = PgConnection::connect(&self.url)
            .await
            .context("Unable to connect to the database")?;
        Ok(Box::new(PgSession { conn }))
    }
}

struct PgSession {
    conn: PgConnection,
}

#[async_trait]
impl StoreSession for PgSession {
    async fn execute(&mut self, statement: &str) -> Result<()> {
        debug!("SQL: {}", statement);
        sqlx::query(statement)
            .execute(&mut self.conn)
            .await
            .with_context(|| format!("Statement failed: {}", statement))?;
        Ok(())
    }

    async fn commit_batch(&mut self, statement: &str, rows: &[Vec<String>]) -> Result<()> {
        let mut transaction = self.conn.begin()
            .await
            .context("Unable to start transaction")?;

        for row in rows {
            let mut query = sqlx::query(statement);
            for cell in row {
                query = query.bind(cell.as_str());
            }
            query.execute(&mut *transaction)
                .await
                .context("Error inserting row")?;
        }

        transaction.commit()
            .await
            .context("Error committing transaction")?;

        debug!("Committed batch of {} row(s)", rows.len());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close()
            .await
            .context("Error closing database connection")?;
        Ok(())
    }
}
