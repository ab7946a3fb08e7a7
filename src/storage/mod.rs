pub mod repository;

use std::path::Path;

use rusqlite_migration::{Migrations, M};

use crate::error::{Error, Result};

const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode=WAL;\
                                  PRAGMA foreign_keys=ON;\
                                  PRAGMA busy_timeout=5000;";

/// Schema history, oldest first. Append only.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(include_str!("migrations/001_initial.sql")),
        M::up(include_str!("migrations/002_legacy_prompt_version.sql")),
    ])
}

/// Cache, usage and config tables behind a writer and a reader connection.
///
/// WAL mode lets the reader run alongside the writer; all writes funnel
/// through the writer's `tokio_rusqlite` channel, one at a time.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// `~/.siteinsight/siteinsight.db`, creating the directory if needed.
    pub async fn open() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?;
        let dir = home.join(".siteinsight");
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Config(format!("cannot create {}: {e}", dir.display())))?;
        Self::open_at(dir.join("siteinsight.db")).await
    }

    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening database at {}", path.display());

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::prepare(&writer, true).await?;
        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::prepare(&reader, false).await?;

        Ok(Self { writer, reader })
    }

    /// Private in-memory database. Reader and writer are the same connection
    /// since each in-memory connection has its own database.
    pub async fn open_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::prepare(&conn, true).await?;
        Ok(Self {
            reader: conn.clone(),
            writer: conn,
        })
    }

    /// Apply pragmas, and bring the schema up to date on the writer.
    async fn prepare(conn: &tokio_rusqlite::Connection, migrate: bool) -> Result<()> {
        conn.call(move |conn| {
            conn.execute_batch(CONNECTION_PRAGMAS)?;
            if migrate {
                migrations().to_latest(conn)?;
            }
            Ok::<(), Error>(())
        })
        .await?;
        Ok(())
    }

    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }
}
