/// Persistence targets for extracted attachments
pub mod disk;
pub mod table;

use std::sync::Arc;

use anyhow::{Result, Context};
use log::{info, warn};

use crate::config::{Config, WorkingMode};
use crate::database::RelationalStore;
use crate::error::{ExtractError, SinkError};
use crate::row_extractor::ExtractedTable;

pub use disk::DiskSink;
pub use table::TableSink;

/// One attachment ready to persist: the raw bytes for the disk copy and the
/// parsed rows for the table.
#[derive(Debug)]
pub struct Payload {
    pub name: String,
    pub raw: Vec<u8>,
    pub table: Result<ExtractedTable, ExtractError>,
}

/// What happened to each sink that was tried.
#[derive(Debug, Default)]
pub struct SinkReport {
    pub succeeded: Vec<&'static str>,
    pub failed: Vec<(&'static str, SinkError)>,
}

impl SinkReport {
    pub fn any_succeeded(&self) -> bool {
        !self.succeeded.is_empty()
    }

    fn record<T>(&mut self, sink: &'static str, result: Result<T, SinkError>) {
        match result {
            Ok(_) => self.succeeded.push(sink),
            Err(e) => {
                warn!("⚠️  {} sink failed: {}", sink, e);
                self.failed.push((sink, e));
            }
        }
    }
}

/// The configured set of persistence targets.
#[derive(Clone)]
pub enum Sink {
    Disk(DiskSink),
    Table(TableSink),
    /// Both targets, each attempted regardless of how the other fared
    Both(DiskSink, TableSink),
}

impl Sink {
    /// Picks the sinks for the configured working mode. `store` is only
    /// used when the mode includes the database.
    pub fn from_config(config: &Config, store: Option<Arc<dyn RelationalStore>>) -> Result<Self> {
        let disk = || {
            config.destination_dir
                .as_ref()
                .map(DiskSink::new)
                .context("DESTINATION_FOLDER is required for the disk sink")
        };
        let table = || {
            store.clone()
                .map(TableSink::new)
                .context("A database is required for the table sink")
        };

        let sink = match config.mode {
            WorkingMode::Hdd => Sink::Disk(disk()?),
            WorkingMode::Db => Sink::Table(table()?),
            WorkingMode::Both => Sink::Both(disk()?, table()?),
        };
        info!("💾 Working mode {}", config.mode);
        Ok(sink)
    }

    pub async fn persist(&self, payload: &Payload) -> SinkReport {
        let mut report = SinkReport::default();
        match self {
            Sink::Disk(disk) => report.record("disk", disk.write(&payload.name, &payload.raw)),
            Sink::Table(table) => report.record("table", write_table(table, payload).await),
            Sink::Both(disk, table) => {
                report.record("table", write_table(table, payload).await);
                report.record("disk", disk.write(&payload.name, &payload.raw));
            }
        }
        report
    }
}

async fn write_table(sink: &TableSink, payload: &Payload) -> Result<usize, SinkError> {
    match &payload.table {
        Ok(table) => sink.write(table).await,
        Err(e) => Err(SinkError::Parse(e.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::config::ImapConfig;

    fn config(mode: WorkingMode, dir: Option<PathBuf>) -> Config {
        Config {
            imap: ImapConfig {
                server: "imap.example.com".into(),
                port: 993,
                use_starttls: false,
                username: "user".into(),
                password: "pass".into(),
                folder: "INBOX".into(),
            },
            subject_pattern: "subscription".into(),
            mode,
            destination_dir: dir,
            database: None,
        }
    }

    #[test]
    fn test_from_config_requires_store_for_db() {
        assert!(Sink::from_config(&config(WorkingMode::Db, None), None).is_err());
        assert!(Sink::from_config(&config(WorkingMode::Hdd, None), None).is_err());
        assert!(matches!(
            Sink::from_config(&config(WorkingMode::Hdd, Some("/tmp".into())), None),
            Ok(Sink::Disk(_))
        ));
    }

    #[tokio::test]
    async fn test_disk_sink_writes_raw_bytes_even_when_csv_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Sink::Disk(DiskSink::new(dir.path()));

        let payload = Payload {
            name: "ledger".into(),
            raw: b"ID;Name\n1;\xff\n".to_vec(),
            table: Err(ExtractError { line: 2, message: "invalid utf-8".into() }),
        };
        let report = sink.persist(&payload).await;

        assert!(report.any_succeeded());
        assert_eq!(std::fs::read(dir.path().join("ledger.csv")).unwrap(), payload.raw);
    }
}
