use std::sync::Arc;

use log::{info, debug};

use crate::database::RelationalStore;
use crate::error::SinkError;
use crate::row_extractor::ExtractedTable;

/// Rows committed per transaction.
pub const BATCH_SIZE: usize = 500;

/// Loads an extracted table into a relational table of the same name,
/// dropping whatever was there before.
#[derive(Clone)]
pub struct TableSink {
    store: Arc<dyn RelationalStore>,
}

impl TableSink {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        TableSink { store }
    }

    /// Returns the number of rows inserted.
    pub async fn write(&self, table: &ExtractedTable) -> Result<usize, SinkError> {
        if table.column_count == 0 {
            debug!("Table '{}' has no columns, nothing to write", table.name);
            return Ok(0);
        }

        self.recreate_table(&table.name, table.column_count).await?;
        let inserted = self.insert_rows(&table.name, &table.rows, table.column_count).await?;

        info!("Table '{}' reloaded with {} row(s)", table.name, inserted);
        Ok(inserted)
    }

    pub async fn recreate_table(&self, name: &str, column_count: usize) -> Result<(), SinkError> {
        if column_count == 0 {
            return Ok(());
        }

        let mut session = self.store.connect().await.map_err(SinkError::Database)?;
        session.execute(&drop_statement(name)).await.map_err(SinkError::Database)?;
        session.execute(&create_statement(name, column_count)).await.map_err(SinkError::Database)?;
        session.close().await.map_err(SinkError::Database)?;
        Ok(())
    }

    /// Inserts on its own connection, committing every [`BATCH_SIZE`] rows
    /// and after the last one. Short rows are padded with empty strings.
    pub async fn insert_rows(
        &self,
        name: &str,
        rows: &[Vec<String>],
        column_count: usize,
    ) -> Result<usize, SinkError> {
        let statement = insert_statement(name, column_count);
        let mut session = self.store.connect().await.map_err(SinkError::Database)?;

        let mut inserted = 0;
        for chunk in rows.chunks(BATCH_SIZE) {
            let batch: Vec<Vec<String>> = chunk
                .iter()
                .map(|row| {
                    let mut padded = row.clone();
                    padded.resize(column_count, String::new());
                    padded
                })
                .collect();

            session.commit_batch(&statement, &batch).await.map_err(SinkError::Database)?;
            inserted += batch.len();
        }

        session.close().await.map_err(SinkError::Database)?;
        Ok(inserted)
    }
}

fn drop_statement(name: &str) -> String {
    format!("DROP TABLE IF EXISTS \"{}\"", name)
}

fn create_statement(name: &str, column_count: usize) -> String {
    let columns: Vec<String> = (0..column_count).map(|i| format!("c{} TEXT", i)).collect();
    format!("CREATE TABLE \"{}\" ({})", name, columns.join(", "))
}

fn insert_statement(name: &str, column_count: usize) -> String {
    let columns: Vec<String> = (0..column_count).map(|i| format!("c{}", i)).collect();
    let placeholders: Vec<String> = (1..=column_count).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        name,
        columns.join(", "),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::database::StoreSession;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Connect,
        Execute(String),
        Commit(String, Vec<Vec<String>>),
        Close,
    }

    #[derive(Default)]
    struct RecordingStore {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_commits: bool,
    }

    struct RecordingSession {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_commits: bool,
    }

    #[async_trait]
    impl RelationalStore for RecordingStore {
        async fn connect(&self) -> Result<Box<dyn StoreSession>> {
            self.calls.lock().unwrap().push(Call::Connect);
            Ok(Box::new(RecordingSession {
                calls: self.calls.clone(),
                fail_commits: self.fail_commits,
            }))
        }
    }

    #[async_trait]
    impl StoreSession for RecordingSession {
        async fn execute(&mut self, statement: &str) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Execute(statement.to_string()));
            Ok(())
        }

        async fn commit_batch(&mut self, statement: &str, rows: &[Vec<String>]) -> Result<()> {
            if self.fail_commits {
                anyhow::bail!("connection reset");
            }
            self.calls.lock().unwrap().push(Call::Commit(statement.to_string(), rows.to_vec()));
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Close);
            Ok(())
        }
    }

    fn table(rows: Vec<Vec<&str>>) -> ExtractedTable {
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|r| r.into_iter().map(str::to_string).collect())
            .collect();
        ExtractedTable {
            name: "sales".into(),
            column_count: rows.iter().map(Vec::len).max().unwrap_or(0),
            rows,
        }
    }

    #[test]
    fn test_statements() {
        assert_eq!(drop_statement("sales"), "DROP TABLE IF EXISTS \"sales\"");
        assert_eq!(create_statement("sales", 2), "CREATE TABLE \"sales\" (c0 TEXT, c1 TEXT)");
        assert_eq!(
            insert_statement("sales", 3),
            "INSERT INTO \"sales\" (c0, c1, c2) VALUES ($1, $2, $3)"
        );
    }

    #[tokio::test]
    async fn test_recreate_then_insert_with_padding() {
        let store = Arc::new(RecordingStore::default());
        let calls = store.calls.clone();
        let sink = TableSink::new(store);

        let inserted = sink.write(&table(vec![vec!["1", "Alice", "10"], vec!["2"]])).await.unwrap();
        assert_eq!(inserted, 2);

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls, vec![
            Call::Connect,
            Call::Execute("DROP TABLE IF EXISTS \"sales\"".into()),
            Call::Execute("CREATE TABLE \"sales\" (c0 TEXT, c1 TEXT, c2 TEXT)".into()),
            Call::Close,
            Call::Connect,
            Call::Commit(
                "INSERT INTO \"sales\" (c0, c1, c2) VALUES ($1, $2, $3)".into(),
                vec![
                    vec!["1".into(), "Alice".into(), "10".into()],
                    vec!["2".into(), "".into(), "".into()],
                ],
            ),
            Call::Close,
        ]);
    }

    #[tokio::test]
    async fn test_commits_every_500_rows_and_at_the_end() {
        let store = Arc::new(RecordingStore::default());
        let calls = store.calls.clone();
        let sink = TableSink::new(store);

        let rows: Vec<Vec<String>> = (0..1001).map(|i| vec![i.to_string()]).collect();
        let inserted = sink.insert_rows("sales", &rows, 1).await.unwrap();
        assert_eq!(inserted, 1001);

        let sizes: Vec<usize> = calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Commit(_, rows) => Some(rows.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![500, 500, 1]);
    }

    #[test]
    fn test_zero_columns_is_a_no_op() {
        let store = Arc::new(RecordingStore::default());
        let calls = store.calls.clone();
        let sink = TableSink::new(store);

        let inserted = tokio_test::block_on(sink.write(&table(vec![]))).unwrap();
        assert_eq!(inserted, 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_failure_keeps_recreated_table() {
        let store = Arc::new(RecordingStore {
            fail_commits: true,
            ..Default::default()
        });
        let calls = store.calls.clone();
        let sink = TableSink::new(store);

        let err = sink.write(&table(vec![vec!["1"]])).await.unwrap_err();
        assert!(matches!(err, SinkError::Database(_)));

        let calls = calls.lock().unwrap();
        assert!(calls.contains(&Call::Execute("CREATE TABLE \"sales\" (c0 TEXT)".into())));
        assert!(!calls.iter().any(|c| matches!(c, Call::Commit(..))));
    }
}
