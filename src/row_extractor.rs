use csv::ReaderBuilder;
use log::debug;

use crate::error::ExtractError;

/// First cell of the header row; everything up to and including it is dropped.
const HEADER_MARKER: &str = "ID";

/// Rows of one attachment, header stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTable {
    pub name: String,
    pub column_count: usize,
    pub rows: Vec<Vec<String>>,
}

impl ExtractedTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct RowExtractor;

impl RowExtractor {
    /// Parses a `;`-separated UTF-8 buffer. Without a header row the
    /// table comes back empty rather than guessing where data starts.
    pub fn extract(name: &str, content: &[u8]) -> Result<ExtractedTable, ExtractError> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .from_reader(content);

        let mut rows = Vec::new();
        let mut header_seen = false;

        for (line_num, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| ExtractError {
                line: e.position().map_or(line_num + 1, |pos| pos.line() as usize),
                message: e.to_string(),
            })?;

            if !header_seen {
                header_seen = record.get(0) == Some(HEADER_MARKER);
                continue;
            }

            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if !header_seen {
            debug!("No '{}' header row in attachment for '{}'", HEADER_MARKER, name);
        }

        let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
        debug!("Extracted {} row(s), {} column(s) for '{}'", rows.len(), column_count, name);

        Ok(ExtractedTable {
            name: name.to_string(),
            column_count,
            rows,
        })
    }
}
