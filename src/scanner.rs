use std::collections::HashSet;

use anyhow::{Result, Context};
use chrono::{DateTime, Local, Months, NaiveDate, Utc};
use log::{info, debug, warn, error};

use crate::attachment_parser::AttachmentParser;
use crate::error::HandlingError;
use crate::filter::{MessageFilter, Verdict};
use crate::mailbox::{MailStore, MessageFlags};
use crate::row_extractor::RowExtractor;
use crate::sink::{Payload, Sink, SinkReport};
use crate::subject::SubjectPatterns;

/// State owned by one scan: the subjects handled so far (saved or not), the
/// current message index and the date below which non-matching mail ends the scan.
#[derive(Debug)]
pub struct ScanSession {
    processed_subjects: HashSet<String>,
    cursor: u32,
    min_date: NaiveDate,
}

impl ScanSession {
    pub fn new(message_count: u32, today: NaiveDate) -> Self {
        ScanSession {
            processed_subjects: HashSet::new(),
            cursor: message_count,
            min_date: today.checked_sub_months(Months::new(1)).unwrap_or(NaiveDate::MIN),
        }
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn min_date(&self) -> NaiveDate {
        self.min_date
    }

    /// `normalized` must already be lower-cased.
    pub fn is_processed(&self, normalized: &str) -> bool {
        self.processed_subjects.contains(normalized)
    }

    /// Returns false if the subject was already recorded.
    pub fn mark_processed(&mut self, subject: &str) -> bool {
        self.processed_subjects.insert(subject.to_lowercase())
    }

    /// Compares calendar days in local time.
    pub fn is_before_cutoff(&self, received: DateTime<Utc>) -> bool {
        received.with_timezone(&Local).date_naive() < self.min_date
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Messages looked at, newest first
    pub inspected: u32,
    /// Distinct subjects saved in this run
    pub saved: usize,
    /// Dry run only: subjects that would have been saved
    pub previewed: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
    /// True when the scan stopped at the date cutoff rather than the oldest message
    pub stopped_at_cutoff: bool,
}

/// How one eligible message went.
#[derive(Debug)]
enum Handled {
    Persisted(SinkReport),
    /// Header-only or header-less attachment; nothing to write
    Empty,
    /// Dry run: the attachment was read and parsed but not written
    Previewed,
    Skipped(HandlingError),
}

/// Walks a folder from the newest message to the oldest, saving the
/// `data.csv` attachment of every subscription email not yet processed.
pub struct Scanner {
    patterns: SubjectPatterns,
    sink: Sink,
    dry_run: bool,
}

impl Scanner {
    pub fn new(sink: Sink, dry_run: bool) -> Result<Self> {
        Ok(Scanner {
            patterns: SubjectPatterns::new().context("Invalid subject pattern")?,
            sink,
            dry_run,
        })
    }

    /// Scans and then closes the folder, whatever the outcome. The folder is
    /// expunged on close unless this is a dry run.
    pub async fn run(&self, mut store: Box<dyn MailStore>, today: NaiveDate) -> Result<ScanSummary> {
        let result = self.scan(store.as_mut(), today).await;
        let closed = store.close(!self.dry_run).await;

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(close_err) = closed {
                    warn!("Folder could not be closed cleanly: {:#}", close_err);
                }
                return Err(e);
            }
        };
        closed?;
        Ok(summary)
    }

    pub async fn scan(&self, store: &mut dyn MailStore, today: NaiveDate) -> Result<ScanSummary> {
        let message_count = store.message_count();
        let mut session = ScanSession::new(message_count, today);
        let mut summary = ScanSummary::default();
        let filter = MessageFilter::new(&self.patterns);

        info!("Scanning {} message(s), cutoff date {}", message_count, session.min_date());

        while session.cursor > 0 {
            let index = session.cursor;
            let message = store.fetch_summary(index).await?;

            match filter.classify(&message.subject, message.flags, &session) {
                Verdict::Eligible => {
                    debug!("Message {} eligible: '{}'", index, message.subject);
                    match self.handle_message(store, index, &message.subject).await? {
                        Handled::Skipped(reason) => {
                            info!("{}. Message doesn't fit, checking previous messages...", reason);
                            summary.skipped += 1;
                        }
                        Handled::Persisted(report) if !report.any_succeeded() => {
                            error!("❌ Message {} '{}' could not be saved anywhere, left for the next run",
                                   index, message.subject);
                            // Older copies of this subject are still duplicates
                            session.mark_processed(&message.subject);
                            summary.failed += 1;
                        }
                        Handled::Persisted(_) | Handled::Empty | Handled::Previewed => {
                            self.mark_saved(store, &mut session, index, &message.subject).await?;
                            if self.dry_run {
                                summary.previewed += 1;
                            } else {
                                summary.saved += 1;
                            }
                        }
                    }
                }
                Verdict::Duplicate => {
                    debug!("Message {} duplicates '{}', removing it", index, message.subject);
                    if !self.dry_run {
                        store.add_flags(index, MessageFlags::SEEN_DELETED).await?;
                    }
                    summary.duplicates += 1;
                }
                verdict => {
                    debug_assert!(verdict.checks_cutoff());
                    if session.is_before_cutoff(message.received) {
                        info!("Message {} received {} is older than the cutoff, stopping",
                              index, message.received.with_timezone(&Local).format("%Y-%m-%d"));
                        summary.stopped_at_cutoff = true;
                        break;
                    }
                }
            }

            session.cursor -= 1;
        }

        summary.inspected = message_count - session.cursor();

        if self.dry_run {
            info!("🧪 {} messages processed, {} messages would be saved. Exiting...",
                  summary.inspected, summary.previewed);
        } else {
            info!("{} messages processed, {} messages saved. Exiting...", summary.inspected, summary.saved);
        }
        Ok(summary)
    }

    async fn handle_message(&self, store: &mut dyn MailStore, index: u32, subject: &str) -> Result<Handled> {
        let parts = store.fetch_parts(index).await?;

        let raw = match AttachmentParser::find_expected(parts) {
            Ok(raw) => raw,
            Err(e) => return Ok(Handled::Skipped(e)),
        };
        let name = match self.patterns.target_name(subject) {
            Ok(name) => name,
            Err(e) => return Ok(Handled::Skipped(e)),
        };

        let table = RowExtractor::extract(&name, &raw);
        if matches!(&table, Ok(t) if t.is_empty()) {
            info!("Attachment for '{}' holds no data rows, nothing to save", name);
            return Ok(Handled::Empty);
        }

        if self.dry_run {
            match &table {
                Ok(t) => info!("🧪 Would save '{}': {} row(s), {} column(s), {} bytes",
                               name, t.rows.len(), t.column_count, raw.len()),
                Err(e) => info!("🧪 Would save '{}': {} bytes, CSV unreadable ({})", name, raw.len(), e),
            }
            return Ok(Handled::Previewed);
        }

        let payload = Payload { name, raw, table };
        let report = self.sink.persist(&payload).await;
        if report.any_succeeded() {
            info!("✅ '{}' saved to {}", payload.name, report.succeeded.join(" and "));
        }
        Ok(Handled::Persisted(report))
    }

    async fn mark_saved(
        &self,
        store: &mut dyn MailStore,
        session: &mut ScanSession,
        index: u32,
        subject: &str,
    ) -> Result<()> {
        if !self.dry_run {
            store.add_flags(index, MessageFlags::SEEN_FLAGGED).await?;
        }
        session.mark_processed(subject);
        Ok(())
    }
}
