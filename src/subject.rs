use anyhow::Result;
use log::warn;
use regex::Regex;

use crate::error::HandlingError;

/// PostgreSQL silently truncates longer identifiers.
pub const MAX_NAME_LEN: usize = 63;

/// Which subscription a subject belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    View,
    FinancialReport,
}

/// The two fixed subscription subject patterns. Subjects are matched
/// lower-cased and in full.
pub struct SubjectPatterns {
    view: Regex,
    report: Regex,
}

impl SubjectPatterns {
    pub fn new() -> Result<Self> {
        Ok(SubjectPatterns {
            view: Regex::new(r"^.*subscription for:.*?\bview:(.*)$")?,
            report: Regex::new(r"^.*subscription for financial report:(.*)$")?,
        })
    }

    /// `subject` must already be lower-cased.
    pub fn classify(&self, subject: &str) -> Option<SubjectKind> {
        if self.view.is_match(subject) {
            Some(SubjectKind::View)
        } else if self.report.is_match(subject) {
            Some(SubjectKind::FinancialReport)
        } else {
            None
        }
    }

    /// Derives a table / file name from a subject: the text after `view:` or
    /// `report:`, with every character outside `a-z` turned into `_`, cut
    /// to [`MAX_NAME_LEN`].
    pub fn target_name(&self, subject: &str) -> Result<String, HandlingError> {
        let normalized = subject.to_lowercase();
        let normalized = normalized.trim();

        let tail = self.view.captures(normalized)
            .or_else(|| self.report.captures(normalized))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .ok_or_else(|| HandlingError::SubjectIncorrect(subject.to_string()))?;

        if tail.chars().count() <= 3 {
            return Err(HandlingError::SubjectIncorrect(subject.to_string()));
        }

        let mut name: String = tail.chars()
            .map(|c| if c.is_ascii_lowercase() { c } else { '_' })
            .collect();

        if name.len() > MAX_NAME_LEN {
            warn!("Name '{}' is longer than {} characters, truncated", name, MAX_NAME_LEN);
            name.truncate(MAX_NAME_LEN);
        }
        Ok(name)
    }
}
