use crate::mailbox::MessageFlags;
use crate::scanner::ScanSession;
use crate::subject::SubjectPatterns;

/// Outcome of looking at a message's subject and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Matches a subscription pattern and still needs saving
    Eligible,
    /// Same subject already saved earlier in this scan; mark SEEN + DELETED
    Duplicate,
    /// SEEN and FLAGGED by a previous run
    AlreadyProcessed,
    NotMatching,
}

impl Verdict {
    /// Rejections that count toward the scan's date cutoff.
    pub fn checks_cutoff(self) -> bool {
        matches!(self, Verdict::AlreadyProcessed | Verdict::NotMatching)
    }
}

pub struct MessageFilter<'a> {
    patterns: &'a SubjectPatterns,
}

impl<'a> MessageFilter<'a> {
    pub fn new(patterns: &'a SubjectPatterns) -> Self {
        MessageFilter { patterns }
    }

    pub fn classify(&self, subject: &str, flags: MessageFlags, session: &ScanSession) -> Verdict {
        let normalized = subject.to_lowercase();

        if self.patterns.classify(&normalized).is_none() {
            return Verdict::NotMatching;
        }
        if session.is_processed(&normalized) {
            return Verdict::Duplicate;
        }
        if flags.is_processed() {
            return Verdict::AlreadyProcessed;
        }
        Verdict::Eligible
    }
}
