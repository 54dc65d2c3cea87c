/// Mail store abstraction used by the scanner
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Flag state of one message, limited to the flags the scanner reads or writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFlags {
    pub seen: bool,
    pub flagged: bool,
    pub deleted: bool,
}

impl MessageFlags {
    pub const SEEN_FLAGGED: MessageFlags = MessageFlags {
        seen: true,
        flagged: true,
        deleted: false,
    };

    pub const SEEN_DELETED: MessageFlags = MessageFlags {
        seen: true,
        flagged: false,
        deleted: true,
    };

    /// True when a previous run already saved this message.
    pub fn is_processed(&self) -> bool {
        self.seen && self.flagged
    }

    pub fn merge(&mut self, other: MessageFlags) {
        self.seen |= other.seen;
        self.flagged |= other.flagged;
        self.deleted |= other.deleted;
    }
}

/// What the scanner needs to know about a message before deciding whether
/// to download it.
#[derive(Debug, Clone)]
pub struct MessageSummary {
    pub subject: String,
    pub received: DateTime<Utc>,
    pub flags: MessageFlags,
}

#[derive(Debug, Clone)]
pub struct BodyPart {
    pub filename: Option<String>,
    pub content: Vec<u8>,
}

/// An opened, read-write mail folder. Messages are addressed by their
/// 1-based sequence number.
#[async_trait]
pub trait MailStore: Send {
    /// Number of messages in the folder when it was opened
    fn message_count(&self) -> u32;

    async fn fetch_summary(&mut self, index: u32) -> Result<MessageSummary>;

    async fn fetch_parts(&mut self, index: u32) -> Result<Vec<BodyPart>>;

    /// Adds `flags` to the message; flags already set are kept.
    async fn add_flags(&mut self, index: u32, flags: MessageFlags) -> Result<()>;

    /// Closes the folder. With `expunge`, messages flagged DELETED are removed.
    async fn close(self: Box<Self>, expunge: bool) -> Result<()>;
}
