use anyhow::{Result, Context};
use async_imap::types::Flag;
use async_imap::Session;
use async_trait::async_trait;
use futures::stream::{Stream, TryStreamExt};
use log::{info, debug, warn};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::attachment_parser::AttachmentParser;
use crate::config::ImapConfig;
use crate::mailbox::{BodyPart, MailStore, MessageFlags, MessageSummary};

type ImapSession = Session<Compat<TlsStream<TcpStream>>>;

/// IMAP folder opened read-write for one scan.
pub struct ImapClient {
    session: ImapSession,
    folder: String,
    message_count: u32,
}

impl ImapClient {
    /// Connects over TLS, logs in and selects the configured folder.
    pub async fn open(config: &ImapConfig) -> Result<Self> {
        info!("Connecting to IMAP server {}:{}", config.server, config.port);
        if config.use_starttls {
            debug!("USE_STARTTLS set, the connection uses implicit TLS anyway");
        }

        let tcp_stream = TcpStream::connect((config.server.as_str(), config.port))
            .await
            .context("Unable to connect to IMAP server")?;

        let tls = tokio_native_tls::native_tls::TlsConnector::new()
            .context("Unable to build TLS connector")?;
        let tls = tokio_native_tls::TlsConnector::from(tls);
        let tls_stream = tls.connect(&config.server, tcp_stream)
            .await
            .context("Unable to establish TLS connection")?;

        let client = async_imap::Client::new(tls_stream.compat());

        let mut session = client
            .login(&config.username, &config.password)
            .await
            .map_err(|e| anyhow::anyhow!("IMAP authentication failed: {:?}", e.0))?;

        let mailbox = session.select(&config.folder)
            .await
            .with_context(|| format!("Unable to open folder {}", config.folder))?;

        info!("✅ Folder '{}' opened, {} message(s)", config.folder, mailbox.exists);

        Ok(ImapClient {
            session,
            folder: config.folder.clone(),
            message_count: mailbox.exists,
        })
    }
}

#[async_trait]
impl MailStore for ImapClient {
    fn message_count(&self) -> u32 {
        self.message_count
    }

    async fn fetch_summary(&mut self, index: u32) -> Result<MessageSummary> {
        // PEEK keeps \Seen untouched; only the scanner decides on flags
        let responses = self.session
            .fetch(index.to_string(), "(FLAGS INTERNALDATE BODY.PEEK[HEADER])")
            .await
            .with_context(|| format!("Unable to fetch message {}", index))?;
        let messages = drain(responses, || format!("Unable to read headers of message {}", index)).await?;

        let message = messages.first()
            .with_context(|| format!("Message {} not found in {}", index, self.folder))?;

        let mut flags = MessageFlags::default();
        for flag in message.flags() {
            match flag {
                Flag::Seen => flags.seen = true,
                Flag::Flagged => flags.flagged = true,
                Flag::Deleted => flags.deleted = true,
                _ => {}
            }
        }

        let parsed = message.header()
            .and_then(|header| mail_parser::MessageParser::default().parse(header));

        let subject = parsed.as_ref()
            .and_then(|m| m.subject())
            .unwrap_or_default()
            .to_string();

        let received = match message.internal_date() {
            Some(date) => date.with_timezone(&chrono::Utc),
            None => {
                warn!("Message {} has no INTERNALDATE, using its Date header", index);
                parsed.as_ref()
                    .and_then(|m| m.date())
                    .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0))
                    .with_context(|| format!("Message {} has no usable date", index))?
            }
        };

        debug!("Message {}: '{}' received {} {:?}", index, subject, received, flags);

        Ok(MessageSummary {
            subject,
            received,
            flags,
        })
    }

    async fn fetch_parts(&mut self, index: u32) -> Result<Vec<BodyPart>> {
        let responses = self.session
            .fetch(index.to_string(), "BODY.PEEK[]")
            .await
            .with_context(|| format!("Unable to fetch message {}", index))?;
        let messages = drain(responses, || format!("Unable to read body of message {}", index)).await?;

        let body = messages.first()
            .and_then(|m| m.body())
            .with_context(|| format!("Message {} is empty or missing", index))?;

        debug!("Message {} retrieved, size: {} bytes", index, body.len());
        Ok(AttachmentParser::body_parts(body))
    }

    async fn add_flags(&mut self, index: u32, flags: MessageFlags) -> Result<()> {
        let query = format!("+FLAGS ({})", imap_flag_list(flags));
        debug!("STORE {} {}", index, query);

        let responses = self.session
            .store(index.to_string(), &query)
            .await
            .with_context(|| format!("Unable to update flags of message {}", index))?;

        // The STORE only completes once its responses are consumed
        drain(responses, || format!("Server rejected new flags for message {}", index)).await?;
        Ok(())
    }

    async fn close(mut self: Box<Self>, expunge: bool) -> Result<()> {
        if expunge {
            debug!("Closing folder {} with expunge", self.folder);
            self.session.close()
                .await
                .context("Error while closing the IMAP folder")?;
        }

        info!("Disconnecting from IMAP server");
        self.session.logout()
            .await
            .context("Error during IMAP logout")?;
        Ok(())
    }
}

/// Consumes a response stream, stopping at the first error.
async fn drain<S, T, E, F>(responses: S, context: F) -> Result<Vec<T>>
where
    S: Stream<Item = std::result::Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
    F: FnOnce() -> String,
{
    responses.try_collect::<Vec<T>>().await.with_context(context)
}

fn imap_flag_list(flags: MessageFlags) -> String {
    let mut names = Vec::new();
    if flags.seen {
        names.push("\\Seen");
    }
    if flags.flagged {
        names.push("\\Flagged");
    }
    if flags.deleted {
        names.push("\\Deleted");
    }
    names.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_imap_flag_list() {
        assert_eq!(imap_flag_list(MessageFlags::SEEN_FLAGGED), "\\Seen \\Flagged");
        assert_eq!(imap_flag_list(MessageFlags::SEEN_DELETED), "\\Seen \\Deleted");
        assert_eq!(imap_flag_list(MessageFlags::default()), "");
    }

    #[test]
    fn test_drain_collects_all_responses() {
        let responses = futures::stream::iter(vec![Ok::<_, io::Error>(1), Ok(2)]);
        let collected = tokio_test::block_on(drain(responses, || "unused".to_string())).unwrap();
        assert_eq!(collected, vec![1, 2]);
    }

    #[test]
    fn test_drain_reports_failed_response() {
        let responses = futures::stream::iter(vec![
            Ok(1),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "NO STORE failed")),
        ]);
        let err = tokio_test::block_on(drain(responses, || "Server rejected new flags for message 7".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "Server rejected new flags for message 7");
        assert!(format!("{:#}", err).contains("NO STORE failed"));
    }
}
