use log::debug;
use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::HandlingError;
use crate::mailbox::BodyPart;

/// Name of the only attachment the loader cares about.
pub const EXPECTED_ATTACHMENT: &str = "data.csv";

pub struct AttachmentParser;

impl AttachmentParser {
    /// Splits a raw RFC 822 message into its leaf body parts, decoded.
    pub fn body_parts(raw_email: &[u8]) -> Vec<BodyPart> {
        let Some(message) = MessageParser::default().parse(raw_email) else {
            debug!("Message could not be parsed as MIME, no body parts");
            return Vec::new();
        };

        let parts: Vec<BodyPart> = message.parts
            .iter()
            .filter(|part| !matches!(part.body, PartType::Multipart(_)))
            .map(|part| BodyPart {
                filename: part.attachment_name().map(str::to_string),
                content: part.contents().to_vec(),
            })
            .collect();

        debug!("Found {} body part(s)", parts.len());
        parts
    }

    /// Returns the content of the first part named exactly [`EXPECTED_ATTACHMENT`].
    pub fn find_expected(parts: Vec<BodyPart>) -> Result<Vec<u8>, HandlingError> {
        parts.into_iter()
            .find(|part| part.filename.as_deref() == Some(EXPECTED_ATTACHMENT))
            .map(|part| part.content)
            .ok_or(HandlingError::AttachmentNotFound(EXPECTED_ATTACHMENT))
    }
}
