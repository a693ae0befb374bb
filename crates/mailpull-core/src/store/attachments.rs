//! Attachment discovery in a parsed MIME tree.

use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use super::{StoreError, StoreResult};

const FALLBACK_NAME: &str = "attachment";

/// One decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPart {
    /// Unsanitized file name as found in the message.
    pub filename: String,
    /// Decoded body.
    pub body: Vec<u8>,
    /// Whether the part is an embedded message (`message/rfc822`).
    pub is_message: bool,
}

impl AttachmentPart {
    /// File name to write, forcing `.eml` on embedded messages.
    pub fn output_name(&self) -> String {
        if self.is_message && !self.filename.to_ascii_lowercase().ends_with(".eml") {
            format!("{}.eml", self.filename)
        } else {
            self.filename.clone()
        }
    }
}

/// Parse `raw` and return its attachments in message order.
pub fn collect_attachments(raw: &[u8]) -> StoreResult<Vec<AttachmentPart>> {
    let parsed = mailparse::parse_mail(raw).map_err(|e| StoreError::Parse(e.to_string()))?;
    let mut found = Vec::new();
    walk(&parsed, &mut found)?;
    Ok(found)
}

fn walk(part: &ParsedMail<'_>, found: &mut Vec<AttachmentPart>) -> StoreResult<()> {
    if part.ctype.mimetype.starts_with("multipart/") {
        for sub in &part.subparts {
            walk(sub, found)?;
        }
        return Ok(());
    }

    if !is_attachment(part) {
        return Ok(());
    }

    let body = part
        .get_body_raw()
        .map_err(|e| StoreError::Parse(e.to_string()))?;
    let mimetype = part.ctype.mimetype.as_str();
    found.push(AttachmentPart {
        filename: filename_of(part),
        body,
        is_message: mimetype == "message/rfc822" || mimetype == "message/global",
    });
    Ok(())
}

fn is_attachment(part: &ParsedMail<'_>) -> bool {
    let disposition = part.get_content_disposition();
    let explicit = part.headers.get_first_value("Content-Disposition").is_some();

    match disposition.disposition {
        DispositionType::Attachment => true,
        DispositionType::Inline if explicit => false,
        _ => {
            part.ctype.params.contains_key("name") || disposition.params.contains_key("filename")
        }
    }
}

fn filename_of(part: &ParsedMail<'_>) -> String {
    let disposition = part.get_content_disposition();
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_NAME)
        .to_string()
}
