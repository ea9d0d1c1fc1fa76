//! Claim email model — parsed from mailbox JSON documents or raw RFC 822.
//!
//! Inbox exports arrive as JSON documents (one email per blob) with the
//! upstream mailbox connector's field names; raw `.eml` files are parsed
//! with mail-parser. Both converge on [`ClaimEmail`].

use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::ingest::attachment::AttachmentInfo;

/// One inbound claims email, normalized for triage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimEmail {
    /// Message-ID header, or a name-derived fallback. Used for dedupe.
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub body_text: String,
    pub body_html: Option<String>,
    pub attachments: Vec<AttachmentInfo>,
    /// Name of the source document this email came from.
    pub source_name: String,
}

impl ClaimEmail {
    /// Parse a JSON email document as exported by the mailbox connector.
    ///
    /// Field names follow the export format (`from`, `to`, `body_text`).
    /// Missing fields default to empty; unparseable JSON is an error.
    pub fn from_json(name: &str, raw: &[u8]) -> Result<Self, SourceError> {
        let doc: RawEmailDoc =
            serde_json::from_slice(raw).map_err(|e| SourceError::InvalidDocument {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let body_text = if doc.body_text.is_empty() {
            doc.body_html.as_deref().map(strip_html).unwrap_or_default()
        } else {
            doc.body_text
        };

        let message_id = if doc.message_id.is_empty() {
            format!("<{name}>")
        } else {
            doc.message_id
        };

        Ok(Self {
            message_id,
            subject: doc.subject,
            sender: doc.from,
            recipients: doc.to,
            cc: doc.cc,
            date: doc.date.as_deref().and_then(parse_date),
            body_text,
            body_html: doc.body_html,
            attachments: doc
                .attachments
                .into_iter()
                .map(|a| AttachmentInfo::classify(&a.filename, a.file_size, a.blob_path))
                .collect(),
            source_name: name.to_string(),
        })
    }

    /// Parse a raw RFC 822 message (`.eml`).
    pub fn from_rfc822(name: &str, raw: &[u8]) -> Result<Self, SourceError> {
        let parsed =
            MessageParser::default()
                .parse(raw)
                .ok_or_else(|| SourceError::InvalidDocument {
                    name: name.to_string(),
                    reason: "not a parseable RFC 822 message".to_string(),
                })?;

        let message_id = parsed
            .message_id()
            .map(|id| format!("<{id}>"))
            .unwrap_or_else(|| format!("<{name}>"));

        let attachments = parsed
            .attachments()
            .map(|part| {
                let filename = part.attachment_name().unwrap_or("attachment");
                AttachmentInfo::classify(filename, Some(part.contents().len() as u64), None)
            })
            .collect();

        Ok(Self {
            message_id,
            subject: parsed.subject().unwrap_or_default().to_string(),
            sender: extract_sender(&parsed),
            recipients: extract_addresses(parsed.to()),
            cc: extract_addresses(parsed.cc()),
            date: parsed
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
            body_text: extract_text(&parsed),
            body_html: parsed.body_html(0).map(|h| h.to_string()),
            attachments,
            source_name: name.to_string(),
        })
    }

    /// The text extraction and classification run over: subject line first,
    /// then the body, so subject keywords participate in triage.
    pub fn triage_text(&self) -> String {
        if self.subject.is_empty() {
            return self.body_text.clone();
        }
        format!("{}\n{}", self.subject, self.body_text)
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// JSON export shape from the mailbox connector.
#[derive(Deserialize)]
struct RawEmailDoc {
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    cc: Vec<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    body_text: String,
    #[serde(default)]
    body_html: Option<String>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
}

#[derive(Deserialize)]
struct RawAttachment {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    blob_path: Option<String>,
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

/// Readable text from a parsed message: plain body, else stripped HTML.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
