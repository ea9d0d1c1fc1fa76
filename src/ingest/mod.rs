//! Inbound email ingestion — document sources, parsing, attachments.

pub mod attachment;
pub mod email;
pub mod source;

pub use attachment::{AttachmentInfo, AttachmentKind};
pub use email::ClaimEmail;
pub use source::{DirSource, MailSource};
