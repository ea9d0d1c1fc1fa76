//! Attachment classification by filename.
//!
//! Cheap, content-free heuristics: the extension decides kind and category,
//! and a couple of filename keywords flag likely invoices and medical
//! records for the adjuster queue. Downloading or inspecting attachment
//! bytes is out of scope here.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Broad attachment kind, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Document,
    Spreadsheet,
    Image,
    Video,
    Email,
    Unknown,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Document => "document",
            AttachmentKind::Spreadsheet => "spreadsheet",
            AttachmentKind::Image => "image",
            AttachmentKind::Video => "video",
            AttachmentKind::Email => "email",
            AttachmentKind::Unknown => "unknown",
        }
    }

    pub fn from_str_or_unknown(s: &str) -> Self {
        match s {
            "document" => AttachmentKind::Document,
            "spreadsheet" => AttachmentKind::Spreadsheet,
            "image" => AttachmentKind::Image,
            "video" => AttachmentKind::Video,
            "email" => AttachmentKind::Email,
            _ => AttachmentKind::Unknown,
        }
    }
}

/// One classified email attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub filename: String,
    pub kind: AttachmentKind,
    /// Finer-grained bucket, e.g. `pdf_document` or `photo`.
    pub category: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub blob_path: Option<String>,
    pub is_invoice: bool,
    pub is_medical_record: bool,
}

impl AttachmentInfo {
    /// Classify an attachment from its filename alone.
    pub fn classify(filename: &str, file_size: Option<u64>, blob_path: Option<String>) -> Self {
        let (kind, category) = classify_extension(filename);
        let lowered = filename.to_lowercase();
        Self {
            filename: filename.to_string(),
            kind,
            category: category.to_string(),
            file_size,
            blob_path,
            is_invoice: INVOICE_HINTS.iter().any(|h| lowered.contains(h)),
            is_medical_record: MEDICAL_HINTS.iter().any(|h| lowered.contains(h)),
        }
    }
}

const INVOICE_HINTS: &[&str] = &["invoice", "bill", "estimate", "receipt"];
const MEDICAL_HINTS: &[&str] = &["medical", "hospital", "treatment", "prescription"];

/// Map a filename extension to (kind, category).
fn classify_extension(filename: &str) -> (AttachmentKind, &'static str) {
    let ext = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => (AttachmentKind::Document, "pdf_document"),
        "doc" | "docx" => (AttachmentKind::Document, "word_document"),
        "xls" | "xlsx" => (AttachmentKind::Spreadsheet, "excel"),
        "csv" => (AttachmentKind::Spreadsheet, "csv"),
        "jpg" | "jpeg" | "png" | "gif" | "tiff" => (AttachmentKind::Image, "photo"),
        "mp4" | "avi" | "mov" => (AttachmentKind::Video, "video"),
        "eml" | "msg" => (AttachmentKind::Email, "email_file"),
        _ => (AttachmentKind::Unknown, "other"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_is_a_document() {
        let att = AttachmentInfo::classify("invoice.pdf", Some(1024), None);
        assert_eq!(att.kind, AttachmentKind::Document);
        assert_eq!(att.category, "pdf_document");
        assert!(att.is_invoice);
        assert!(!att.is_medical_record);
    }

    #[test]
    fn photo_extensions_map_to_image() {
        for name in ["accident_photo.jpg", "scene.JPEG", "roof.png"] {
            let att = AttachmentInfo::classify(name, None, None);
            assert_eq!(att.kind, AttachmentKind::Image, "for {name}");
            assert_eq!(att.category, "photo");
        }
    }

    #[test]
    fn spreadsheet_and_email_extensions() {
        assert_eq!(
            AttachmentInfo::classify("costs.xlsx", None, None).category,
            "excel"
        );
        assert_eq!(
            AttachmentInfo::classify("export.csv", None, None).category,
            "csv"
        );
        assert_eq!(
            AttachmentInfo::classify("forwarded.eml", None, None).kind,
            AttachmentKind::Email
        );
    }

    #[test]
    fn unknown_extension_falls_through() {
        let att = AttachmentInfo::classify("archive.zip", None, None);
        assert_eq!(att.kind, AttachmentKind::Unknown);
        assert_eq!(att.category, "other");
    }

    #[test]
    fn no_extension_is_unknown() {
        let att = AttachmentInfo::classify("README", None, None);
        assert_eq!(att.kind, AttachmentKind::Unknown);
    }

    #[test]
    fn medical_hint_in_filename() {
        let att = AttachmentInfo::classify("hospital_discharge.pdf", None, None);
        assert!(att.is_medical_record);
        assert!(!att.is_invoice);
    }

    #[test]
    fn hint_matching_is_case_insensitive() {
        assert!(AttachmentInfo::classify("INVOICE_443.PDF", None, None).is_invoice);
        assert!(AttachmentInfo::classify("Medical-Report.docx", None, None).is_medical_record);
    }

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [
            AttachmentKind::Document,
            AttachmentKind::Spreadsheet,
            AttachmentKind::Image,
            AttachmentKind::Video,
            AttachmentKind::Email,
            AttachmentKind::Unknown,
        ] {
            assert_eq!(AttachmentKind::from_str_or_unknown(kind.as_str()), kind);
        }
    }
}
