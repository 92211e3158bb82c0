pub mod docx;
pub mod pdf;

use std::path::Path;

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt document: {0}")]
    CorruptDocument(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentKind {
    pub fn from_mime(mime: &str) -> Result<Self, DecodeError> {
        // Ignore parameters such as "; charset=utf-8"
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            MIME_PDF => Ok(Self::Pdf),
            MIME_DOCX => Ok(Self::Docx),
            MIME_TEXT => Ok(Self::PlainText),
            _ => Err(DecodeError::UnsupportedFormat(mime.to_string())),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, DecodeError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "txt" | "md" => Ok(Self::PlainText),
            _ => Err(DecodeError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => MIME_PDF,
            Self::Docx => MIME_DOCX,
            Self::PlainText => MIME_TEXT,
        }
    }
}

/// Turns document bytes into narratable text. A failure means "no text":
/// partial output is never returned.
pub trait DocumentDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], mime: &str) -> Result<String, DecodeError>;
}

/// PDF, DOCX and plain-text decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDecoder;

impl DocumentDecoder for StandardDecoder {
    fn decode(&self, bytes: &[u8], mime: &str) -> Result<String, DecodeError> {
        let kind = DocumentKind::from_mime(mime)?;
        let text = match kind {
            DocumentKind::Pdf => pdf::extract_text(bytes)?,
            DocumentKind::Docx => docx::extract_text(bytes)?,
            DocumentKind::PlainText => String::from_utf8(bytes.to_vec())
                .map_err(|e| DecodeError::CorruptDocument(format!("text is not UTF-8: {}", e)))?,
        };
        tracing::info!("Decoded {:?} document: {} bytes -> {} chars", kind, bytes.len(), text.len());
        Ok(text)
    }
}

/// Reads a file and returns its bytes with the MIME type implied by its extension
pub fn read_document(path: &Path) -> Result<(Vec<u8>, &'static str), crate::error::NarrationError> {
    let kind = DocumentKind::from_path(path)?;
    let bytes = std::fs::read(path)?;
    Ok((bytes, kind.mime()))
}
