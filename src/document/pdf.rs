use super::DecodeError;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extracts the text layer of a PDF
pub fn extract_text(bytes: &[u8]) -> Result<String, DecodeError> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(DecodeError::CorruptDocument("missing %PDF header".into()));
    }

    // pdf-extract panics on some malformed inputs instead of returning an error
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| DecodeError::CorruptDocument("PDF parser aborted".into()))?;

    extracted.map_err(|e| DecodeError::CorruptDocument(e.to_string()))
}
