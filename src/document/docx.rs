use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use super::DecodeError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extracts body text from a DOCX package (paragraphs become lines)
pub fn extract_text(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DecodeError::CorruptDocument(format!("not a DOCX package: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| DecodeError::CorruptDocument(format!("{} missing: {}", DOCUMENT_PART, e)))?
        .read_to_string(&mut xml)
        .map_err(|e| DecodeError::CorruptDocument(format!("{} unreadable: {}", DOCUMENT_PART, e)))?;

    document_text(&xml)
}

fn document_text(xml: &str) -> Result<String, DecodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" | b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| DecodeError::CorruptDocument(format!("bad text run: {}", e)))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DecodeError::CorruptDocument(format!("malformed {}: {}", DOCUMENT_PART, e)));
            }
            _ => {}
        }
    }

    Ok(out.trim_end().to_string())
}
