//! Text extraction for uploaded documents.
//!
//! Uploads arrive as bytes plus a content type; this module returns the
//! plain UTF-8 full text the chunker and snippet spans are defined over.
//! Extraction happens synchronously at upload time, before anything is
//! persisted, so a failed extraction rejects the upload cleanly.

use std::io::Read;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

use crate::error::{Error, Result};

/// Guess a supported content type from a file name, defaulting to plain text
/// for unknown extensions.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "md" | "markdown" => MIME_MARKDOWN,
        _ => MIME_TEXT,
    }
}

/// Extract plain text from uploaded bytes.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String> {
    match content_type {
        MIME_TEXT | MIME_MARKDOWN => String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Extract(format!("invalid UTF-8: {e}"))),
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        other => Err(Error::Extract(format!("unsupported content type: {other}"))),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::Extract(format!("PDF extraction failed: {e}")))
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| Error::Extract(format!("OOXML: {e}")))?;

    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| Error::Extract(format!("OOXML: {e}")))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| Error::Extract(format!("OOXML: {e}")))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(Error::Extract(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_w_t_elements(&doc_xml)
}

// Word body text lives in <w:t> runs; paragraphs (<w:p>) become newlines so
// character offsets stay stable and readable.
fn extract_w_t_elements(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(Error::Extract(format!("OOXML: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("hello world".as_bytes(), MIME_TEXT).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = extract_text(&[0xff, 0xfe, 0x00], MIME_TEXT).unwrap_err();
        assert!(matches!(err, Error::Extract(_)));
    }

    #[test]
    fn unsupported_content_type_is_rejected() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, Error::Extract(_)));
    }

    #[test]
    fn invalid_pdf_is_rejected() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, Error::Extract(_)));
    }

    #[test]
    fn invalid_zip_is_rejected_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, Error::Extract(_)));
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(content_type_for("report.pdf"), MIME_PDF);
        assert_eq!(content_type_for("notes.docx"), MIME_DOCX);
        assert_eq!(content_type_for("README.md"), MIME_MARKDOWN);
        assert_eq!(content_type_for("data.txt"), MIME_TEXT);
        assert_eq!(content_type_for("no_extension"), MIME_TEXT);
    }
}
