//! Text extraction for ingested files.
//!
//! Maps a file extension to a [`DocumentType`] and turns raw bytes into
//! plain UTF-8 text. Plain text and Markdown pass through as-is; PDF
//! goes through pdf-extract; DOCX is unzipped and the `w:t` text runs
//! are pulled from `word/document.xml`.

use std::io::Read;
use std::path::Path;

use quarry_core::error::{Error, Result};
use quarry_core::models::DocumentType;

/// Maximum decompressed bytes to read from a single ZIP entry
/// (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Determine the document type from a file path's extension.
pub fn doc_type_for_path(path: &Path) -> Result<DocumentType> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" => Ok(DocumentType::Plain),
        "md" | "markdown" => Ok(DocumentType::Markdown),
        "pdf" => Ok(DocumentType::Pdf),
        "docx" => Ok(DocumentType::Docx),
        _ => Err(Error::UnsupportedFormat(format!(
            "unsupported file extension: '{}'. Supported: txt, md, pdf, docx",
            ext
        ))),
    }
}

/// Extract plain text from raw file content.
pub fn extract_text(bytes: &[u8], doc_type: DocumentType) -> Result<String> {
    match doc_type {
        DocumentType::Plain | DocumentType::Markdown => String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::invalid_input(format!("file is not valid UTF-8: {}", e))),
        DocumentType::Pdf => extract_pdf(bytes),
        DocumentType::Docx => extract_docx(bytes),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::UnsupportedFormat(format!("PDF extraction failed: {}", e)))
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| Error::UnsupportedFormat(format!("DOCX extraction failed: {}", e)))?;

    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| Error::UnsupportedFormat(format!("DOCX extraction failed: {}", e)))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| Error::UnsupportedFormat(format!("DOCX extraction failed: {}", e)))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(Error::UnsupportedFormat(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(Error::UnsupportedFormat(
            "word/document.xml not found".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

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
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(Error::UnsupportedFormat(format!(
                    "DOCX extraction failed: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
