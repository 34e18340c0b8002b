//! PDF loading and page-level splitting.
//!
//! `pdf-extract` has better font encoding handling than raw lopdf, so it is
//! tried first; lopdf is the fallback for documents it chokes on. The library
//! can panic on malformed input, so extraction runs under `catch_unwind`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

pub const PDF_MAGIC: &[u8] = b"%PDF";

/// One page of an uploaded document. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPage {
    /// Originating filename.
    pub source: String,
    /// 1-based page number.
    pub page_number: usize,
    pub text: String,
}

/// Whether a filename claims to be a PDF. Checked at the upload boundary,
/// before any bytes reach the loader.
pub fn is_pdf_filename(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Whether the payload starts with the PDF magic bytes.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Load a PDF from disk and split it into page-level text units.
///
/// Pages that contain no extractable text are dropped; a document where no
/// page yields text is an error (scanned/image-only PDFs land here).
pub fn load_pdf_pages(path: &Path, source: &str) -> Result<Vec<DocumentPage>, ApiError> {
    let raw_pages = extract_pages(path, source)?;

    let pages: Vec<DocumentPage> = raw_pages
        .into_iter()
        .enumerate()
        .filter_map(|(idx, text)| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(DocumentPage {
                    source: source.to_string(),
                    page_number: idx + 1,
                    text: trimmed.to_string(),
                })
            }
        })
        .collect();

    if pages.is_empty() {
        return Err(ApiError::Document(format!(
            "no extractable text in '{}'",
            source
        )));
    }

    Ok(pages)
}

fn extract_pages(path: &Path, source: &str) -> Result<Vec<String>, ApiError> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_by_pages(path)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(err)) => {
            tracing::warn!(
                "pdf-extract failed for '{}', trying lopdf fallback: {}",
                source,
                err
            );
            extract_pages_via_lopdf(path, source)
        }
        Err(_) => {
            tracing::warn!("pdf-extract panicked for '{}', trying lopdf fallback", source);
            extract_pages_via_lopdf(path, source)
        }
    }
}

fn extract_pages_via_lopdf(path: &Path, source: &str) -> Result<Vec<String>, ApiError> {
    let doc = lopdf::Document::load(path)
        .map_err(|err| ApiError::Document(format!("cannot read '{}': {}", source, err)))?;

    let mut pages = Vec::new();
    for (page_number, _) in doc.get_pages() {
        let text = doc.extract_text(&[page_number]).unwrap_or_default();
        pages.push(text);
    }

    if pages.is_empty() {
        return Err(ApiError::Document(format!("'{}' has no pages", source)));
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn pdf_filenames_are_recognized() {
        assert!(is_pdf_filename("paper.pdf"));
        assert!(is_pdf_filename("PAPER.PDF"));
        assert!(!is_pdf_filename("notes.txt"));
        assert!(!is_pdf_filename("pdf"));
    }

    #[test]
    fn magic_check_requires_pdf_header() {
        assert!(has_pdf_magic(b"%PDF-1.7\n..."));
        assert!(!has_pdf_magic(b"<html>not a pdf</html>"));
        assert!(!has_pdf_magic(b""));
    }

    #[test]
    fn garbage_bytes_fail_with_document_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(b"%PDF-1.4 this is not really a pdf body")
            .expect("write");

        let result = load_pdf_pages(&path, "broken.pdf");
        assert!(matches!(result, Err(ApiError::Document(_))));
    }
}
