//! PDF text extraction.
//!
//! Turns an uploaded PDF byte buffer into plain UTF-8 text plus the declared
//! page count. Text comes from `pdf-extract`; the page count is read from the
//! document's page tree via `lopdf`.

/// MIME type accepted by the upload endpoint.
pub const MIME_PDF: &str = "application/pdf";

/// Extraction error. No panic; callers map these onto the HTTP boundary.
#[derive(Debug)]
pub enum ExtractError {
    /// The upload payload was empty or not a byte buffer.
    InvalidInput,
    /// The PDF parsed, but contained no extractable text.
    EmptyDocument,
    /// The extraction library rejected the document.
    Parse(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::InvalidInput => write!(f, "Invalid input: expected a non-empty PDF"),
            ExtractError::EmptyDocument => {
                write!(f, "The PDF contains no extractable text")
            }
            ExtractError::Parse(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracted document text together with the page count declared by the PDF.
#[derive(Debug, Clone)]
pub struct PdfText {
    pub text: String,
    pub page_count: usize,
}

/// Extracts plain text and the declared page count from a PDF buffer.
pub fn extract_pdf(bytes: &[u8]) -> Result<PdfText, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::InvalidInput);
    }

    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractError::Parse(e.to_string()))?;

    if text.trim().is_empty() {
        return Err(ExtractError::EmptyDocument);
    }

    Ok(PdfText {
        page_count: declared_page_count(bytes),
        text,
    })
}

/// Reads the page count from the PDF page tree. Falls back to 1 when the
/// structure cannot be walked; extraction already succeeded at that point, so
/// a missing count degrades the segmentation, not the ingest.
fn declared_page_count(bytes: &[u8]) -> usize {
    match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc.get_pages().len().max(1),
        Err(e) => {
            tracing::debug!("could not read page tree, assuming one page: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal valid single-page PDF containing the given phrase. Body first,
    /// then an xref with correct byte offsets so `pdf-extract` can parse it.
    pub(crate) fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let o1 = out.len();
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        let o2 = out.len();
        out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
        let o3 = out.len();
        out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
        let o4 = out.len();
        let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", phrase);
        out.extend_from_slice(
            format!(
                "4 0 obj << /Length {} >> stream\n{}endstream endobj\n",
                stream.len(),
                stream
            )
            .as_bytes(),
        );
        let o5 = out.len();
        out.extend_from_slice(
            b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
        );
        let xref_start = out.len();
        out.extend_from_slice(b"xref\n0 6\n");
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for o in [o1, o2, o3, o4, o5] {
            out.extend_from_slice(format!("{:010} 00000 n \n", o).as_bytes());
        }
        out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
        out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    #[test]
    fn empty_buffer_is_invalid_input() {
        let err = extract_pdf(b"").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidInput));
    }

    #[test]
    fn garbage_bytes_are_a_parse_failure() {
        let err = extract_pdf(b"not a pdf at all").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn extracts_text_and_page_count() {
        let pdf = minimal_pdf_with_phrase("hello from page one");
        let out = extract_pdf(&pdf).unwrap();
        assert!(out.text.contains("hello from page one"));
        assert_eq!(out.page_count, 1);
    }
}
