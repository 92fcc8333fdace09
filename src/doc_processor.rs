use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Text pulled out of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Document text extractor is not available yet")]
    Unavailable,
    #[error("Unsupported file type: .{0}")]
    UnsupportedType(String),
    #[error("PDF parse error: {0}")]
    Pdf(String),
    #[error("File is not valid UTF-8 text")]
    NotUtf8,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl serde::Serialize for ExtractError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Multi-page text extraction capability.
pub trait TextExtractor: Send + Sync {
    /// Text of each page, in page order.
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError>;
}

pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))
    }
}

/// Holds the PDF extractor once it has been initialised at startup.
#[derive(Default)]
pub struct ExtractorSlot {
    pdf: OnceLock<Arc<dyn TextExtractor>>,
}

impl ExtractorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the extractor. Returns false if one was already installed.
    pub fn init(&self, extractor: Arc<dyn TextExtractor>) -> bool {
        self.pdf.set(extractor).is_ok()
    }

    pub fn is_available(&self) -> bool {
        self.pdf.get().is_some()
    }

    pub fn get(&self) -> Result<Arc<dyn TextExtractor>, ExtractError> {
        self.pdf.get().cloned().ok_or(ExtractError::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    PlainText,
}

fn document_kind(file_name: &str) -> Result<DocumentKind, ExtractError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => Ok(DocumentKind::Pdf),
        "txt" | "md" | "markdown" => Ok(DocumentKind::PlainText),
        _ => Err(ExtractError::UnsupportedType(ext)),
    }
}

/// Parse an uploaded file into plain text. PDF pages are joined with newlines.
pub fn parse_bytes(
    file_name: &str,
    bytes: &[u8],
    extractors: &ExtractorSlot,
) -> Result<ParsedDocument, ExtractError> {
    let content = match document_kind(file_name)? {
        DocumentKind::Pdf => {
            let extractor = extractors.get()?;
            extractor.page_texts(bytes)?.join("\n")
        }
        DocumentKind::PlainText => {
            String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8)?
        }
    };

    Ok(ParsedDocument {
        file_name: file_name.to_string(),
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pages(Vec<&'static str>);

    impl TextExtractor for Pages {
        fn page_texts(&self, _bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
            Ok(self.0.iter().map(|p| p.to_string()).collect())
        }
    }

    #[test]
    fn test_pdf_pages_joined_in_order() {
        let slot = ExtractorSlot::new();
        assert!(slot.init(Arc::new(Pages(vec!["page one", "page two"]))));
        let doc = parse_bytes("report.PDF", b"%PDF", &slot).unwrap();
        assert_eq!(doc.file_name, "report.PDF");
        assert_eq!(doc.content, "page one\npage two");
    }

    #[test]
    fn test_pdf_without_extractor_is_unavailable() {
        let slot = ExtractorSlot::new();
        assert!(!slot.is_available());
        let err = parse_bytes("a.pdf", b"%PDF", &slot).unwrap_err();
        assert!(matches!(err, ExtractError::Unavailable));
    }

    #[test]
    fn test_init_only_once() {
        let slot = ExtractorSlot::new();
        assert!(slot.init(Arc::new(PdfTextExtractor)));
        assert!(!slot.init(Arc::new(PdfTextExtractor)));
        assert!(slot.is_available());
    }

    #[test]
    fn test_plain_text_read_directly() {
        let slot = ExtractorSlot::new();
        let doc = parse_bytes("notes.md", "# Title\nbody".as_bytes(), &slot).unwrap();
        assert_eq!(doc.content, "# Title\nbody");
        assert!(matches!(
            parse_bytes("bin.txt", &[0xff, 0xfe, 0x00], &slot),
            Err(ExtractError::NotUtf8)
        ));
    }

    #[test]
    fn test_unsupported_type() {
        let slot = ExtractorSlot::new();
        match parse_bytes("photo.png", b"", &slot) {
            Err(ExtractError::UnsupportedType(ext)) => assert_eq!(ext, "png"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_pdf_is_an_error() {
        let slot = ExtractorSlot::new();
        slot.init(Arc::new(PdfTextExtractor));
        assert!(parse_bytes("broken.pdf", b"not a pdf at all", &slot).is_err());
    }
}
