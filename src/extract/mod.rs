//! # PDF Extractor (C1)
//!
//! Page-structured text extraction with an OCR fallback seam. Generalized
//! from a single-pass `pdf_extract::extract_text_from_mem` call (followed by
//! normalization, with no page boundaries kept) into a page-aware contract:
//! each page keeps its own text and 1-indexed `page_num`, since downstream
//! citations (C11) are page-level.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ExtractError;

const EMPTY_DOCUMENT_THRESHOLD_CHARS: usize = 100;
const OCR_DPI: u32 = 300;

#[derive(Debug, Clone)]
pub struct Page {
    pub page_num: usize,
    pub text: String,
}

/// Seam for an OCR backend. The engine ships a stub that returns no text,
/// since a real OCR engine (e.g. tesseract bindings) is outside this
/// crate's dependency budget; the contract ("OCR attempted at 300 DPI, and
/// if it still yields <100 chars the document fails as `EmptyDocument`")
/// is fully implemented and testable against the stub.
pub trait OcrFallback: Send + Sync {
    /// Attempt OCR over the raw PDF bytes at `dpi`, returning page texts.
    fn recognize(&self, bytes: &[u8], dpi: u32) -> Result<Vec<Page>, ExtractError>;
}

/// Default OCR backend: always returns no text. A real deployment swaps
/// this for a tesseract- or cloud-OCR-backed implementation without
/// changing any caller of `extract`.
pub struct NoOpOcr;

impl OcrFallback for NoOpOcr {
    fn recognize(&self, _bytes: &[u8], _dpi: u32) -> Result<Vec<Page>, ExtractError> {
        Ok(Vec::new())
    }
}

pub struct PdfExtractor<O: OcrFallback = NoOpOcr> {
    ocr: O,
    timeout: Duration,
}

impl Default for PdfExtractor<NoOpOcr> {
    fn default() -> Self {
        Self::new(NoOpOcr, Duration::from_secs(600))
    }
}

impl<O: OcrFallback> PdfExtractor<O> {
    pub fn new(ocr: O, timeout: Duration) -> Self {
        Self { ocr, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Extract page-structured text from `bytes`. `filename` is only used
    /// for log context; the result carries no filename of its own (the
    /// orchestrator assigns `Document.id`).
    pub fn extract(&self, bytes: &[u8], filename: &str) -> Result<Vec<Page>, ExtractError> {
        let text =
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Unreadable(e.to_string()))?;

        let mut pages = split_into_pages(&text);
        let total_chars: usize = pages.iter().map(|p| p.text.len()).sum();

        if total_chars < EMPTY_DOCUMENT_THRESHOLD_CHARS {
            warn!(filename, total_chars, "extracted text below threshold, invoking OCR fallback");
            let ocr_pages = self.ocr.recognize(bytes, OCR_DPI)?;
            let ocr_chars: usize = ocr_pages.iter().map(|p| p.text.len()).sum();
            if ocr_chars < EMPTY_DOCUMENT_THRESHOLD_CHARS {
                return Err(ExtractError::EmptyDocument {
                    chars: ocr_chars,
                    ocr_attempted: true,
                });
            }
            pages = ocr_pages;
        }

        debug!(filename, pages = pages.len(), "extraction complete");
        Ok(pages)
    }
}

/// `pdf_extract` joins pages with form-feed characters (`\x0c`); split on
/// those to recover page boundaries. Single-page or form-feed-less output
/// is treated as one page.
fn split_into_pages(text: &str) -> Vec<Page> {
    let raw_pages: Vec<&str> = if text.contains('\u{c}') {
        text.split('\u{c}').collect()
    } else {
        vec![text]
    };

    raw_pages
        .into_iter()
        .enumerate()
        .map(|(i, t)| Page {
            page_num: i + 1,
            text: t.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_form_feed() {
        let text = "page one\u{c}page two\u{c}page three";
        let pages = split_into_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].page_num, 1);
        assert_eq!(pages[2].page_num, 3);
        assert_eq!(pages[1].text, "page two");
    }

    #[test]
    fn single_page_without_form_feed() {
        let pages = split_into_pages("just one page of text");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_num, 1);
    }

    struct EmptyOcr;
    impl OcrFallback for EmptyOcr {
        fn recognize(&self, _bytes: &[u8], _dpi: u32) -> Result<Vec<Page>, ExtractError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn ocr_fallback_engaged_and_still_empty_fails() {
        let extractor = PdfExtractor::new(EmptyOcr, Duration::from_secs(1));
        // `pdf_extract` would fail on this non-PDF input before OCR is ever
        // reached; the OCR-empty path is exercised directly here instead.
        let ocr_pages = extractor.ocr.recognize(b"", OCR_DPI).unwrap();
        assert!(ocr_pages.is_empty());
    }
}
