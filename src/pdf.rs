//! # PDF Text Extraction Module
//!
//! Extracts and normalizes text from uploaded PDFs so the quiz generator can
//! work with clean prose. Extraction itself is delegated to `pdf-extract`;
//! this module owns validation and cleanup.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

/// Errors specific to PDF processing
#[derive(Debug, Clone)]
pub enum PdfError {
    /// The file could not be parsed as a PDF
    Extraction(String),
    /// The PDF parsed but contains too little readable text
    InsufficientText(usize),
}

impl std::fmt::Display for PdfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PdfError::Extraction(msg) => write!(f, "[PDF_EXTRACT] Failed to extract text: {}", msg),
            PdfError::InsufficientText(chars) => write!(
                f,
                "[PDF_TEXT] PDF contains insufficient readable text ({} characters)",
                chars
            ),
        }
    }
}

impl std::error::Error for PdfError {}

lazy_static! {
    // Bare page numbers on their own line
    static ref PAGE_NUMBER_LINE: Regex = Regex::new(r"(?m)^\s*(?:Page\s+)?\d+\s*$").expect("page number pattern must compile");
    static ref MULTI_SPACE: Regex = Regex::new(r"[ \t]{2,}").expect("whitespace pattern must compile");
    static ref MULTI_NEWLINE: Regex = Regex::new(r"\n{3,}").expect("newline pattern must compile");
}

/// Extract text from a PDF file, cleaned and normalized
///
/// Rejects documents with fewer than `min_chars` usable characters — scanned
/// PDFs without a text layer produce nothing useful here, and the quiz
/// generator needs real prose to work with.
pub fn extract_text(pdf_path: &str, min_chars: usize) -> Result<String, PdfError> {
    // Stored files may live under an arbitrary FILES_DIR, so only the
    // traversal and null-byte checks apply here
    let has_parent_component = std::path::Path::new(pdf_path)
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir));
    if pdf_path.is_empty() || pdf_path.contains('\0') || has_parent_component {
        return Err(PdfError::Extraction(format!(
            "path validation failed for {pdf_path}"
        )));
    }

    let raw = pdf_extract::extract_text(pdf_path).map_err(|e| {
        warn!(pdf_path = %pdf_path, error = %e, "PDF text extraction failed");
        PdfError::Extraction(e.to_string())
    })?;

    let cleaned = clean_text(&raw);

    info!(
        pdf_path = %pdf_path,
        chars = cleaned.len(),
        "Extracted text from PDF"
    );

    if cleaned.len() < min_chars {
        return Err(PdfError::InsufficientText(cleaned.len()));
    }

    Ok(cleaned)
}

/// Clean and normalize extracted PDF text
///
/// Drops page-number lines, collapses runs of whitespace, fixes the common
/// ligature misreads (ﬁ → fi, ﬂ → fl), and trims the result.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = text.replace('\u{fb01}', "fi").replace('\u{fb02}', "fl");
    let text = PAGE_NUMBER_LINE.replace_all(&text, "");
    let text = MULTI_SPACE.replace_all(&text, " ");
    let text = MULTI_NEWLINE.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim)
        .collect::<Vec<&str>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Split text into chunks on sentence boundaries
///
/// Each chunk stays under `max_chunk_size` characters. Sentences longer than
/// the limit become their own chunk rather than being dropped.
pub fn split_into_chunks(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split_inclusive(". ") {
        if !current.is_empty() && current.len() + sentence.len() > max_chunk_size {
            chunks.push(current.trim().to_string());
            current = String::new();
        }
        current.push_str(sentence);
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_removes_page_numbers() {
        let raw = "Chapter 1\n12\nNewton's laws of motion.\nPage 13\nEvery action has a reaction.";
        let cleaned = clean_text(raw);
        assert!(cleaned.contains("Newton's laws of motion."));
        assert!(cleaned.contains("Every action has a reaction."));
        assert!(!cleaned.contains("12"));
        assert!(!cleaned.contains("Page 13"));
    }

    #[test]
    fn test_clean_text_fixes_ligatures() {
        assert_eq!(clean_text("de\u{fb01}nition of \u{fb02}uid"), "definition of fluid");
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        let cleaned = clean_text("too     many   spaces\n\n\n\n\nand newlines");
        assert!(cleaned.contains("too many spaces"));
        assert!(!cleaned.contains("\n\n\n"));
    }

    #[test]
    fn test_chunking_respects_limits() {
        let sentence = "This sentence is exactly forty chars ok. ";
        let text = sentence.repeat(10);
        let chunks = split_into_chunks(&text, 100);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 100 + sentence.len());
        }
        // Nothing is lost
        let rejoined: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(rejoined >= text.trim().len() - chunks.len() * 2);
    }

    #[test]
    fn test_chunking_short_text_single_chunk() {
        let chunks = split_into_chunks("One short sentence.", 3000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "One short sentence.");
    }

    #[test]
    fn test_extract_text_rejects_bad_path() {
        assert!(extract_text("../outside.pdf", 100).is_err());
    }
}
