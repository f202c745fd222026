//! Extracted-text reading for ingestion.
//!
//! The core consumes text already extracted from PDFs by an external
//! reader; extracted files separate pages with form-feed characters
//! (`\x0c`). Reading normalizes line endings and records the page map so
//! chunkers can attribute page numbers without changing offsets.

// Memory mapping requires unsafe but is safe for read-only access
#![allow(unsafe_code)]

use crate::error::{IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Threshold for using memory mapping (1MB).
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Maximum file size to read into memory (256MB).
const MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Page boundary lookup over a normalized document text.
///
/// Holds the start offset of each page in the normalized text; page 1
/// always starts at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMap {
    starts: Vec<usize>,
}

impl PageMap {
    /// Creates a page map from page-start offsets.
    ///
    /// An empty or non-zero-leading list is corrected so page 1 starts at 0.
    #[must_use]
    pub fn new(mut starts: Vec<usize>) -> Self {
        if starts.first() != Some(&0) {
            starts.insert(0, 0);
        }
        Self { starts }
    }

    /// A single-page map, for documents without page breaks.
    #[must_use]
    pub fn single_page() -> Self {
        Self { starts: vec![0] }
    }

    /// Number of pages.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.starts.len()
    }

    /// 1-based page number containing the given character offset.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn page_for(&self, offset: usize) -> u32 {
        let idx = self.starts.partition_point(|&s| s <= offset);
        idx.max(1) as u32
    }
}

/// A document's normalized text together with its page map.
#[derive(Debug, Clone)]
pub struct DocumentText {
    /// Normalized UTF-8 text (LF line endings, page breaks folded to `\n`).
    pub text: String,
    /// Page-start offsets in the normalized text.
    pub pages: PageMap,
}

/// Normalizes raw extracted text.
///
/// Strips a leading BOM, folds CRLF/CR to LF, and replaces each form-feed
/// page separator with a newline (same byte width, so offsets recorded in
/// the returned page map stay aligned with the normalized text).
#[must_use]
pub fn normalize_text(raw: &str) -> DocumentText {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut text = String::with_capacity(raw.len());
    let mut page_starts = vec![0];

    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                text.push('\n');
            }
            '\u{0c}' => {
                text.push('\n');
                page_starts.push(text.len());
            }
            _ => text.push(c),
        }
    }

    DocumentText {
        text,
        pages: PageMap::new(page_starts),
    }
}

/// Reads and normalizes an extracted-text document.
///
/// Uses memory mapping for files above 1MB.
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable, too large, or not
/// valid UTF-8.
pub fn read_document(path: &Path) -> Result<DocumentText> {
    let path_str = path.display().to_string();

    if !path.exists() {
        return Err(IoError::FileNotFound { path: path_str }.into());
    }

    let file = File::open(path).map_err(|e| IoError::ReadFailed {
        path: path_str.clone(),
        reason: e.to_string(),
    })?;
    let size = file
        .metadata()
        .map_err(|e| IoError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?
        .len();

    if size > MAX_FILE_SIZE {
        return Err(IoError::ReadFailed {
            path: path_str,
            reason: format!("file too large: {size} bytes (max: {MAX_FILE_SIZE} bytes)"),
        }
        .into());
    }

    let raw = if size >= MMAP_THRESHOLD {
        read_mmap(&file, &path_str)?
    } else {
        read_direct(file, &path_str, size)?
    };

    Ok(normalize_text(&raw))
}

fn read_direct(mut file: File, path: &str, size: u64) -> Result<String> {
    let mut raw = String::with_capacity(usize::try_from(size).unwrap_or(0));
    file.read_to_string(&mut raw).map_err(|e| IoError::ReadFailed {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(raw)
}

fn read_mmap(file: &File, path: &str) -> Result<String> {
    // SAFETY: the mapping is read-only and dropped before this call returns.
    let mmap = unsafe {
        Mmap::map(file).map_err(|e| IoError::MmapFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?
    };
    let text = std::str::from_utf8(&mmap).map_err(|e| IoError::ReadFailed {
        path: path.to_string(),
        reason: format!("invalid UTF-8 at byte {}", e.valid_up_to()),
    })?;
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalize_crlf() {
        let doc = normalize_text("line one\r\nline two\rline three\n");
        assert_eq!(doc.text, "line one\nline two\nline three\n");
        assert_eq!(doc.pages.page_count(), 1);
    }

    #[test]
    fn test_normalize_strips_bom() {
        let doc = normalize_text("\u{feff}content");
        assert_eq!(doc.text, "content");
    }

    #[test]
    fn test_page_map_from_form_feeds() {
        let doc = normalize_text("page one text\u{0c}page two text\u{0c}page three");
        assert_eq!(doc.pages.page_count(), 3);
        assert_eq!(doc.pages.page_for(0), 1);
        assert_eq!(doc.pages.page_for(5), 1);
        // First char of the second page
        let second_start = doc.text.find("page two").unwrap();
        assert_eq!(doc.pages.page_for(second_start), 2);
        assert_eq!(doc.pages.page_for(doc.text.len()), 3);
    }

    #[test]
    fn test_page_breaks_preserve_offsets() {
        let raw = "abc\u{0c}def";
        let doc = normalize_text(raw);
        // Form feed folded to newline keeps byte widths identical
        assert_eq!(doc.text, "abc\ndef");
        assert_eq!(doc.text.len(), raw.len());
    }

    #[test]
    fn test_page_map_single_page() {
        let map = PageMap::single_page();
        assert_eq!(map.page_count(), 1);
        assert_eq!(map.page_for(12345), 1);
    }

    #[test]
    fn test_read_document_missing() {
        let result = read_document(Path::new("/nonexistent/file.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_read_document_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "Indications\r\nFacial rejuvenation.").unwrap();
        drop(f);

        let doc = read_document(&path).unwrap();
        assert!(doc.text.starts_with("Indications\nFacial"));
        assert_eq!(doc.pages.page_count(), 1);
    }

    #[test]
    fn test_read_document_large_uses_mmap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        let body = "Polynucleotide injection notes. ".repeat(40_000);
        std::fs::write(&path, &body).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() >= MMAP_THRESHOLD);

        let doc = read_document(&path).unwrap();
        assert_eq!(doc.text.len(), body.len());
    }
}
