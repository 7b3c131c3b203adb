//! Source document loading.
//!
//! A document is an ordered list of pages. PDFs go through `pdf-extract`,
//! which emits the whole text with form feeds between pages; plain text and
//! markdown files use the same form-feed convention.


use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{AgentError, Result};

const PAGE_BREAK: char = '\x0C';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Zero-based position of the page in the source file
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub pages: Vec<Page>,
}

impl Document {
    /// Concatenated length of all pages, in characters
    #[inline]
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "md" | "markdown" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Load `path` as an ordered list of non-blank pages
#[inline]
pub fn load_document<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(AgentError::DocumentLoad(format!(
            "document not found: {}",
            path.display()
        )));
    }

    let kind = DocumentKind::from_path(path).ok_or_else(|| {
        AgentError::DocumentLoad(format!(
            "unsupported document type: {} (expected .pdf, .txt or .md)",
            path.display()
        ))
    })?;

    let bytes = std::fs::read(path).map_err(|e| {
        AgentError::DocumentLoad(format!("failed to read {}: {}", path.display(), e))
    })?;

    let text = match kind {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
            AgentError::DocumentLoad(format!("failed to parse PDF {}: {}", path.display(), e))
        })?,
        DocumentKind::Text => String::from_utf8(bytes).map_err(|e| {
            AgentError::DocumentLoad(format!("{} is not valid UTF-8: {}", path.display(), e))
        })?,
    };

    let pages = split_pages(&text);
    if pages.is_empty() {
        return Err(AgentError::DocumentLoad(format!(
            "no text found in {}",
            path.display()
        )));
    }

    info!("Loaded {} pages from {}", pages.len(), path.display());

    Ok(Document {
        path: path.to_path_buf(),
        pages,
    })
}

/// Split raw extracted text on form feeds, dropping blank pages
#[inline]
pub fn split_pages(text: &str) -> Vec<Page> {
    let pages: Vec<Page> = text
        .split(PAGE_BREAK)
        .enumerate()
        .filter(|(_, page_text)| !page_text.trim().is_empty())
        .map(|(index, page_text)| Page {
            index,
            text: page_text.trim().to_string(),
        })
        .collect();

    debug!("Extracted {} non-blank pages", pages.len());
    pages
}
