//! Document loading.
//!
//! A loader resolves an opaque locator into page texts. The pipeline only
//! ever sees the pages concatenated verbatim, in order.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::PipelineError;
use crate::log_debug;

/// Page separator in plain-text exports.
pub const PAGE_BREAK: char = '\x0c';

pub trait DocumentLoader: Send + Sync {
    /// Resolve `locator` into page texts, in page order.
    fn load_pages(&self, locator: &str) -> Result<Vec<String>, PipelineError>;

    /// Concatenated page text. Blank documents are unreadable.
    fn load_text(&self, locator: &str) -> Result<String, PipelineError> {
        let text = self.load_pages(locator)?.concat();
        if text.trim().is_empty() {
            return Err(unreadable(locator, "document contains no text"));
        }
        Ok(text)
    }
}

fn unreadable(locator: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::UnreadableDocument {
        locator: locator.to_string(),
        reason: reason.into(),
    }
}

/// Reads UTF-8 text files; form feeds separate pages, which keep their text as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFileLoader;

impl DocumentLoader for TextFileLoader {
    fn load_pages(&self, locator: &str) -> Result<Vec<String>, PipelineError> {
        let path = Path::new(locator.strip_prefix("file://").unwrap_or(locator));
        let content = fs::read_to_string(path).map_err(|e| unreadable(locator, e.to_string()))?;
        let pages: Vec<String> = content.split(PAGE_BREAK).map(str::to_string).collect();
        log_debug!("Loaded {} page(s) from {}", pages.len(), path.display());
        Ok(pages)
    }
}

/// Serves pre-split documents from memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    documents: HashMap<String, Vec<String>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document<I, S>(mut self, locator: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.documents
            .insert(locator.into(), pages.into_iter().map(Into::into).collect());
        self
    }
}

impl DocumentLoader for InMemoryLoader {
    fn load_pages(&self, locator: &str) -> Result<Vec<String>, PipelineError> {
        self.documents
            .get(locator)
            .cloned()
            .ok_or_else(|| unreadable(locator, "no such document"))
    }
}
