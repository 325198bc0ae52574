//! The per-language extraction seam.

use std::collections::HashMap;

use sightline_core::{ExtractedChunk, SightlineError};

use crate::fallback::LineAdapter;
use crate::treesitter::TreeSitterAdapter;
use crate::walker::{Language, SourceFile};

/// Turns one source file into chunks with their raw callees.
///
/// Implementations must be deterministic: the same file content yields the
/// same chunks in the same order.
pub trait LanguageAdapter: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Extract chunks from `file`.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Parse`] if the file cannot be parsed.
    fn extract(&self, file: &SourceFile) -> Result<Vec<ExtractedChunk>, SightlineError>;
}

/// Maps languages to adapters, falling back to line chunking.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use sightline_chunker::AdapterRegistry;
/// use sightline_chunker::walker::{Language, SourceFile};
///
/// let registry = AdapterRegistry::with_defaults();
/// assert_eq!(registry.adapter_for(Language::Go).name(), "go");
/// assert_eq!(registry.adapter_for(Language::Kotlin).name(), "lines");
///
/// let file = SourceFile::new(PathBuf::from("main.go"), Language::Go, "package main\n\nfunc main() {}\n");
/// let chunks = registry.extract(&file).unwrap();
/// assert_eq!(chunks[0].chunk.name, "main");
/// ```
pub struct AdapterRegistry {
    adapters: HashMap<Language, Box<dyn LanguageAdapter>>,
    fallback: LineAdapter,
}

impl AdapterRegistry {
    /// An empty registry; every file goes through the fallback.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: LineAdapter::default(),
        }
    }

    /// A registry with a tree-sitter adapter for every language that has one.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for language in Language::ALL {
            if let Some(adapter) = TreeSitterAdapter::new(*language) {
                registry.register(*language, Box::new(adapter));
            }
        }
        registry
    }

    /// Install `adapter` for `language`, replacing any existing one.
    pub fn register(&mut self, language: Language, adapter: Box<dyn LanguageAdapter>) {
        self.adapters.insert(language, adapter);
    }

    pub fn adapter_for(&self, language: Language) -> &dyn LanguageAdapter {
        match self.adapters.get(&language) {
            Some(adapter) => adapter.as_ref(),
            None => &self.fallback,
        }
    }

    pub fn extract(&self, file: &SourceFile) -> Result<Vec<ExtractedChunk>, SightlineError> {
        self.adapter_for(file.language).extract(file)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut languages: Vec<&str> = self.adapters.keys().map(Language::as_str).collect();
        languages.sort_unstable();
        languages.dedup();
        f.debug_struct("AdapterRegistry")
            .field("languages", &languages)
            .finish()
    }
}
