//! Syntax-aware chunking and call extraction.
//!
//! Walks a repository, parses each source file with tree-sitter where a
//! grammar is available, and emits [`ExtractedChunk`]s: functions, methods,
//! types and module-level code, each with the raw callees found in its body.
//! Files without a grammar are split into opaque line blocks.

pub mod adapter;
pub mod extract;
pub mod fallback;
mod grammar;
pub mod treesitter;
pub mod walker;

use std::path::Path;

pub use adapter::{AdapterRegistry, LanguageAdapter};
pub use extract::{extract_files, ExtractionOutput, FileExtraction};
pub use fallback::LineAdapter;
pub use sightline_core::MODULE_SYMBOL;
pub use treesitter::TreeSitterAdapter;

use sightline_core::{CancelSignal, ExtractedChunk, IndexConfig, SightlineError};

/// Walk `root` and extract every accepted file with the default adapters.
///
/// # Errors
///
/// Returns [`SightlineError::FileNotFound`] if `root` does not exist, a config
/// error for invalid globs, or [`SightlineError::Cancelled`].
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use sightline_chunker::extract_repo;
/// use sightline_core::{CancelSignal, IndexConfig};
///
/// let output = extract_repo(Path::new("."), &IndexConfig::default(), &CancelSignal::new()).unwrap();
/// println!("{} files, {} failures", output.files.len(), output.failures.len());
/// ```
pub fn extract_repo(
    root: &Path,
    config: &IndexConfig,
    cancel: &CancelSignal,
) -> Result<ExtractionOutput, SightlineError> {
    let options = walker::WalkOptions::from_config(config)?;
    let files = walker::walk_repo(root, &options)?;
    extract_files(
        &AdapterRegistry::with_defaults(),
        &files,
        config.worker_count(),
        cancel,
    )
}

/// Flatten an extraction into chunks, in file then source order.
pub fn all_chunks(output: &ExtractionOutput) -> Vec<ExtractedChunk> {
    output
        .files
        .iter()
        .flat_map(|f| f.chunks.iter().cloned())
        .collect()
}
