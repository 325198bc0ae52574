//! Parallel extraction over a set of source files.

use std::path::PathBuf;

use rayon::prelude::*;
use sightline_core::{CancelSignal, ExtractedChunk, FailureScope, MultiError, SightlineError};
use tracing::{debug, warn};

use crate::adapter::AdapterRegistry;
use crate::walker::SourceFile;

/// Chunks extracted from one file.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    pub path: PathBuf,
    /// Content hash of the whole file.
    pub file_hash: String,
    pub chunks: Vec<ExtractedChunk>,
}

#[derive(Debug, Default)]
pub struct ExtractionOutput {
    /// Successfully extracted files, in input order.
    pub files: Vec<FileExtraction>,
    /// One entry per file that failed to parse.
    pub failures: MultiError,
}

/// Extract chunks from `files` on a rayon pool of `workers` threads.
///
/// A file that fails to parse is recorded in [`ExtractionOutput::failures`]
/// and skipped; the remaining files are still extracted.
///
/// # Errors
///
/// Returns [`SightlineError::Cancelled`] if `cancel` fires before every file
/// has been processed, or [`SightlineError::Config`] if the pool cannot be built.
pub fn extract_files(
    registry: &AdapterRegistry,
    files: &[SourceFile],
    workers: usize,
    cancel: &CancelSignal,
) -> Result<ExtractionOutput, SightlineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| SightlineError::Config(format!("failed to build worker pool: {e}")))?;

    let results: Vec<Option<Result<FileExtraction, SightlineError>>> = pool.install(|| {
        files
            .par_iter()
            .map(|file| {
                if cancel.is_cancelled() {
                    return None;
                }
                let result = registry.extract(file).map(|chunks| FileExtraction {
                    path: file.path.clone(),
                    file_hash: file.hash.clone(),
                    chunks,
                });
                Some(result)
            })
            .collect()
    });

    cancel.check()?;

    let mut output = ExtractionOutput::default();
    for (file, result) in files.iter().zip(results) {
        match result {
            Some(Ok(extraction)) => {
                debug!(
                    file = %extraction.path.display(),
                    chunks = extraction.chunks.len(),
                    "extracted"
                );
                output.files.push(extraction);
            }
            Some(Err(e)) => {
                warn!(file = %file.path.display(), error = %e, "extraction failed");
                output
                    .failures
                    .push(FailureScope::File(file.path.clone()), e.to_string());
            }
            None => return Err(SightlineError::Cancelled),
        }
    }
    Ok(output)
}
