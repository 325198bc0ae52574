use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Errors that can occur across Sightline.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary converts to `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use sightline_core::SightlineError;
///
/// let err = SightlineError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SightlineError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(sightline::config))]
    Config(String),

    /// A single file could not be parsed into chunks.
    #[error("parse error in {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// An embedding or rerank provider call failed.
    ///
    /// `transient` failures (timeouts, rate limits, 5xx) are retried at batch
    /// granularity; persistent ones (auth, unknown model) are terminal.
    #[error("{provider} provider error: {message}")]
    Provider {
        provider: String,
        message: String,
        transient: bool,
    },

    /// A vector's length does not match the index dimensions.
    #[error("dimension mismatch: index has {expected} dimensions, got {actual}")]
    #[diagnostic(
        code(sightline::dimension_mismatch),
        help("the index was built with another embedding model; delete .sightline/ and re-index")
    )]
    DimensionMismatch { expected: usize, actual: usize },

    /// The operation was cancelled or its deadline elapsed.
    #[error("operation cancelled")]
    Cancelled,

    /// Persistent storage failure.
    #[error("database error: {0}")]
    Database(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A chunk id is not present in the current snapshot.
    #[error("unknown chunk: {0}")]
    UnknownChunk(String),

    /// Some files or batches failed while the rest of the run succeeded.
    #[error("{0}")]
    Partial(MultiError),
}

impl SightlineError {
    /// Build a transient provider error.
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Build a persistent provider error.
    pub fn persistent(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// use sightline_core::SightlineError;
    ///
    /// assert!(SightlineError::transient("voyage", "429").is_transient());
    /// assert!(!SightlineError::persistent("voyage", "401").is_transient());
    /// assert!(!SightlineError::Cancelled.is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider { transient: true, .. })
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Where a failure happened during an indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum FailureScope {
    /// A single source file failed extraction.
    File(PathBuf),
    /// An embedding batch failed after retries.
    Batch(usize),
}

impl fmt::Display for FailureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureScope::File(path) => write!(f, "file {}", path.display()),
            FailureScope::Batch(idx) => write!(f, "batch {idx}"),
        }
    }
}

/// One isolated failure inside an otherwise successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEntry {
    pub scope: FailureScope,
    pub message: String,
}

/// Aggregated per-file and per-batch failures.
///
/// Returned alongside partial results so the caller can decide whether a
/// partially indexed project is acceptable.
///
/// # Examples
///
/// ```
/// use sightline_core::{FailureScope, MultiError};
/// use std::path::PathBuf;
///
/// let mut errors = MultiError::default();
/// assert!(errors.is_empty());
///
/// errors.push(FailureScope::File(PathBuf::from("src/bad.rs")), "unexpected token");
/// errors.push(FailureScope::Batch(3), "rate limited");
/// assert_eq!(errors.len(), 2);
/// assert!(errors.to_string().contains("2 failures"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiError {
    pub entries: Vec<FailureEntry>,
}

impl MultiError {
    pub fn push(&mut self, scope: FailureScope, message: impl Into<String>) {
        self.entries.push(FailureEntry {
            scope,
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: MultiError) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of failed files.
    pub fn file_failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.scope, FailureScope::File(_)))
            .count()
    }

    /// Number of failed embedding batches.
    pub fn batch_failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.scope, FailureScope::Batch(_)))
            .count()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failures", self.entries.len())?;
        for entry in &self.entries {
            write!(f, "\n  {}: {}", entry.scope, entry.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SightlineError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = SightlineError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = SightlineError::FileNotFound(PathBuf::from("/tmp/missing.rs"));
        assert!(err.to_string().contains("/tmp/missing.rs"));
    }

    #[test]
    fn dimension_mismatch_names_both_sizes() {
        let err = SightlineError::DimensionMismatch {
            expected: 1536,
            actual: 768,
        };
        let msg = err.to_string();
        assert!(msg.contains("1536"));
        assert!(msg.contains("768"));
    }

    #[test]
    fn cancellation_is_not_a_provider_failure() {
        let err = SightlineError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_transient());
    }

    #[test]
    fn multi_error_counts_by_scope() {
        let mut errors = MultiError::default();
        errors.push(FailureScope::File(PathBuf::from("a.py")), "bad indent");
        errors.push(FailureScope::Batch(0), "timeout");
        errors.push(FailureScope::Batch(2), "timeout");
        assert_eq!(errors.file_failures(), 1);
        assert_eq!(errors.batch_failures(), 2);

        let err = SightlineError::Partial(errors);
        let msg = err.to_string();
        assert!(msg.contains("file a.py: bad indent"));
        assert!(msg.contains("batch 2: timeout"));
    }
}
