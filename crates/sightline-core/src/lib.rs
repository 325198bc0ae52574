//! Core types, configuration, and error handling for Sightline.
//!
//! This crate provides the shared foundation used by all other Sightline crates:
//! - [`SightlineError`] and [`MultiError`] for the error taxonomy
//! - [`SightlineConfig`] loaded from `.sightline.toml`
//! - The chunk model: [`Chunk`], [`ChunkId`], [`ChunkKind`], [`Visibility`], [`RawCall`]
//! - [`CancelSignal`] for cancelling long-running operations

mod cancel;
mod config;
mod error;
mod types;

pub use cancel::CancelSignal;
pub use config::{
    EmbeddingConfig, IndexConfig, LanguagePolicy, LoggingConfig, Metric, ReachabilityConfig,
    RerankerConfig, SearchConfig, SearchMode, SightlineConfig,
};
pub use error::{FailureEntry, FailureScope, MultiError, SightlineError};
pub use types::{
    content_hash, CallForm, Chunk, ChunkFlags, ChunkId, ChunkKind, ExtractedChunk, OutputFormat, RawCall,
    SearchResult, Span, Visibility, MODULE_SYMBOL,
};

/// A convenience `Result` type for Sightline operations.
pub type Result<T> = std::result::Result<T, SightlineError>;
