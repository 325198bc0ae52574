//! Embeddings, vector search and the per-project index.
//!
//! Chunks are embedded through an [`EmbeddingProvider`] in concurrent
//! batches, cached by content hash in SQLite, and served from an in-memory
//! [`VectorIndex`]. Queries fuse vector candidates with FTS5 keyword hits
//! and optionally rerank them. [`ProjectIndex`] ties extraction,
//! reachability analysis and search together for one repository.

pub mod http;
pub mod index;
pub mod pipeline;
pub mod project;
pub mod provider;
pub mod search;
pub mod store;

pub use http::{HttpEmbedder, HttpReranker};
pub use index::{IndexEntry, Neighbour, VectorIndex};
pub use pipeline::{EmbeddingPipeline, PipelineOptions, PipelineOutcome};
pub use project::{IndexSummary, ProjectIndex, ProjectStats, DATA_DIR};
pub use provider::{EmbeddingProvider, NoopReranker, RerankScore, Reranker};
pub use search::{HybridSearch, SearchFilters, DEFAULT_KEYWORD_WEIGHT, DEFAULT_VECTOR_WEIGHT};
pub use store::{EmbeddingCache, EmbeddingRecord, KeywordHit, KeywordIndex, SqliteStore, StoreStats};
