//! Vector, keyword and hybrid search with optional reranking.
//!
//! Candidates are oversampled from the vector index and, unless the mode is
//! vector-only, from the keyword index. Hybrid mode fuses both as a weighted
//! sum of similarity and normalized BM25. The fused list is reranked when a
//! reranker is configured, then cut to the requested count. A reranker
//! failure falls back to fused order instead of failing the query.

use std::collections::HashMap;
use std::sync::Arc;

use glob::Pattern;
use sightline_core::{CancelSignal, Chunk, ChunkId, ChunkKind, SearchMode, SearchResult, SightlineError};
use tracing::{debug, warn};

use crate::index::{IndexEntry, VectorIndex};
use crate::provider::{sort_scores, EmbeddingProvider, Reranker};
use crate::store::KeywordIndex;

pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.7;
pub const DEFAULT_KEYWORD_WEIGHT: f64 = 0.3;

/// Restricts which chunks a search may return.
///
/// # Examples
///
/// ```
/// use sightline_core::ChunkKind;
/// use sightline_lens::SearchFilters;
///
/// let filters = SearchFilters::default()
///     .language("rust")
///     .kind(ChunkKind::Function)
///     .path_glob("src/**")
///     .unwrap();
/// assert!(!filters.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub languages: Vec<String>,
    pub kinds: Vec<ChunkKind>,
    pub path_globs: Vec<Pattern>,
}

impl SearchFilters {
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.languages.push(language.into());
        self
    }

    pub fn kind(mut self, kind: ChunkKind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// # Errors
    ///
    /// Returns [`SightlineError::Config`] for an invalid glob.
    pub fn path_glob(mut self, pattern: &str) -> Result<Self, SightlineError> {
        let compiled = Pattern::new(pattern)
            .map_err(|e| SightlineError::Config(format!("invalid glob pattern '{pattern}': {e}")))?;
        self.path_globs.push(compiled);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty() && self.kinds.is_empty() && self.path_globs.is_empty()
    }

    /// Each non-empty filter must accept the chunk.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        (self.languages.is_empty() || self.languages.iter().any(|l| l.eq_ignore_ascii_case(&chunk.language)))
            && (self.kinds.is_empty() || self.kinds.contains(&chunk.kind))
            && (self.path_globs.is_empty() || self.path_globs.iter().any(|p| p.matches_path(&chunk.file_path)))
    }
}

/// Query pipeline over a shared [`VectorIndex`] and an optional
/// [`KeywordIndex`].
pub struct HybridSearch {
    provider: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    index: Arc<VectorIndex>,
    keywords: Option<Arc<dyn KeywordIndex>>,
    mode: SearchMode,
    vector_weight: f64,
    keyword_weight: f64,
    candidate_multiplier: usize,
}

impl std::fmt::Debug for HybridSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSearch")
            .field("provider", &self.provider.name())
            .field("reranker", &self.reranker.as_ref().map(|r| r.name().to_string()))
            .field("keywords", &self.keywords.is_some())
            .field("mode", &self.mode)
            .field("vector_weight", &self.vector_weight)
            .field("keyword_weight", &self.keyword_weight)
            .field("candidate_multiplier", &self.candidate_multiplier)
            .finish_non_exhaustive()
    }
}

/// One fused candidate before reranking.
struct Candidate {
    entry: Arc<IndexEntry>,
    similarity: f64,
    keyword_score: Option<f64>,
    score: f64,
}

impl HybridSearch {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn Reranker>>,
        index: Arc<VectorIndex>,
        candidate_multiplier: usize,
    ) -> Self {
        Self {
            provider,
            reranker,
            index,
            keywords: None,
            mode: SearchMode::default(),
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            candidate_multiplier: candidate_multiplier.max(1),
        }
    }

    /// Without a keyword index, hybrid mode ranks by similarity alone and
    /// keyword mode returns nothing.
    pub fn with_keywords(mut self, keywords: Arc<dyn KeywordIndex>) -> Self {
        self.keywords = Some(keywords);
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Weights of similarity and keyword score in hybrid mode.
    pub fn with_weights(mut self, vector: f64, keyword: f64) -> Self {
        self.vector_weight = vector;
        self.keyword_weight = keyword;
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Return the `k` best chunks for `query`.
    ///
    /// Keyword hits are only returned for chunks present in the vector
    /// index, so a chunk whose embedding failed is never a result.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::DimensionMismatch`] if the query embedding
    /// does not match the index, a provider error if the query cannot be
    /// embedded, a database error from the keyword index, or
    /// [`SightlineError::Cancelled`]. Reranker errors are not propagated.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: &SearchFilters,
        cancel: &CancelSignal,
    ) -> Result<Vec<SearchResult>, SightlineError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let n = k.max(self.candidate_multiplier.saturating_mul(k));

        let embedding = match self.mode {
            SearchMode::Keyword => None,
            SearchMode::Vector | SearchMode::Hybrid => Some(cancel.run(self.provider.embed_query(query)).await?),
        };

        let mut merged: HashMap<ChunkId, Candidate> = HashMap::new();
        if let Some(embedding) = &embedding {
            for hit in self.index.query(embedding, n, |c| filters.matches(c))? {
                merged.insert(
                    hit.entry.chunk.id.clone(),
                    Candidate {
                        entry: hit.entry,
                        similarity: hit.similarity,
                        keyword_score: None,
                        score: 0.0,
                    },
                );
            }
        }
        let vector_hits = merged.len();

        let mut keyword_hits = 0;
        if let (Some(keywords), SearchMode::Keyword | SearchMode::Hybrid) = (&self.keywords, self.mode) {
            cancel.check()?;
            // Filtered-out hits still use up the limit.
            let limit = if filters.is_empty() { n } else { n.saturating_mul(4) };
            for hit in keywords.keyword_search(query, limit)? {
                if let Some(candidate) = merged.get_mut(&hit.chunk_id) {
                    candidate.keyword_score = Some(hit.score);
                    keyword_hits += 1;
                    continue;
                }
                let Some(entry) = self.index.get(&hit.chunk_id) else {
                    continue;
                };
                if !filters.matches(&entry.chunk) {
                    continue;
                }
                let similarity = match &embedding {
                    Some(embedding) => self.index.similarity(embedding, &entry)?,
                    None => 0.0,
                };
                keyword_hits += 1;
                merged.insert(
                    hit.chunk_id,
                    Candidate {
                        entry,
                        similarity,
                        keyword_score: Some(hit.score),
                        score: 0.0,
                    },
                );
            }
        }
        debug!(query, mode = %self.mode, vector_hits, keyword_hits, "search candidates");

        let fuse = self.mode == SearchMode::Hybrid && self.keywords.is_some();
        let mut candidates: Vec<Candidate> = merged
            .into_values()
            .map(|mut c| {
                c.score = match self.mode {
                    SearchMode::Vector => c.similarity,
                    SearchMode::Keyword => c.keyword_score.unwrap_or(0.0),
                    SearchMode::Hybrid if fuse => {
                        self.vector_weight * c.similarity + self.keyword_weight * c.keyword_score.unwrap_or(0.0)
                    }
                    SearchMode::Hybrid => c.similarity,
                };
                c
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entry.chunk.id.cmp(&b.entry.chunk.id))
        });
        candidates.truncate(n);

        let ranked = match &self.reranker {
            Some(reranker) if !candidates.is_empty() => {
                match cancel.run(rerank(reranker.as_ref(), query, &candidates)).await {
                    Ok(order) => order,
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!(reranker = reranker.name(), error = %e, "reranking failed, using retrieval order");
                        retrieval_order(&candidates)
                    }
                }
            }
            _ => retrieval_order(&candidates),
        };

        Ok(ranked
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, (idx, rerank_score))| to_result(&candidates[idx], rerank_score, i + 1))
            .collect())
    }
}

fn retrieval_order(candidates: &[Candidate]) -> Vec<(usize, Option<f64>)> {
    (0..candidates.len()).map(|i| (i, None)).collect()
}

/// Rerank the head of `candidates`; the tail the reranker cannot take keeps
/// retrieval order after it.
async fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    candidates: &[Candidate],
) -> Result<Vec<(usize, Option<f64>)>, SightlineError> {
    let head = candidates.len().min(reranker.max_documents().max(1));
    let documents: Vec<String> = candidates[..head]
        .iter()
        .map(|c| c.entry.chunk.embedding_text())
        .collect();
    let mut scores = reranker.rerank(query, &documents).await?;

    if let Some(bad) = scores.iter().find(|s| s.index >= head) {
        return Err(SightlineError::transient(
            reranker.name(),
            format!("rerank index {} out of range", bad.index),
        ));
    }
    // Equal scores keep retrieval order.
    sort_scores(&mut scores);

    let mut seen = vec![false; candidates.len()];
    let mut order = Vec::with_capacity(candidates.len());
    for s in scores {
        if !std::mem::replace(&mut seen[s.index], true) {
            order.push((s.index, Some(s.score)));
        }
    }
    for (i, done) in seen.iter().enumerate() {
        if !done {
            order.push((i, None));
        }
    }
    Ok(order)
}

fn to_result(candidate: &Candidate, rerank_score: Option<f64>, rank: usize) -> SearchResult {
    let chunk = &candidate.entry.chunk;
    SearchResult {
        chunk_id: chunk.id.clone(),
        file_path: chunk.file_path.clone(),
        line_start: chunk.span.start_line,
        line_end: chunk.span.end_line,
        name: chunk.name.clone(),
        kind: chunk.kind,
        language: chunk.language.clone(),
        snippet: chunk.text.clone(),
        similarity: candidate.similarity,
        keyword_score: candidate.keyword_score,
        score: candidate.score,
        rerank_score,
        rank,
    }
}
