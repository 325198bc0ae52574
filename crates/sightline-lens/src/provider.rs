//! Embedding and reranking provider contracts.
//!
//! Providers describe their limits through capability methods instead of
//! per-vendor branches in the pipeline; a new vendor is a new implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sightline_core::SightlineError;

/// Turns texts into fixed-length vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order, and must return an empty result for empty input.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable name recorded with every embedding.
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// Per-text token budget.
    fn max_tokens(&self) -> usize;

    /// Largest number of texts accepted by one [`embed`](Self::embed) call.
    fn max_batch_size(&self) -> usize;

    /// Embed documents for indexing.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Provider`]; `transient` marks errors worth retrying.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SightlineError>;

    /// Embed a search query. Providers that distinguish query and document
    /// inputs override this.
    ///
    /// # Errors
    ///
    /// Same as [`embed`](Self::embed).
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, SightlineError> {
        self.embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SightlineError::transient(self.name(), "empty response for query"))
    }

    /// Prepare the provider (load a model, open a connection).
    ///
    /// # Errors
    ///
    /// Returns a provider error if the provider cannot be used.
    async fn warmup(&self) -> Result<(), SightlineError> {
        Ok(())
    }

    /// Check that the provider is reachable and configured.
    ///
    /// # Errors
    ///
    /// Returns a provider error describing why it is unavailable.
    async fn available(&self) -> Result<(), SightlineError>;
}

/// Relevance of one document, by its position in the rerank input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub score: f64,
}

/// Re-scores a candidate list against a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Most documents accepted by one [`rerank`](Self::rerank) call.
    fn max_documents(&self) -> usize;

    /// Scores in descending order, ties broken by ascending input index.
    ///
    /// # Errors
    ///
    /// Returns a provider error; callers fall back to retrieval order.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankScore>, SightlineError>;
}

/// Pass-through reranker that keeps the input order.
///
/// # Examples
///
/// ```
/// use sightline_lens::{NoopReranker, Reranker};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let docs = vec!["a".to_string(), "b".to_string()];
/// let scores = NoopReranker::default().rerank("q", &docs).await.unwrap();
/// assert_eq!(scores[0].index, 0);
/// assert!(scores[0].score > scores[1].score);
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct NoopReranker {
    max_documents: usize,
}

impl NoopReranker {
    pub fn new(max_documents: usize) -> Self {
        Self { max_documents }
    }
}

impl Default for NoopReranker {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

#[async_trait]
impl Reranker for NoopReranker {
    fn name(&self) -> &str {
        "none"
    }

    fn max_documents(&self) -> usize {
        self.max_documents
    }

    async fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<RerankScore>, SightlineError> {
        let n = documents.len() as f64;
        Ok((0..documents.len())
            .map(|index| RerankScore {
                index,
                score: (n - index as f64) / n,
            })
            .collect())
    }
}

/// Sort scores descending, ties by ascending input index.
pub(crate) fn sort_scores(scores: &mut [RerankScore]) {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.index.cmp(&b.index)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_scores_decrease_monotonically() {
        let docs: Vec<String> = (0..4).map(|i| format!("doc {i}")).collect();
        let scores = NoopReranker::default().rerank("query", &docs).await.unwrap();
        let indices: Vec<usize> = scores.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(scores.windows(2).all(|w| w[0].score > w[1].score));
        assert_eq!(scores[0].score, 1.0);
    }

    #[tokio::test]
    async fn noop_tolerates_empty_input() {
        let scores = NoopReranker::default().rerank("query", &[]).await.unwrap();
        assert!(scores.is_empty());
    }

    #[test]
    fn sort_breaks_ties_by_index() {
        let mut scores = vec![
            RerankScore { index: 2, score: 0.5 },
            RerankScore { index: 0, score: 0.5 },
            RerankScore { index: 1, score: 0.9 },
        ];
        sort_scores(&mut scores);
        let indices: Vec<usize> = scores.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 0, 2]);
    }
}
