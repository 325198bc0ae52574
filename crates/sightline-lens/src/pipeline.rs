//! Batch embedding pipeline with a content-hash cache.
//!
//! 1. Partition chunks into cache hits and misses (deduplicated by hash).
//! 2. Truncate oversized texts to the provider's token budget.
//! 3. Group misses into batches and embed them concurrently.
//! 4. Retry transient batch failures with exponential backoff; a batch that
//!    still fails is recorded and skipped, while a persistent provider error
//!    stops the run.
//! 5. Write each batch to the cache as soon as it lands.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sightline_core::{CancelSignal, Chunk, ChunkId, EmbeddingConfig, FailureScope, MultiError, SightlineError};
use tracing::{debug, info, warn};

use crate::provider::EmbeddingProvider;
use crate::store::{EmbeddingCache, EmbeddingRecord};

/// Approximate characters per token used for truncation.
const CHARS_PER_TOKEN: usize = 4;

/// Tunables for [`EmbeddingPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_tokens: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}

impl PipelineOptions {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            concurrency: config.concurrency,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_tokens: config.max_tokens,
        }
    }
}

/// What one pipeline run did.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    /// Valid records for every chunk that has one, by chunk id.
    pub records: BTreeMap<ChunkId, Arc<EmbeddingRecord>>,
    /// Chunks served from the cache.
    pub cached: usize,
    /// Chunks embedded in this run.
    pub embedded: usize,
    pub truncated: usize,
    /// Chunks left without an embedding because their batch failed.
    pub failed: Vec<ChunkId>,
    pub provider_calls: usize,
    pub failures: MultiError,
}

struct Pending {
    content_hash: String,
    /// Every chunk sharing this content hash.
    chunk_ids: Vec<ChunkId>,
    text: String,
    truncated: bool,
}

struct BatchResult {
    index: usize,
    pending: Vec<Pending>,
    calls: usize,
    result: Result<Vec<Vec<f32>>, SightlineError>,
}

/// Embeds chunks through a provider, caching by content hash.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use sightline_core::{CancelSignal, EmbeddingConfig};
/// use sightline_lens::{EmbeddingPipeline, HttpEmbedder, PipelineOptions, SqliteStore};
///
/// # async fn example() -> Result<(), sightline_core::SightlineError> {
/// let config = EmbeddingConfig::default();
/// let provider = Arc::new(HttpEmbedder::with_config(&config)?);
/// let cache = Arc::new(SqliteStore::open(std::path::Path::new(".sightline/index.db"))?);
/// let pipeline = EmbeddingPipeline::new(provider, cache, PipelineOptions::from_config(&config));
/// let outcome = pipeline.run(&[], &CancelSignal::new()).await?;
/// assert_eq!(outcome.provider_calls, 0);
/// # Ok(())
/// # }
/// ```
pub struct EmbeddingPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn EmbeddingCache>,
    options: PipelineOptions,
}

impl std::fmt::Debug for EmbeddingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingPipeline")
            .field("provider", &self.provider.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl EmbeddingPipeline {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn EmbeddingCache>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            provider,
            cache,
            options,
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Ensure every chunk has a valid embedding record.
    ///
    /// Batches that fail after retries are reported in
    /// [`PipelineOutcome::failures`]; records written before a failure or
    /// cancellation stay in the cache.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Cancelled`] if `cancel` fires, a persistent
    /// [`SightlineError::Provider`] error, or a cache error.
    pub async fn run(&self, chunks: &[Chunk], cancel: &CancelSignal) -> Result<PipelineOutcome, SightlineError> {
        let mut outcome = PipelineOutcome::default();
        let pending = self.partition(chunks, &mut outcome)?;
        if pending.is_empty() {
            debug!(cached = outcome.cached, "all embeddings cached");
            return Ok(outcome);
        }

        let batch_size = self.options.batch_size.min(self.provider.max_batch_size()).max(1);
        let mut batches: Vec<Vec<Pending>> = Vec::new();
        for item in pending {
            match batches.last_mut() {
                Some(batch) if batch.len() < batch_size => batch.push(item),
                _ => batches.push(vec![item]),
            }
        }
        info!(
            batches = batches.len(),
            batch_size,
            concurrency = self.options.concurrency,
            "embedding chunks"
        );

        cancel
            .run(async {
                let mut results = stream::iter(batches.into_iter().enumerate())
                    .map(|(index, pending)| self.embed_batch(index, pending))
                    .buffer_unordered(self.options.concurrency.max(1));

                while let Some(batch) = results.next().await {
                    outcome.provider_calls += batch.calls;
                    match batch.result {
                        Ok(vectors) => self.store_batch(batch.pending, vectors, &mut outcome)?,
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e @ SightlineError::Provider { transient: false, .. }) => {
                            warn!(batch = batch.index, error = %e, "persistent provider error, stopping");
                            return Err(e);
                        }
                        Err(e) => {
                            warn!(batch = batch.index, chunks = batch.pending.len(), error = %e, "batch failed");
                            outcome.failures.push(FailureScope::Batch(batch.index), e.to_string());
                            outcome
                                .failed
                                .extend(batch.pending.into_iter().flat_map(|p| p.chunk_ids));
                        }
                    }
                }
                Ok(())
            })
            .await?;

        outcome.failed.sort();
        info!(
            embedded = outcome.embedded,
            cached = outcome.cached,
            failed = outcome.failed.len(),
            calls = outcome.provider_calls,
            "embedding finished"
        );
        Ok(outcome)
    }

    /// Fill `outcome` with cache hits and return the misses, one per hash.
    fn partition(&self, chunks: &[Chunk], outcome: &mut PipelineOutcome) -> Result<Vec<Pending>, SightlineError> {
        let provider = self.provider.name();
        let dimensions = self.provider.dimensions();
        let max_chars = self
            .options
            .max_tokens
            .min(self.provider.max_tokens())
            .saturating_mul(CHARS_PER_TOKEN);

        let mut pending: Vec<Pending> = Vec::new();
        let mut by_hash: BTreeMap<&str, usize> = BTreeMap::new();
        let mut seen: HashSet<&ChunkId> = HashSet::new();

        for chunk in chunks {
            if !seen.insert(&chunk.id) {
                continue;
            }
            if let Some(&slot) = by_hash.get(chunk.content_hash.as_str()) {
                pending[slot].chunk_ids.push(chunk.id.clone());
                continue;
            }
            match self.cache.get(&chunk.content_hash)? {
                Some(record) if record.provider == provider && record.dimensions == dimensions => {
                    outcome.cached += 1;
                    outcome.records.insert(chunk.id.clone(), Arc::new(record));
                }
                _ => {
                    let (text, truncated) = truncate(chunk.embedding_text(), max_chars);
                    by_hash.insert(&chunk.content_hash, pending.len());
                    pending.push(Pending {
                        content_hash: chunk.content_hash.clone(),
                        chunk_ids: vec![chunk.id.clone()],
                        text,
                        truncated,
                    });
                }
            }
        }
        Ok(pending)
    }

    async fn embed_batch(&self, index: usize, pending: Vec<Pending>) -> BatchResult {
        let texts: Vec<String> = pending.iter().map(|p| p.text.clone()).collect();
        let mut calls = 0;
        let mut attempt = 0;
        let result = loop {
            calls += 1;
            let result = self.provider.embed(&texts).await.and_then(|vectors| {
                if vectors.len() == texts.len() {
                    Ok(vectors)
                } else {
                    Err(SightlineError::transient(
                        self.provider.name(),
                        format!("expected {} vectors, got {}", texts.len(), vectors.len()),
                    ))
                }
            });
            match result {
                Err(e) if e.is_transient() && attempt < self.options.max_retries => {
                    let backoff = self.options.retry_backoff * 2u32.saturating_pow(attempt);
                    warn!(batch = index, attempt = attempt + 1, error = %e, "retrying batch");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => break other,
            }
        };
        BatchResult {
            index,
            pending,
            calls,
            result,
        }
    }

    fn store_batch(
        &self,
        pending: Vec<Pending>,
        vectors: Vec<Vec<f32>>,
        outcome: &mut PipelineOutcome,
    ) -> Result<(), SightlineError> {
        let dimensions = self.provider.dimensions();
        for (item, vector) in pending.into_iter().zip(vectors) {
            if vector.len() != dimensions {
                return Err(SightlineError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
            let record = Arc::new(EmbeddingRecord {
                chunk_id: item.chunk_ids[0].clone(),
                content_hash: item.content_hash,
                vector,
                provider: self.provider.name().to_string(),
                dimensions,
                truncated: item.truncated,
                created_at: Utc::now(),
            });
            self.cache.put(&record)?;
            if item.truncated {
                outcome.truncated += 1;
            }
            outcome.embedded += item.chunk_ids.len();
            for id in item.chunk_ids {
                outcome.records.insert(id, Arc::clone(&record));
            }
        }
        Ok(())
    }
}

/// Cut `text` to at most `max_chars` bytes on a char boundary.
fn truncate(mut text: String, max_chars: usize) -> (String, bool) {
    if text.len() <= max_chars {
        return (text, false);
    }
    let mut end = max_chars;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    (text, true)
}
