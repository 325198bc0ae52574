#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sightline_core::{SightlineConfig, SightlineError};
use sightline_lens::{EmbeddingProvider, RerankScore, Reranker};

/// Deterministic bag-of-words embedder that counts provider calls.
pub struct HashEmbedder {
    pub dimensions: usize,
    pub calls: AtomicUsize,
    pub texts: AtomicUsize,
    /// Any batch containing this text fails with a transient error.
    pub fail_marker: Option<String>,
    pub delay_ms: AtomicU64,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
            fail_marker: None,
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::new(64)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                h ^= u64::from(b);
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % self.dimensions as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_tokens(&self) -> usize {
        2000
    }

    fn max_batch_size(&self) -> usize {
        16
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SightlineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(SightlineError::transient("hash", "503 service unavailable"));
            }
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    async fn available(&self) -> Result<(), SightlineError> {
        Ok(())
    }
}

/// Scores documents in reverse input order.
pub struct ReversingReranker;

#[async_trait]
impl Reranker for ReversingReranker {
    fn name(&self) -> &str {
        "reversing"
    }

    fn max_documents(&self) -> usize {
        100
    }

    async fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<RerankScore>, SightlineError> {
        let mut scores: Vec<RerankScore> = (0..documents.len())
            .map(|index| RerankScore {
                index,
                score: index as f64,
            })
            .collect();
        scores.reverse();
        Ok(scores)
    }
}

pub fn config() -> SightlineConfig {
    let mut config = SightlineConfig::default();
    config.embedding.batch_size = 10;
    config.embedding.retry_backoff_ms = 1;
    config.index.workers = 2;
    config
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub const MAIN_PY: &str = r#"from app import pipeline

def main():
    config = load_config()
    pipeline.run_pipeline(config)

def load_config():
    return {}

if __name__ == "__main__":
    main()
"#;

pub const PIPELINE_PY: &str = r#"def run_pipeline(config):
    data = fetch_data(config)
    save_data(transform_data(data))

def fetch_data(config):
    return []

def transform_data(data):
    return data

def save_data(data):
    pass

def dead_chain_start():
    dead_chain_middle()

def dead_chain_middle():
    dead_chain_end()

def dead_chain_end():
    pass

class Store:
    def unused_method(self):
        pass
"#;

/// The small two-file Python application used across tests.
pub fn sample_repo(root: &Path) {
    write(root, "app/main.py", MAIN_PY);
    write(root, "app/pipeline.py", PIPELINE_PY);
}
