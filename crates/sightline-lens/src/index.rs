//! In-memory vector index with exact k-nearest-neighbour search.
//!
//! Entries are immutable `Arc`s swapped under a write lock, so a concurrent
//! query sees either the old vector or the new one, never a partial write.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use sightline_core::{Chunk, ChunkId, Metric, SightlineError};

/// One indexed chunk with its (metric-prepared) vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Content hash the vector was computed for.
    pub content_hash: String,
}

/// A query hit; `similarity` is higher for closer vectors under either metric.
#[derive(Debug, Clone)]
pub struct Neighbour {
    pub entry: Arc<IndexEntry>,
    pub similarity: f64,
}

/// Exact-search vector index over chunk ids.
///
/// Every vector must have the index's dimensions, and all vectors share one
/// metric for the lifetime of the index.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use sightline_core::{Chunk, ChunkKind, Metric, Span};
/// use sightline_lens::VectorIndex;
///
/// let span = Span { start_byte: 0, end_byte: 1, start_line: 1, end_line: 1 };
/// let chunk = Chunk::new(Path::new("a.rs"), "rust", "a", ChunkKind::Function, span, "fn a() {}");
///
/// let index = VectorIndex::new(2, Metric::Cosine);
/// index.upsert(chunk, vec![1.0, 0.0]).unwrap();
/// let hits = index.query(&[0.9, 0.1], 5, |_| true).unwrap();
/// assert_eq!(hits.len(), 1);
/// assert!(index.check_dimensions(3).is_err());
/// ```
#[derive(Debug)]
pub struct VectorIndex {
    dimensions: usize,
    metric: Metric,
    entries: RwLock<BTreeMap<ChunkId, Arc<IndexEntry>>>,
}

impl VectorIndex {
    pub fn new(dimensions: usize, metric: Metric) -> Self {
        Self {
            dimensions,
            metric,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// `Err(DimensionMismatch)` unless `len` equals the index dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::DimensionMismatch`].
    pub fn check_dimensions(&self, len: usize) -> Result<(), SightlineError> {
        if len != self.dimensions {
            return Err(SightlineError::DimensionMismatch {
                expected: self.dimensions,
                actual: len,
            });
        }
        Ok(())
    }

    /// Insert or replace the entry for `chunk.id`.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::DimensionMismatch`] if `vector` has the wrong length.
    pub fn upsert(&self, chunk: Chunk, vector: Vec<f32>) -> Result<(), SightlineError> {
        self.check_dimensions(vector.len())?;
        let entry = Arc::new(IndexEntry {
            content_hash: chunk.content_hash.clone(),
            vector: self.prepare(vector),
            chunk,
        });
        self.entries.write().insert(entry.chunk.id.clone(), entry);
        Ok(())
    }

    /// Content hash currently indexed for `id`.
    pub fn content_hash(&self, id: &ChunkId) -> Option<String> {
        self.entries.read().get(id).map(|e| e.content_hash.clone())
    }

    pub fn get(&self, id: &ChunkId) -> Option<Arc<IndexEntry>> {
        self.entries.read().get(id).cloned()
    }

    /// Remove one entry; returns whether it existed.
    pub fn remove(&self, id: &ChunkId) -> bool {
        self.entries.write().remove(id).is_some()
    }

    /// Remove every entry belonging to `path`; returns how many were removed.
    pub fn remove_file(&self, path: &Path) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.chunk.file_path != path);
        before - entries.len()
    }

    /// Keep only the ids accepted by `keep`.
    pub fn retain(&self, keep: impl Fn(&ChunkId) -> bool) {
        self.entries.write().retain(|id, _| keep(id));
    }

    /// The `k` entries most similar to `query` among those accepted by
    /// `filter`, best first, ties broken by ascending chunk id.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::DimensionMismatch`] if `query` has the wrong length.
    pub fn query(
        &self,
        query: &[f32],
        k: usize,
        filter: impl Fn(&Chunk) -> bool,
    ) -> Result<Vec<Neighbour>, SightlineError> {
        self.check_dimensions(query.len())?;
        let query = self.prepare(query.to_vec());

        let snapshot: Vec<Arc<IndexEntry>> = self
            .entries
            .read()
            .values()
            .filter(|e| filter(&e.chunk))
            .cloned()
            .collect();

        let mut scored: Vec<Neighbour> = snapshot
            .into_iter()
            .map(|entry| Neighbour {
                similarity: dot(&query, &entry.vector),
                entry,
            })
            .collect();
        // Stable sort over id-ordered input keeps ties in id order.
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(k);
        Ok(scored)
    }

    /// Similarity of `query` to one entry, on the same scale as [`query`](Self::query).
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::DimensionMismatch`] if `query` has the wrong length.
    pub fn similarity(&self, query: &[f32], entry: &IndexEntry) -> Result<f64, SightlineError> {
        self.check_dimensions(query.len())?;
        Ok(dot(&self.prepare(query.to_vec()), &entry.vector))
    }

    fn prepare(&self, mut vector: Vec<f32>) -> Vec<f32> {
        if self.metric == Metric::Cosine {
            let norm = vector.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
            if norm > 0.0 {
                for x in &mut vector {
                    *x = (f64::from(*x) / norm) as f32;
                }
            }
        }
        vector
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}
