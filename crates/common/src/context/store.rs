//! Chunk store gateway seam
//!
//! The expansion engine only talks to storage through [`ChunkStore`].
//! `PgChunkStore` (in `db`) is the production implementation;
//! [`MemoryChunkStore`] keeps everything in process.

use super::types::{Chunk, Hit, MetadataFilter};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Id order of a range scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Asc,
    Desc,
}

/// Inclusive id range read
#[derive(Debug, Clone)]
pub struct RangeScan<'a> {
    pub low: i64,
    pub high: i64,
    pub order: ScanOrder,
    /// Attach the distance to this vector to every chunk
    pub distance_to: Option<&'a [f32]>,
}

impl<'a> RangeScan<'a> {
    pub fn new(low: i64, high: i64, order: ScanOrder) -> Self {
        Self {
            low,
            high,
            order,
            distance_to: None,
        }
    }

    pub fn with_distance_to(mut self, query: &'a [f32]) -> Self {
        self.distance_to = Some(query);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }
}

/// Read access to the persisted chunk collection.
///
/// Implementations return complete results or an error, never a partial read.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// The `k` chunks closest to `query`, ascending distance
    async fn knn(&self, query: &[f32], k: usize, filter: &MetadataFilter) -> Result<Vec<Hit>>;

    /// Chunks with ids in `[scan.low, scan.high]`, ordered by id
    async fn range_scan(&self, scan: &RangeScan<'_>) -> Result<Vec<Hit>>;

    /// Smallest id in the collection
    async fn min_id(&self) -> Result<Option<i64>>;

    /// Largest id in the collection
    async fn max_id(&self) -> Result<Option<i64>>;
}

/// Euclidean distance, the metric pgvector's `<->` uses
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[derive(Debug, Clone)]
struct StoredChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

impl StoredChunk {
    fn hit(&self, query: Option<&[f32]>) -> Hit {
        Hit {
            chunk: self.chunk.clone(),
            distance: query.map(|q| l2_distance(&self.embedding, q)),
        }
    }
}

/// In-process chunk store
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<BTreeMap<i64, StoredChunk>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a chunk under its own id, replacing any previous one
    pub fn insert(&self, chunk: Chunk, embedding: Vec<f32>) -> Result<()> {
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        chunks.insert(chunk.id, StoredChunk { chunk, embedding });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> AppError {
    AppError::Internal {
        message: "memory chunk store lock poisoned".to_string(),
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn knn(&self, query: &[f32], k: usize, filter: &MetadataFilter) -> Result<Vec<Hit>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut hits: Vec<Hit> = chunks
            .values()
            .filter(|stored| filter.matches(&stored.chunk.metadata))
            .map(|stored| stored.hit(Some(query)))
            .collect();

        hits.sort_by(|a, b| {
            let (da, db) = (a.distance.unwrap_or(f32::MAX), b.distance.unwrap_or(f32::MAX));
            da.total_cmp(&db).then_with(|| a.id().cmp(&b.id()))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn range_scan(&self, scan: &RangeScan<'_>) -> Result<Vec<Hit>> {
        if scan.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().map_err(poisoned)?;
        let range = chunks.range(scan.low..=scan.high).map(|(_, stored)| stored);
        let hits = match scan.order {
            ScanOrder::Asc => range.map(|s| s.hit(scan.distance_to)).collect(),
            ScanOrder::Desc => range.rev().map(|s| s.hit(scan.distance_to)).collect(),
        };
        Ok(hits)
    }

    async fn min_id(&self) -> Result<Option<i64>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(chunks.keys().next().copied())
    }

    async fn max_id(&self) -> Result<Option<i64>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(chunks.keys().next_back().copied())
    }
}
