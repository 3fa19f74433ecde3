//! Query orchestration
//!
//! Seeds come from the nearest-neighbour query, are expanded one after
//! another into a single accumulation state, then merged and assembled.
//! The whole query can run under a deadline; when it expires the windows of
//! completed seeds are returned, and the seed cut short appears alone.

use super::assembler::assemble;
use super::expander::{ContextExpander, ExpansionPolicy};
use super::merger::merge_runs;
use super::state::AccumulationState;
use super::store::ChunkStore;
use super::types::{Hit, IdBounds, MetadataFilter, ResultDocument};
use crate::config::RetrievalConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One context retrieval request
#[derive(Debug, Clone)]
pub struct ContextQuery {
    /// Query embedding
    pub embedding: Vec<f32>,

    /// Seeds to request
    pub k: usize,

    /// Equality filter applied to the seed search
    pub filter: MetadataFilter,

    /// Maximum characters per assembled document
    pub budget: usize,

    /// Expand seeds; when false every hit is returned as its own document
    pub expand: bool,

    /// Drop seeds farther than this
    pub max_distance: Option<f32>,

    /// Whole-query deadline
    pub timeout: Option<Duration>,
}

impl ContextQuery {
    /// Query with the configured defaults
    pub fn new(embedding: Vec<f32>, config: &RetrievalConfig) -> Self {
        Self {
            embedding,
            k: config.default_k,
            filter: MetadataFilter::new(),
            budget: config.default_budget,
            expand: config.expand_context,
            max_distance: config.max_distance,
            timeout: config.query_timeout(),
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_expansion(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    pub fn with_max_distance(mut self, max_distance: Option<f32>) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn mode(&self) -> &'static str {
        if self.expand {
            "context"
        } else {
            "plain"
        }
    }
}

/// Context retrieval over a chunk store
pub struct ContextRetriever<S: ChunkStore + ?Sized> {
    store: Arc<S>,
    policy: ExpansionPolicy,
}

impl<S: ChunkStore + ?Sized> Clone for ContextRetriever<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<S: ChunkStore + ?Sized> ContextRetriever<S> {
    pub fn new(store: Arc<S>, policy: ExpansionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Retrieve and stitch context documents, most relevant first.
    ///
    /// No seeds is an empty result, not an error. Failures of the seed
    /// search or the bounds lookup abort the query; failures while expanding
    /// a seed only shrink that seed's window to the seed itself.
    #[tracing::instrument(
        name = "context_search",
        skip_all,
        fields(query_id = %Uuid::new_v4(), k = query.k, budget = query.budget, mode = query.mode())
    )]
    pub async fn search(&self, query: &ContextQuery) -> Result<Vec<ResultDocument>> {
        validate(query)?;

        let started = Instant::now();
        let deadline = query.timeout.map(|t| started + t);

        let seeds = match within(deadline, self.store.knn(&query.embedding, query.k, &query.filter)).await {
            Some(seeds) => seeds?,
            None => {
                warn!("Deadline reached before the seed search finished");
                metrics::record_timeout("seed_search");
                return Ok(Vec::new());
            }
        };

        let seeds: Vec<Hit> = match query.max_distance {
            Some(max) => seeds
                .into_iter()
                .filter(|hit| hit.distance.map_or(true, |d| d <= max))
                .collect(),
            None => seeds,
        };

        if seeds.is_empty() {
            debug!("No seeds matched");
            metrics::record_query(started.elapsed().as_secs_f64(), query.mode(), 0);
            return Ok(Vec::new());
        }

        let documents = if query.expand {
            self.expand_seeds(&seeds, query, deadline).await?
        } else {
            seeds.into_iter().map(ResultDocument::from_hit).collect()
        };

        let elapsed = started.elapsed();
        metrics::record_query(elapsed.as_secs_f64(), query.mode(), documents.len());
        info!(
            documents = documents.len(),
            chunks = documents.iter().map(ResultDocument::span).sum::<usize>(),
            latency_ms = metrics::millis(elapsed),
            "Context query completed"
        );

        Ok(documents)
    }

    async fn expand_seeds(
        &self,
        seeds: &[Hit],
        query: &ContextQuery,
        deadline: Option<Instant>,
    ) -> Result<Vec<ResultDocument>> {
        let bounds = match within(deadline, self.bounds()).await {
            Some(bounds) => bounds?,
            None => {
                warn!("Deadline reached before the id bounds were read");
                metrics::record_timeout("bounds");
                return Ok(Vec::new());
            }
        };

        let mut state = AccumulationState::new();
        let expander = ContextExpander::new(self.store.as_ref(), self.policy);

        for (position, seed) in seeds.iter().enumerate() {
            let checkpoint = state.checkpoint();
            let expansion = expander.expand(seed, &query.embedding, &mut state, bounds, query.budget);

            let outcome = within(deadline, expansion).await;
            match outcome {
                Some(Ok(report)) => {
                    debug!(
                        seed_id = report.seed_id,
                        absorbed = report.absorbed,
                        skipped = report.skipped,
                        length = report.length,
                        passes = report.passes,
                        stop = report.stop.as_str(),
                        "Seed expanded"
                    );
                    metrics::record_expansion(report.stop.as_str(), report.absorbed, report.passes);
                }
                Some(Err(err)) => {
                    warn!(seed_id = seed.id(), error = %err, "Seed expansion failed, keeping the seed alone");
                    metrics::record_seed_failure();
                }
                None => {
                    // an unfinished window is dropped, its seed is kept alone
                    state.rollback(checkpoint);
                    state.record_seed(seed);
                    warn!(
                        seed_id = seed.id(),
                        remaining = seeds.len() - position - 1,
                        "Deadline reached during expansion, returning completed windows"
                    );
                    metrics::record_timeout("expansion");
                    break;
                }
            }
        }

        let runs = merge_runs(state.ids().iter().copied());
        debug!(absorbed = state.len(), seeds = state.seed_count(), runs = runs.len(), "Merged windows");

        Ok(assemble(&runs, &state))
    }

    /// Collection-wide id bounds; an empty collection reads as 0..=0
    async fn bounds(&self) -> Result<IdBounds> {
        let (min_id, max_id) = tokio::try_join!(self.store.min_id(), self.store.max_id())?;
        Ok(IdBounds::new(min_id.unwrap_or(0), max_id.unwrap_or(0)))
    }
}

fn validate(query: &ContextQuery) -> Result<()> {
    if query.k == 0 {
        return Err(AppError::Validation {
            message: "k must be at least 1".to_string(),
            field: Some("k".to_string()),
        });
    }
    if query.embedding.is_empty() {
        return Err(AppError::Validation {
            message: "query embedding is empty".to_string(),
            field: Some("embedding".to_string()),
        });
    }
    if query.embedding.iter().any(|v| !v.is_finite()) {
        return Err(AppError::Validation {
            message: "query embedding contains non-finite values".to_string(),
            field: Some("embedding".to_string()),
        });
    }
    Ok(())
}

/// Run `fut` to completion, or until `deadline`. Dropping the future on
/// expiry cancels any range reads still in flight.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}
