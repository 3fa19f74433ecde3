//! Context search handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use validator::Validate;

use crate::AppState;
use windowforge_common::{
    context::{ContextQuery, MetadataFilter, ResultDocument},
    errors::{AppError, Result},
    metrics,
};

/// Context search request
#[derive(Debug, Deserialize, Validate)]
pub struct ContextSearchRequest {
    /// Query embedding, produced by the caller's embedding model
    #[validate(length(min = 1, max = 8192))]
    pub embedding: Vec<f32>,

    /// Seeds to expand
    #[validate(range(min = 1, max = 100))]
    pub k: Option<usize>,

    /// Metadata equality filter for the seed search
    #[serde(default)]
    pub filter: BTreeMap<String, String>,

    /// Maximum characters per document
    #[validate(range(min = 1, max = 1_000_000))]
    pub budget: Option<usize>,

    /// Expand seeds into context windows
    pub expand: Option<bool>,

    /// Drop seeds farther than this
    #[validate(range(min = 0.0))]
    pub max_distance: Option<f32>,

    /// Query deadline in milliseconds
    #[validate(range(min = 1, max = 60_000))]
    pub timeout_ms: Option<u64>,
}

impl ContextSearchRequest {
    /// Fill unset fields from the configured defaults
    fn into_query(self, state: &AppState) -> ContextQuery {
        let retrieval = &state.config.retrieval;
        let mut query = ContextQuery::new(self.embedding, retrieval)
            .with_filter(MetadataFilter::from(self.filter));

        if let Some(k) = self.k {
            query = query.with_k(k);
        }
        if let Some(budget) = self.budget {
            query = query.with_budget(budget);
        }
        if let Some(expand) = self.expand {
            query = query.with_expansion(expand);
        }
        if self.max_distance.is_some() {
            query = query.with_max_distance(self.max_distance);
        }
        if let Some(ms) = self.timeout_ms {
            query = query.with_timeout(Some(Duration::from_millis(ms)));
        }
        query
    }
}

/// Context search response
#[derive(Debug, Serialize)]
pub struct ContextSearchResponse {
    pub documents: Vec<ResultDocument>,
    pub total: usize,
    pub processing_time_ms: u64,
}

/// Retrieve stitched context documents for a query embedding
pub async fn context_search(
    State(state): State<AppState>,
    Json(request): Json<ContextSearchRequest>,
) -> Result<Json<ContextSearchResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: e.field_errors().keys().next().map(|f| f.to_string()),
    })?;

    let query = request.into_query(&state);
    let documents = state.retriever.search(&query).await?;

    let processing_time_ms = metrics::millis(start.elapsed());

    tracing::info!(
        documents = documents.len(),
        k = query.k,
        budget = query.budget,
        latency_ms = processing_time_ms,
        "Context search completed"
    );

    Ok(Json(ContextSearchResponse {
        total: documents.len(),
        documents,
        processing_time_ms,
    }))
}
