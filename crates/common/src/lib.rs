//! WindowForge Common Library
//!
//! Shared code for the WindowForge services including:
//! - Context expansion engine
//! - pgvector chunk store and connection pool
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use context::{ContextQuery, ContextRetriever, ResultDocument};
pub use db::{DbPool, PgChunkStore};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
