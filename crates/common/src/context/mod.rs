//! Context expansion engine
//!
//! Grows nearest-neighbour hits into contiguous excerpts of their source
//! documents:
//! - seed search and orchestration (`retriever`)
//! - per-seed widening passes (`expander`)
//! - id-run merging and document assembly (`merger`, `assembler`)

mod assembler;
mod expander;
mod merger;
mod retriever;
mod state;
mod store;
mod types;

pub use assembler::assemble;
pub use expander::{ContextExpander, ExpansionPolicy, ExpansionReport, Halt, Side, StopReason};
pub use merger::merge_runs;
pub use retriever::{ContextQuery, ContextRetriever};
pub use state::{AccumulationState, Checkpoint};
pub use store::{l2_distance, ChunkStore, MemoryChunkStore, RangeScan, ScanOrder};
pub use types::{
    Chunk, HeadingPath, Hit, IdBounds, MetadataFilter, ResultDocument, SourceFormat,
    HEADING_KEYS, HEADING_LEVELS,
};
