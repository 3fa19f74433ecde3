//! Context expansion around one seed hit
//!
//! Each pass widens the window around the seed, reads the newly uncovered
//! id ranges on both sides, and walks the two batches in distance order.
//! Candidates are absorbed until the length budget, a document boundary or
//! a heading change closes that side for the rest of the expansion.

use super::state::AccumulationState;
use super::store::{ChunkStore, RangeScan, ScanOrder};
use super::types::{Chunk, Hit, IdBounds};
use crate::config::RetrievalConfig;
use crate::errors::{AppError, Result};
use serde::Serialize;
use tracing::{debug, trace};

/// Widening schedule for one seed
#[derive(Debug, Clone, Copy)]
pub struct ExpansionPolicy {
    /// Half-width of the first pass
    pub initial_half_width: i64,
    /// Half-width growth per pass
    pub width_step: i64,
    /// Passes after which a seed stops regardless of progress
    pub max_passes: u32,
}

impl Default for ExpansionPolicy {
    fn default() -> Self {
        Self {
            initial_half_width: 10,
            width_step: 20,
            max_passes: 64,
        }
    }
}

impl From<&RetrievalConfig> for ExpansionPolicy {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            initial_half_width: config.initial_half_width.max(1),
            width_step: config.width_step.max(1),
            max_passes: config.max_passes,
        }
    }
}

/// Which neighbour a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Why a side stopped growing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Halt {
    /// The range read returned nothing
    EndOfBatch,
    /// The candidate would push the window over budget
    Budget,
    /// The candidate belongs to another source document
    ForeignDocument,
    /// The candidate sits under a different heading than the seed
    HeadingMismatch,
}

/// Why the widening loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    BothSidesHalted,
    OutOfBounds,
    PassLimit,
    /// The seed alone already exceeds the budget
    SeedOverBudget,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::BothSidesHalted => "both_sides_halted",
            StopReason::OutOfBounds => "out_of_bounds",
            StopReason::PassLimit => "pass_limit",
            StopReason::SeedOverBudget => "seed_over_budget",
        }
    }
}

/// Outcome of expanding one seed
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionReport {
    pub seed_id: i64,
    pub absorbed: usize,
    pub skipped: usize,
    /// Window length in characters when expansion stopped
    pub length: usize,
    pub passes: u32,
    pub left: Option<Halt>,
    pub right: Option<Halt>,
    pub stop: StopReason,
}

enum Verdict {
    Accept,
    Skip,
    Reject(Halt),
}

/// Open end of the window on one side
#[derive(Debug)]
struct Frontier {
    cursor: i64,
    halt: Option<Halt>,
}

impl Frontier {
    fn new(cursor: i64) -> Self {
        Self { cursor, halt: None }
    }

    fn is_open(&self) -> bool {
        self.halt.is_none()
    }

    fn step_past(&mut self, side: Side, id: i64) {
        self.cursor = match side {
            Side::Left => id - 1,
            Side::Right => id + 1,
        };
    }
}

/// Expands seeds against a chunk store
pub struct ContextExpander<'a, S: ChunkStore + ?Sized> {
    store: &'a S,
    policy: ExpansionPolicy,
}

impl<'a, S: ChunkStore + ?Sized> ContextExpander<'a, S> {
    pub fn new(store: &'a S, policy: ExpansionPolicy) -> Self {
        Self { store, policy }
    }

    /// Grow `state` around `seed`.
    ///
    /// The seed is recorded first, so a failed range read still leaves it
    /// (and whatever was absorbed before the failure) in the state.
    pub async fn expand(
        &self,
        seed: &Hit,
        query: &[f32],
        state: &mut AccumulationState,
        bounds: IdBounds,
        budget: usize,
    ) -> Result<ExpansionReport> {
        let seed_id = seed.id();
        state.record_seed(seed);

        let mut report = ExpansionReport {
            seed_id,
            absorbed: 0,
            skipped: 0,
            length: seed.chunk.len(),
            passes: 0,
            left: None,
            right: None,
            stop: StopReason::PassLimit,
        };

        if report.length > budget {
            debug!(seed_id, length = report.length, budget, "Seed exceeds budget on its own");
            report.stop = StopReason::SeedOverBudget;
            return Ok(report);
        }

        let mut left = Frontier::new(seed_id - 1);
        let mut right = Frontier::new(seed_id + 1);
        let mut width = self.policy.initial_half_width;

        while report.passes < self.policy.max_passes {
            if left.cursor < bounds.min_id && right.cursor > bounds.max_id {
                report.stop = StopReason::OutOfBounds;
                break;
            }

            let (left_batch, right_batch) = self
                .read_pass(seed_id, width, &left, &right, query)
                .await
                .map_err(|e| AppError::SeedExpansionFailed {
                    seed_id,
                    message: e.to_string(),
                })?;
            report.passes += 1;

            if left.is_open() && left_batch.is_empty() {
                left.halt = Some(Halt::EndOfBatch);
            }
            if right.is_open() && right_batch.is_empty() {
                right.halt = Some(Halt::EndOfBatch);
            }

            self.walk(
                &seed.chunk,
                left_batch,
                right_batch,
                &mut left,
                &mut right,
                state,
                budget,
                &mut report,
            );

            if !left.is_open() && !right.is_open() {
                report.stop = StopReason::BothSidesHalted;
                break;
            }

            // an open side consumed its whole batch
            if left.is_open() {
                left.cursor = seed_id - width - 1;
            }
            if right.is_open() {
                right.cursor = seed_id + width + 1;
            }
            width += self.policy.width_step;
        }

        report.left = left.halt;
        report.right = right.halt;

        trace!(
            seed_id,
            absorbed = report.absorbed,
            skipped = report.skipped,
            length = report.length,
            passes = report.passes,
            stop = report.stop.as_str(),
            "Seed expanded"
        );

        Ok(report)
    }

    /// Read the unexplored ranges of both open sides concurrently.
    async fn read_pass(
        &self,
        seed_id: i64,
        width: i64,
        left: &Frontier,
        right: &Frontier,
        query: &[f32],
    ) -> Result<(Vec<Hit>, Vec<Hit>)> {
        let left_scan =
            RangeScan::new(seed_id - width, left.cursor, ScanOrder::Desc).with_distance_to(query);
        let right_scan =
            RangeScan::new(right.cursor, seed_id + width, ScanOrder::Asc).with_distance_to(query);

        let left_read = async {
            if left.is_open() {
                self.store.range_scan(&left_scan).await
            } else {
                Ok(Vec::new())
            }
        };
        let right_read = async {
            if right.is_open() {
                self.store.range_scan(&right_scan).await
            } else {
                Ok(Vec::new())
            }
        };

        tokio::try_join!(left_read, right_read)
    }

    /// Merge-walk both batches by distance, right side winning ties.
    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        seed: &Chunk,
        left_batch: Vec<Hit>,
        right_batch: Vec<Hit>,
        left: &mut Frontier,
        right: &mut Frontier,
        state: &mut AccumulationState,
        budget: usize,
        report: &mut ExpansionReport,
    ) {
        let mut left_iter = left_batch.into_iter().peekable();
        let mut right_iter = right_batch.into_iter().peekable();

        loop {
            let next_left = if left.is_open() { left_iter.peek() } else { None };
            let next_right = if right.is_open() { right_iter.peek() } else { None };

            let side = match (next_left, next_right) {
                (None, None) => break,
                (Some(_), None) => Side::Left,
                (None, Some(_)) => Side::Right,
                (Some(l), Some(r)) => {
                    if right_goes_first(l.distance, r.distance) {
                        Side::Right
                    } else {
                        Side::Left
                    }
                }
            };

            let (candidate, frontier) = match side {
                Side::Left => (left_iter.next(), &mut *left),
                Side::Right => (right_iter.next(), &mut *right),
            };
            let Some(candidate) = candidate else {
                break;
            };

            match judge(seed, &candidate.chunk, report.length, budget, state) {
                Verdict::Reject(halt) => {
                    trace!(seed_id = seed.id, candidate = candidate.id(), ?side, ?halt, "Side halted");
                    frontier.halt = Some(halt);
                }
                Verdict::Skip => {
                    frontier.step_past(side, candidate.id());
                    report.skipped += 1;
                }
                Verdict::Accept => {
                    frontier.step_past(side, candidate.id());
                    report.length += candidate.chunk.len();
                    report.absorbed += 1;
                    state.absorb(candidate);
                }
            }
        }
    }
}

/// Distance priority: the smaller distance goes first, the right side on
/// ties. A known distance beats an unknown one.
fn right_goes_first(left: Option<f32>, right: Option<f32>) -> bool {
    match (left, right) {
        (Some(l), Some(r)) => r <= l,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

fn judge(
    seed: &Chunk,
    candidate: &Chunk,
    length: usize,
    budget: usize,
    state: &AccumulationState,
) -> Verdict {
    if length + candidate.len() > budget {
        return Verdict::Reject(Halt::Budget);
    }
    if candidate.source != seed.source {
        return Verdict::Reject(Halt::ForeignDocument);
    }
    if seed.is_structured()
        && candidate.is_structured()
        && !candidate.headings.sits_under(&seed.headings)
    {
        return Verdict::Reject(Halt::HeadingMismatch);
    }
    if state.contains(candidate.id) {
        return Verdict::Skip;
    }
    Verdict::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::assembler::assemble;
    use crate::context::merger::merge_runs;
    use crate::context::store::MemoryChunkStore;
    use crate::context::types::HeadingPath;
    use async_trait::async_trait;
    use crate::context::types::MetadataFilter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    /// Embeds a chunk so that its distance to the origin query is `distance`
    fn put(store: &MemoryChunkStore, chunk: Chunk, distance: f32) {
        assert_ok!(store.insert(chunk, vec![distance]));
    }

    fn text(n: usize) -> String {
        "x".repeat(n)
    }

    const QUERY: [f32; 1] = [0.0];

    async fn seed_hit(store: &MemoryChunkStore, id: i64) -> Hit {
        let scan = RangeScan::new(id, id, ScanOrder::Asc).with_distance_to(&QUERY);
        store.range_scan(&scan).await.unwrap().remove(0)
    }

    async fn bounds(store: &MemoryChunkStore) -> IdBounds {
        IdBounds::new(
            store.min_id().await.unwrap().unwrap_or(0),
            store.max_id().await.unwrap().unwrap_or(0),
        )
    }

    #[test]
    fn test_tie_prefers_right() {
        assert!(right_goes_first(Some(0.3), Some(0.3)));
        assert!(right_goes_first(Some(0.3), Some(0.1)));
        assert!(!right_goes_first(Some(0.1), Some(0.3)));
        assert!(!right_goes_first(Some(0.1), None));
        assert!(right_goes_first(None, Some(0.9)));
        assert!(right_goes_first(None, None));
    }

    #[tokio::test]
    async fn test_distance_ordered_walk_absorbs_all_neighbours() {
        let store = MemoryChunkStore::new();
        put(&store, Chunk::new(100, "doc.txt", text(50)), 0.0);
        put(&store, Chunk::new(99, "doc.txt", text(50)), 0.1);
        put(&store, Chunk::new(98, "doc.txt", text(50)), 0.3);
        put(&store, Chunk::new(97, "doc.txt", text(50)), 0.2);
        put(&store, Chunk::new(101, "doc.txt", text(50)), 0.05);
        put(&store, Chunk::new(102, "doc.txt", text(50)), 0.4);

        let seed = seed_hit(&store, 100).await;
        let mut state = AccumulationState::new();
        let expander = ContextExpander::new(&store, ExpansionPolicy::default());
        let report = expander
            .expand(&seed, &QUERY, &mut state, bounds(&store).await, 500)
            .await
            .unwrap();

        assert_eq!(report.absorbed, 5);
        assert_eq!(report.length, 300);
        assert_eq!(report.passes, 1);
        assert_eq!(report.stop, StopReason::OutOfBounds);
        assert_eq!(state.ids().iter().copied().collect::<Vec<_>>(), vec![97, 98, 99, 100, 101, 102]);
        assert_eq!(merge_runs(state.ids().iter().copied()), vec![97..=102]);
    }

    #[tokio::test]
    async fn test_tight_budget_keeps_closest_neighbours() {
        // same layout, room for the seed plus two neighbours
        let store = MemoryChunkStore::new();
        put(&store, Chunk::new(100, "doc.txt", text(50)), 0.0);
        put(&store, Chunk::new(99, "doc.txt", text(50)), 0.1);
        put(&store, Chunk::new(98, "doc.txt", text(50)), 0.3);
        put(&store, Chunk::new(101, "doc.txt", text(50)), 0.05);
        put(&store, Chunk::new(102, "doc.txt", text(50)), 0.4);

        let seed = seed_hit(&store, 100).await;
        let mut state = AccumulationState::new();
        let report = ContextExpander::new(&store, ExpansionPolicy::default())
            .expand(&seed, &QUERY, &mut state, bounds(&store).await, 150)
            .await
            .unwrap();

        assert_eq!(state.ids().iter().copied().collect::<Vec<_>>(), vec![99, 100, 101]);
        assert_eq!(report.left, Some(Halt::Budget));
        assert_eq!(report.right, Some(Halt::Budget));
        assert!(report.length <= 150);
    }

    #[tokio::test]
    async fn test_foreign_document_halts_only_that_side() {
        let store = MemoryChunkStore::new();
        put(&store, Chunk::new(98, "a.txt", text(10)), 0.5);
        put(&store, Chunk::new(99, "a.txt", text(10)), 0.5);
        put(&store, Chunk::new(100, "a.txt", text(10)), 0.0);
        put(&store, Chunk::new(101, "b.txt", text(10)), 0.01);
        put(&store, Chunk::new(102, "a.txt", text(10)), 0.01);

        let seed = seed_hit(&store, 100).await;
        let mut state = AccumulationState::new();
        let report = ContextExpander::new(&store, ExpansionPolicy::default())
            .expand(&seed, &QUERY, &mut state, bounds(&store).await, 1_000)
            .await
            .unwrap();

        assert_eq!(report.right, Some(Halt::ForeignDocument));
        assert_eq!(report.left, Some(Halt::EndOfBatch));
        assert!(!state.contains(101));
        assert!(!state.contains(102));
        assert!(state.contains(98) && state.contains(99));
    }

    #[tokio::test]
    async fn test_heading_mismatch_blocks_other_sections() {
        let install = HeadingPath::default().with_level(1, "Install");
        let linux = install.clone().with_level(2, "Linux");

        let store = MemoryChunkStore::new();
        put(&store, Chunk::new(9, "guide.md", text(5)).with_headings(install.clone()), 0.1);
        put(&store, Chunk::new(10, "guide.md", text(5)).with_headings(linux.clone()), 0.0);
        put(
            &store,
            Chunk::new(11, "guide.md", text(5)).with_headings(linux.clone().with_level(3, "Debian")),
            0.2,
        );
        put(
            &store,
            Chunk::new(12, "guide.md", text(5))
                .with_headings(install.clone().with_level(2, "Windows")),
            0.2,
        );

        let seed = seed_hit(&store, 10).await;
        let mut state = AccumulationState::new();
        let report = ContextExpander::new(&store, ExpansionPolicy::default())
            .expand(&seed, &QUERY, &mut state, bounds(&store).await, 1_000)
            .await
            .unwrap();

        // 9 lacks level 2, 12 has a different level 2
        assert_eq!(state.ids().iter().copied().collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(report.left, Some(Halt::HeadingMismatch));
        assert_eq!(report.right, Some(Halt::HeadingMismatch));
    }

    #[tokio::test]
    async fn test_headings_ignored_for_plain_sources() {
        let store = MemoryChunkStore::new();
        let a = HeadingPath::default().with_level(1, "A");
        let b = HeadingPath::default().with_level(1, "B");
        put(&store, Chunk::new(1, "notes.txt", text(5)).with_headings(a), 0.0);
        put(&store, Chunk::new(2, "notes.txt", text(5)).with_headings(b), 0.1);

        let seed = seed_hit(&store, 1).await;
        let mut state = AccumulationState::new();
        ContextExpander::new(&store, ExpansionPolicy::default())
            .expand(&seed, &QUERY, &mut state, bounds(&store).await, 1_000)
            .await
            .unwrap();

        assert!(state.contains(2));
    }

    #[tokio::test]
    async fn test_widening_crosses_pass_boundaries() {
        // 40 consecutive chunks: the first pass covers 10 on each side
        let store = MemoryChunkStore::new();
        for id in 1..=40 {
            put(&store, Chunk::new(id, "long.txt", text(10)), id as f32 * 0.01);
        }

        let seed = seed_hit(&store, 20).await;
        let mut state = AccumulationState::new();
        let report = ContextExpander::new(&store, ExpansionPolicy::default())
            .expand(&seed, &QUERY, &mut state, bounds(&store).await, 10_000)
            .await
            .unwrap();

        assert_eq!(state.len(), 40);
        assert_eq!(report.passes, 2);
        assert_eq!(report.stop, StopReason::OutOfBounds);
    }

    #[tokio::test]
    async fn test_pass_limit_bounds_work() {
        let store = MemoryChunkStore::new();
        for id in 1..=200 {
            put(&store, Chunk::new(id, "long.txt", text(1)), 0.5);
        }

        let policy = ExpansionPolicy {
            initial_half_width: 2,
            width_step: 2,
            max_passes: 3,
        };
        let seed = seed_hit(&store, 100).await;
        let mut state = AccumulationState::new();
        let report = ContextExpander::new(&store, policy)
            .expand(&seed, &QUERY, &mut state, bounds(&store).await, 10_000)
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::PassLimit);
        assert_eq!(report.passes, 3);
        assert_eq!(merge_runs(state.ids().iter().copied()), vec![94..=106]);
    }

    #[tokio::test]
    async fn test_seed_over_budget_stays_alone() {
        let store = MemoryChunkStore::new();
        put(&store, Chunk::new(1, "a.txt", text(5)), 0.1);
        put(&store, Chunk::new(2, "a.txt", text(80)), 0.0);

        let seed = seed_hit(&store, 2).await;
        let mut state = AccumulationState::new();
        let report = ContextExpander::new(&store, ExpansionPolicy::default())
            .expand(&seed, &QUERY, &mut state, bounds(&store).await, 50)
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::SeedOverBudget);
        assert_eq!(report.passes, 0);
        assert_eq!(state.len(), 1);

        let docs = assemble(&merge_runs(state.ids().iter().copied()), &state);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text.len(), 80);
    }

    #[tokio::test]
    async fn test_overlapping_seeds_skip_without_recounting() {
        let store = MemoryChunkStore::new();
        for id in 48..=57 {
            put(&store, Chunk::new(id, "a.txt", text(10)), 0.3);
        }
        put(&store, Chunk::new(50, "a.txt", text(10)), 0.1);
        put(&store, Chunk::new(55, "a.txt", text(10)), 0.2);

        let b = bounds(&store).await;
        let mut state = AccumulationState::new();
        let expander = ContextExpander::new(&store, ExpansionPolicy::default());

        let first = seed_hit(&store, 50).await;
        expander.expand(&first, &QUERY, &mut state, b, 60).await.unwrap();
        let absorbed_by_first = state.len();

        let second = seed_hit(&store, 55).await;
        let report = expander.expand(&second, &QUERY, &mut state, b, 60).await.unwrap();

        assert_eq!(absorbed_by_first, 6);
        assert!(report.skipped > 0);
        assert!(report.length <= 60);

        let runs = merge_runs(state.ids().iter().copied());
        assert_eq!(runs.len(), 1);
        let docs = assemble(&runs, &state);
        assert_eq!(docs[0].score, 0.1);
        assert_eq!(docs[0].seed_ids, vec![50, 55]);
    }

    #[tokio::test]
    async fn test_budget_never_exceeded_across_random_layouts() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..25 {
            let store = MemoryChunkStore::new();
            for id in 1..=80 {
                let source = if rng.gen_bool(0.1) { "other.txt" } else { "main.txt" };
                let len = rng.gen_range(1..40);
                put(&store, Chunk::new(id, source, text(len)), rng.gen_range(0.0..1.0));
            }
            let budget = rng.gen_range(50..400);
            let seed_id = rng.gen_range(1..=80);
            let seed = seed_hit(&store, seed_id).await;

            let mut state = AccumulationState::new();
            let report = ContextExpander::new(&store, ExpansionPolicy::default())
                .expand(&seed, &QUERY, &mut state, bounds(&store).await, budget)
                .await
                .unwrap();

            let total: usize = state.ids().iter().filter_map(|id| state.get(*id)).map(|h| h.chunk.len()).sum();
            assert_eq!(total, report.length);
            assert!(report.length <= budget.max(seed.chunk.len()));

            // absorbed chunks form one run from the seed's own document
            let runs = merge_runs(state.ids().iter().copied());
            assert_eq!(runs.len(), 1);
            assert!(state
                .ids()
                .iter()
                .filter_map(|id| state.get(*id))
                .all(|h| h.chunk.source == seed.chunk.source));
        }
    }

    #[tokio::test]
    async fn test_shared_state_documents_keep_a_single_source() {
        use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..25 {
            // back-to-back documents of 3..12 chunks each
            let store = MemoryChunkStore::new();
            let mut id = 1;
            let mut doc = 0;
            while id <= 80 {
                let size = rng.gen_range(3..12);
                for _ in 0..size {
                    let len = rng.gen_range(1..40);
                    put(&store, Chunk::new(id, format!("doc{doc}.txt"), text(len)), rng.gen_range(0.0..1.0));
                    id += 1;
                }
                doc += 1;
            }
            let last = id - 1;
            let budget = rng.gen_range(50..400);
            let seed_count = rng.gen_range(2..=4);
            let ids: Vec<i64> = (1..=last).collect();
            let seed_ids: Vec<i64> = ids.choose_multiple(&mut rng, seed_count).copied().collect();

            let mut state = AccumulationState::new();
            let expander = ContextExpander::new(&store, ExpansionPolicy::default());
            let id_bounds = bounds(&store).await;
            for seed_id in &seed_ids {
                let seed = seed_hit(&store, *seed_id).await;
                let report = expander
                    .expand(&seed, &QUERY, &mut state, id_bounds, budget)
                    .await
                    .unwrap();
                assert!(report.length <= budget.max(seed.chunk.len()));
            }

            let docs = assemble(&merge_runs(state.ids().iter().copied()), &state);
            let mut covered = Vec::new();
            for doc in &docs {
                for id in doc.first_id..=doc.last_id {
                    let hit = state.get(id).unwrap();
                    assert_eq!(hit.chunk.source, doc.source, "id {id} in {}", doc.source);
                    covered.push(id);
                }
            }
            covered.sort_unstable();
            let absorbed: Vec<i64> = state.ids().iter().copied().collect();
            assert_eq!(covered, absorbed);
        }
    }

    /// Fails every range read after the first `allowed`
    struct FlakyStore {
        inner: MemoryChunkStore,
        allowed: usize,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ChunkStore for FlakyStore {
        async fn knn(&self, query: &[f32], k: usize, filter: &MetadataFilter) -> Result<Vec<Hit>> {
            self.inner.knn(query, k, filter).await
        }

        async fn range_scan(&self, scan: &RangeScan<'_>) -> Result<Vec<Hit>> {
            if self.reads.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(AppError::StoreUnavailable {
                    message: "connection reset".into(),
                });
            }
            self.inner.range_scan(scan).await
        }

        async fn min_id(&self) -> Result<Option<i64>> {
            self.inner.min_id().await
        }

        async fn max_id(&self) -> Result<Option<i64>> {
            self.inner.max_id().await
        }
    }

    #[tokio::test]
    async fn test_read_failure_keeps_seed() {
        let inner = MemoryChunkStore::new();
        put(&inner, Chunk::new(5, "a.txt", text(5)), 0.0);
        put(&inner, Chunk::new(6, "a.txt", text(5)), 0.1);
        let seed = seed_hit(&inner, 5).await;
        let b = bounds(&inner).await;

        let store = FlakyStore {
            inner,
            allowed: 0,
            reads: AtomicUsize::new(0),
        };
        let mut state = AccumulationState::new();
        let result = ContextExpander::new(&store, ExpansionPolicy::default())
            .expand(&seed, &QUERY, &mut state, b, 100)
            .await;

        let err = assert_err!(result);
        assert!(matches!(err, AppError::SeedExpansionFailed { seed_id: 5, .. }));
        assert_eq!(state.ids().iter().copied().collect::<Vec<_>>(), vec![5]);
    }
}
