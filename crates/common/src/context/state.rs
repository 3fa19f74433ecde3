//! Per-query accumulation of absorbed chunks

use super::types::Hit;
use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;

/// Chunks absorbed while expanding the seeds of one query.
///
/// Every id in the set has a matching entry. The state only grows while
/// seeds are expanded, except for [`rollback`](Self::rollback) of a seed
/// that did not finish, and is consumed once by the assembler.
#[derive(Debug, Default)]
pub struct AccumulationState {
    ids: BTreeSet<i64>,
    entries: HashMap<i64, Hit>,
    seeds: BTreeSet<i64>,
    /// Newly inserted ids and newly flagged seeds, in insertion order
    inserted: Vec<i64>,
    flagged: Vec<i64>,
}

/// Position in the state's insertion history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    inserted: usize,
    flagged: usize,
}

impl AccumulationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a seed. An entry absorbed earlier as another seed's neighbour
    /// is kept as is.
    pub fn record_seed(&mut self, hit: &Hit) {
        if self.seeds.insert(hit.id()) {
            self.flagged.push(hit.id());
        }
        if !self.ids.contains(&hit.id()) {
            self.absorb(hit.clone());
        }
    }

    /// Insert a neighbour; returns false if the id was already present
    pub fn absorb(&mut self, hit: Hit) -> bool {
        let id = hit.id();
        if !self.ids.insert(id) {
            return false;
        }
        self.entries.insert(id, hit);
        self.inserted.push(id);
        true
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            inserted: self.inserted.len(),
            flagged: self.flagged.len(),
        }
    }

    /// Forget every insertion and seed made after `checkpoint`
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        for id in self.inserted.drain(checkpoint.inserted.min(self.inserted.len())..) {
            self.ids.remove(&id);
            self.entries.remove(&id);
        }
        for id in self.flagged.drain(checkpoint.flagged.min(self.flagged.len())..) {
            self.seeds.remove(&id);
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn get(&self, id: i64) -> Option<&Hit> {
        self.entries.get(&id)
    }

    pub fn is_seed(&self, id: i64) -> bool {
        self.seeds.contains(&id)
    }

    /// Absorbed ids in ascending order
    pub fn ids(&self) -> &BTreeSet<i64> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn seed_count(&self) -> usize {
        self.seeds.len()
    }

    /// Known distance of the entry closest (by id) to `run`, lower id on ties
    pub fn nearest_known_distance(&self, run: &RangeInclusive<i64>) -> Option<f32> {
        self.entries
            .values()
            .filter_map(|hit| hit.distance.map(|d| (hit.id(), d)))
            .min_by_key(|(id, _)| (gap_to(run, *id), *id))
            .map(|(_, distance)| distance)
    }
}

fn gap_to(run: &RangeInclusive<i64>, id: i64) -> u64 {
    if id < *run.start() {
        run.start().abs_diff(id)
    } else if id > *run.end() {
        id.abs_diff(*run.end())
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::types::Chunk;

    fn hit(id: i64, distance: Option<f32>) -> Hit {
        Hit {
            chunk: Chunk::new(id, "doc.txt", format!("chunk {id}")),
            distance,
        }
    }

    #[test]
    fn test_record_seed_is_idempotent() {
        let mut state = AccumulationState::new();
        state.record_seed(&hit(5, Some(0.2)));
        state.record_seed(&hit(5, Some(0.2)));

        assert_eq!(state.len(), 1);
        assert_eq!(state.seed_count(), 1);
        assert!(state.is_seed(5));
    }

    #[test]
    fn test_absorb_keeps_first_entry() {
        let mut state = AccumulationState::new();
        assert!(state.absorb(hit(7, Some(0.4))));
        assert!(!state.absorb(hit(7, Some(0.1))));

        assert_eq!(state.get(7).and_then(|h| h.distance), Some(0.4));
        assert!(!state.is_seed(7));
    }

    #[test]
    fn test_seed_over_existing_neighbour() {
        let mut state = AccumulationState::new();
        state.absorb(hit(3, Some(0.5)));
        state.record_seed(&hit(3, Some(0.5)));

        assert_eq!(state.len(), 1);
        assert!(state.is_seed(3));
    }

    #[test]
    fn test_rollback_restores_checkpoint() {
        let mut state = AccumulationState::new();
        state.record_seed(&hit(10, Some(0.1)));
        state.absorb(hit(11, Some(0.4)));
        let checkpoint = state.checkpoint();

        state.record_seed(&hit(11, Some(0.4)));
        state.record_seed(&hit(20, Some(0.2)));
        state.absorb(hit(21, Some(0.3)));
        assert!(!state.absorb(hit(10, Some(0.9))));

        state.rollback(checkpoint);
        assert_eq!(state.ids().iter().copied().collect::<Vec<_>>(), vec![10, 11]);
        assert!(state.get(21).is_none());
        assert!(state.is_seed(10));
        assert!(!state.is_seed(11));
        assert_eq!(state.seed_count(), 1);
        assert_eq!(state.checkpoint(), checkpoint);
    }

    #[test]
    fn test_nearest_known_distance() {
        let mut state = AccumulationState::new();
        state.absorb(hit(1, Some(0.9)));
        state.absorb(hit(10, None));
        state.absorb(hit(11, None));
        state.absorb(hit(14, Some(0.3)));
        state.absorb(hit(7, Some(0.6)));

        // 7 is three away from the run start, 14 three past its end: lower id wins
        assert_eq!(state.nearest_known_distance(&(10..=11)), Some(0.6));
        assert_eq!(state.nearest_known_distance(&(13..=13)), Some(0.3));

        let empty = AccumulationState::new();
        assert_eq!(empty.nearest_known_distance(&(1..=2)), None);
    }
}
