//! Document assembly
//!
//! Turns each run of consecutive ids into one scored document. Windows of
//! neighbouring documents can touch, so a run is first cut wherever the
//! source document changes.

use super::state::AccumulationState;
use super::types::{Hit, ResultDocument};
use std::ops::RangeInclusive;

/// Build one document per single-source stretch of each run, most relevant
/// (lowest score) first.
///
/// Texts are concatenated in ascending id order without separators. The
/// score is the smallest known distance in the run; a run with no known
/// distance borrows the one nearest to it in the state.
pub fn assemble(runs: &[RangeInclusive<i64>], state: &AccumulationState) -> Vec<ResultDocument> {
    let mut documents: Vec<ResultDocument> = runs
        .iter()
        .flat_map(|run| split_by_source(run, state))
        .filter_map(|run| assemble_run(&run, state))
        .collect();

    documents.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.first_id.cmp(&b.first_id))
    });
    documents
}

/// Cut `run` at every id whose source differs from the previous id's
fn split_by_source(run: &RangeInclusive<i64>, state: &AccumulationState) -> Vec<RangeInclusive<i64>> {
    let mut pieces = Vec::new();
    let mut current: Option<(i64, i64, &str)> = None;

    for hit in run.clone().filter_map(|id| state.get(id)) {
        let source = hit.chunk.source.as_str();
        current = match current {
            Some((start, _, open)) if open == source => Some((start, hit.id(), open)),
            Some((start, end, _)) => {
                pieces.push(start..=end);
                Some((hit.id(), hit.id(), source))
            }
            None => Some((hit.id(), hit.id(), source)),
        };
    }
    if let Some((start, end, _)) = current {
        pieces.push(start..=end);
    }
    pieces
}

fn assemble_run(run: &RangeInclusive<i64>, state: &AccumulationState) -> Option<ResultDocument> {
    let hits: Vec<&Hit> = run.clone().filter_map(|id| state.get(id)).collect();
    let first = *hits.first()?;
    let last = *hits.last()?;

    let best = hits
        .iter()
        .filter_map(|hit| hit.distance.map(|d| (d, *hit)))
        .min_by(|(a, _), (b, _)| a.total_cmp(b));

    let (score, representative) = match best {
        Some((distance, hit)) => (distance, hit),
        None => (
            state.nearest_known_distance(run).unwrap_or(f32::MAX),
            first,
        ),
    };

    let text: String = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
    let seed_ids = hits
        .iter()
        .map(|hit| hit.id())
        .filter(|id| state.is_seed(*id))
        .collect();

    Some(ResultDocument {
        text,
        score,
        source: first.chunk.source.clone(),
        url: representative
            .chunk
            .url
            .clone()
            .or_else(|| hits.iter().find_map(|hit| hit.chunk.url.clone())),
        first_id: first.id(),
        last_id: last.id(),
        seed_ids,
        metadata: representative.chunk.metadata.clone(),
    })
}
