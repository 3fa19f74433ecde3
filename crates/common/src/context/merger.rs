//! Id-sequence merging
//!
//! Splits the absorbed id set into maximal runs of consecutive ids so that
//! windows from different seeds that touch or overlap become one excerpt.

use std::ops::RangeInclusive;

/// Partition `ids` into maximal runs of consecutive integers, ascending.
pub fn merge_runs<I>(ids: I) -> Vec<RangeInclusive<i64>>
where
    I: IntoIterator<Item = i64>,
{
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut runs = Vec::new();
    let mut iter = ids.into_iter();
    let Some(first) = iter.next() else {
        return runs;
    };

    let (mut start, mut end) = (first, first);
    for id in iter {
        if end.checked_add(1) == Some(id) {
            end = id;
        } else {
            runs.push(start..=end);
            start = id;
            end = id;
        }
    }
    runs.push(start..=end);

    runs
}
