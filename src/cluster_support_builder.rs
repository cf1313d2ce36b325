use log::debug;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::containers::{AlignmentStore, GenomicInterval, ReadPair};

/// Given a candidate interval, find every read pair in the full input with at least one
/// read overlapping it, regardless of SV tags or quality. Pairs are returned once each,
/// in load order.
pub fn supporting_read_pairs(
    interval: &GenomicInterval,
    store: &AlignmentStore,
) -> Vec<Arc<ReadPair>> {
    let support: Vec<Arc<ReadPair>> = store
        .overlapping_pair_indices(interval)
        .into_iter()
        .map(|idx| Arc::clone(store.pair(idx)))
        .collect();
    debug!("{} (support={})", interval, support.len());
    support
}

/// Union of the supporting read pairs of several intervals, e.g. the two sides
/// of an interchromosomal candidate
pub fn supporting_read_pairs_for_all(
    intervals: &[&GenomicInterval],
    store: &AlignmentStore,
) -> Vec<Arc<ReadPair>> {
    let mut pair_indices = BTreeSet::new();
    for interval in intervals.iter() {
        pair_indices.extend(store.overlapping_pair_indices(interval));
    }
    pair_indices
        .into_iter()
        .map(|idx| Arc::clone(store.pair(idx)))
        .collect()
}
