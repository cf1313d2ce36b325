use log::debug;
use std::sync::Arc;

use crate::containers::ReadPair;

/// Group read pairs from a single contig into clusters of similar insert size.
/// Pairs are ordered by insert size (ties broken by read1 position, then name) and
/// walked linearly; a new cluster begins whenever the insert size gap to the previous
/// pair is larger than `ins_distance`. Each returned cluster is a maximal chain.
pub fn cluster_by_insert_size(
    pairs: &[Arc<ReadPair>],
    ins_distance: i64,
) -> Vec<Vec<Arc<ReadPair>>> {
    let mut sorted_pairs: Vec<&Arc<ReadPair>> = pairs.iter().collect();
    sorted_pairs.sort_by(|a, b| {
        a.insert_size
            .cmp(&b.insert_size)
            .then_with(|| a.read1.pos.cmp(&b.read1.pos))
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut clusters = Vec::new();
    let mut begin_iter: usize = 0;
    for end_iter in 1..sorted_pairs.len() {
        let gap = sorted_pairs[end_iter].insert_size - sorted_pairs[end_iter - 1].insert_size;
        // the chain breaks here, store the cluster and move on
        if gap > ins_distance {
            clusters.push(collect_cluster(&sorted_pairs[begin_iter..end_iter]));
            begin_iter = end_iter;
        }
    }
    if !sorted_pairs.is_empty() {
        // add the last cluster
        clusters.push(collect_cluster(&sorted_pairs[begin_iter..]));
    }

    for cluster in clusters.iter() {
        if let (Some(first), Some(last)) = (cluster.first(), cluster.last()) {
            debug!(
                "Insert size cluster {}-{} (support={})",
                first.insert_size,
                last.insert_size,
                cluster.len()
            );
        }
    }
    clusters
}

fn collect_cluster(sorted_pairs: &[&Arc<ReadPair>]) -> Vec<Arc<ReadPair>> {
    sorted_pairs.iter().map(|pair| Arc::clone(pair)).collect()
}
