use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::containers::{CandidateInterval, CaptureRegions, ContigTable, GenomicInterval, ReadPair};

/// Sparse read depth along one contig, stored as depth changes at read starts and ends
#[derive(Debug, Default, Clone)]
pub struct CoverageCounter {
    deltas: BTreeMap<i64, i64>,
}

impl CoverageCounter {
    /// Count every position of the footprint `[start, end)`
    pub fn add_footprint(&mut self, start: i64, end: i64) {
        if end <= start {
            return;
        }
        *self.deltas.entry(start).or_insert(0) += 1;
        *self.deltas.entry(end).or_insert(0) -= 1;
    }

    /// Piecewise-constant depth as `(start, end, depth)` segments of non-zero depth
    pub fn segments(&self) -> Vec<(i64, i64, u32)> {
        let mut segments = Vec::new();
        let mut depth: i64 = 0;
        let mut segment_start = 0;
        for (pos, delta) in self.deltas.iter() {
            if depth > 0 && *pos > segment_start {
                segments.push((segment_start, *pos, depth as u32));
            }
            depth += delta;
            segment_start = *pos;
        }
        segments
    }

    /// Depth at each position of the interval
    pub fn depth_profile(&self, interval: &GenomicInterval) -> Vec<u32> {
        if interval.is_empty() {
            return Vec::new();
        }
        let mut depth: i64 = self
            .deltas
            .range(..=interval.start)
            .map(|(_, delta)| delta)
            .sum();
        let mut changes = self.deltas.range(interval.start + 1..interval.end).peekable();
        let mut profile = Vec::with_capacity(interval.len() as usize);
        for pos in interval.start..interval.end {
            while let Some((change_pos, delta)) = changes.peek() {
                if **change_pos > pos {
                    break;
                }
                depth += **delta;
                changes.next();
            }
            profile.push(depth.max(0) as u32);
        }
        profile
    }
}

/// Build a counter from every read of the given pairs that lies on `chrom`
pub fn coverage_from_reads(chrom: &str, pairs: &[Arc<ReadPair>]) -> CoverageCounter {
    let mut counter = CoverageCounter::default();
    for pair in pairs.iter() {
        for read in pair.reads() {
            if read.chrom == chrom {
                counter.add_footprint(read.pos, read.end);
            }
        }
    }
    counter
}

/// Maximal runs of positions with depth at least `min_depth`, kept when at least
/// `min_len` long after clamping to the contig
pub fn qualifying_runs(
    counter: &CoverageCounter,
    chrom: &str,
    min_depth: u32,
    min_len: i64,
    contigs: &ContigTable,
) -> Vec<GenomicInterval> {
    let mut raw_runs: Vec<(i64, i64)> = Vec::new();
    for (start, end, depth) in counter.segments() {
        if depth < min_depth {
            continue;
        }
        match raw_runs.last_mut() {
            Some(last) if last.1 == start => last.1 = end,
            _ => raw_runs.push((start, end)),
        }
    }
    let contig_end = contigs.length(chrom).map(|len| len as i64);
    raw_runs
        .into_iter()
        .map(|(start, end)| {
            let end = match contig_end {
                Some(contig_end) => end.min(contig_end),
                None => end,
            };
            GenomicInterval::new(chrom.to_string(), start.max(0), end)
        })
        .filter(|run| run.len() >= min_len)
        .collect()
}

/// Clip runs to the capture regions, dropping pieces shorter than `min_len`
pub fn clip_to_capture(
    runs: &[GenomicInterval],
    capture: &CaptureRegions,
    min_len: i64,
) -> Vec<GenomicInterval> {
    runs.iter()
        .flat_map(|run| capture.clip(run))
        .filter(|piece| piece.len() >= min_len)
        .collect()
}

fn to_candidates(
    regions: Vec<GenomicInterval>,
    counter: &CoverageCounter,
) -> Vec<CandidateInterval> {
    regions
        .into_iter()
        .map(|region| {
            let profile = counter.depth_profile(&region);
            CandidateInterval::new(region, profile)
        })
        .collect()
}

/// Union overlapping intervals of one contig, returning disjoint intervals in ascending order
fn union_intervals(mut intervals: Vec<GenomicInterval>) -> Vec<GenomicInterval> {
    intervals.sort();
    let mut unioned: Vec<GenomicInterval> = Vec::new();
    for interval in intervals {
        match unioned.last_mut() {
            Some(last) if interval.start < last.end => last.end = last.end.max(interval.end),
            _ => unioned.push(interval),
        }
    }
    unioned
}

/// Candidate breakpoint intervals on one contig from insert size clusters.
/// Each cluster is piled up on its own; the qualifying, capture-clipped runs of all
/// clusters are then unioned. Depth profiles report the combined coverage of all clusters.
pub fn pileup_clusters_by_pos(
    clusters: &[Vec<Arc<ReadPair>>],
    chrom: &str,
    min_clust_depth: u32,
    min_pileup_len: i64,
    capture: &CaptureRegions,
    contigs: &ContigTable,
) -> Vec<CandidateInterval> {
    let mut regions = Vec::new();
    let mut combined = CoverageCounter::default();
    for cluster in clusters.iter() {
        let counter = coverage_from_reads(chrom, cluster);
        for read in cluster.iter().flat_map(|pair| pair.reads()) {
            if read.chrom == chrom {
                combined.add_footprint(read.pos, read.end);
            }
        }
        let runs = qualifying_runs(&counter, chrom, min_clust_depth, min_pileup_len, contigs);
        regions.extend(clip_to_capture(&runs, capture, min_pileup_len));
    }
    let candidates = to_candidates(union_intervals(regions), &combined);
    debug!("{} candidate intervals on {}", candidates.len(), chrom);
    for candidate in candidates.iter() {
        debug!("{}", candidate);
    }
    candidates
}

/// Candidate interval pairs for two contigs joined by mate-on-different-contig read pairs.
/// Capture regions are widened by `bed_dist`. Intervals are piled up separately on each
/// contig and an interval on the first contig is paired with each interval on the second
/// that at least one read pair links to it.
pub fn pileup_mate_contigs(
    pairs: &[Arc<ReadPair>],
    contig_pair: (&str, &str),
    min_clust_depth: u32,
    min_pileup_len: i64,
    capture: &CaptureRegions,
    bed_dist: i64,
    contigs: &ContigTable,
) -> Vec<(CandidateInterval, CandidateInterval)> {
    let padded_capture = capture.padded(bed_dist);
    let per_contig = |chrom: &str| -> Vec<CandidateInterval> {
        let counter = coverage_from_reads(chrom, pairs);
        let runs = qualifying_runs(&counter, chrom, min_clust_depth, min_pileup_len, contigs);
        let regions = union_intervals(clip_to_capture(&runs, &padded_capture, min_pileup_len));
        to_candidates(regions, &counter)
    };
    let (first_chrom, second_chrom) = contig_pair;
    let first_candidates = per_contig(first_chrom);
    let second_candidates = per_contig(second_chrom);

    let mut linked = Vec::new();
    for first in first_candidates.iter() {
        for second in second_candidates.iter() {
            if pairs
                .iter()
                .any(|pair| pair.links(&first.region, &second.region))
            {
                linked.push((first.clone(), second.clone()));
            }
        }
    }
    debug!(
        "{} linked candidate interval pairs for {}/{}",
        linked.len(),
        first_chrom,
        second_chrom
    );
    linked
}
