use log::debug;
use std::sync::Arc;

use crate::containers::{
    CandidateInterval, CaptureRegions, ContigTable, GenomicInterval, PutativeLocus,
    RearrangementType, ReadPair,
};
use crate::pileup::{clip_to_capture, coverage_from_reads, qualifying_runs};
use crate::translocation_caller::CallerSettings;

/// Join neighbouring intervals of one contig whose gap is smaller than `merge_dist`.
/// Re-merging the output returns it unchanged.
pub fn merge_intervals(
    mut intervals: Vec<GenomicInterval>,
    merge_dist: i64,
) -> Vec<GenomicInterval> {
    intervals.sort();
    let mut merged: Vec<GenomicInterval> = Vec::new();
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if last.chrom == interval.chrom && interval.start - last.end < merge_dist => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Rebuild candidate intervals on one contig from the supporting read pairs:
/// qualifying runs, clipped to capture and merged, with depth profiles over the merged spans
pub fn intervals_from_pairs(
    pairs: &[Arc<ReadPair>],
    chrom: &str,
    min_depth: u32,
    min_len: i64,
    merge_dist: i64,
    capture: &CaptureRegions,
    contigs: &ContigTable,
) -> Vec<CandidateInterval> {
    let counter = coverage_from_reads(chrom, pairs);
    let runs = qualifying_runs(&counter, chrom, min_depth, min_len, contigs);
    let clipped = clip_to_capture(&runs, capture, min_len);
    merge_intervals(clipped, merge_dist)
        .into_iter()
        .map(|region| {
            let profile = counter.depth_profile(&region);
            CandidateInterval::new(region, profile)
        })
        .collect()
}

/// Assemble an intrachromosomal locus on `chrom` from the read pairs supporting a candidate
pub fn assemble_intrachromosomal_locus(
    pairs: Vec<Arc<ReadPair>>,
    chrom: &str,
    settings: &CallerSettings,
    capture: &CaptureRegions,
    contigs: &ContigTable,
    source: &str,
) -> PutativeLocus {
    let intervals = intervals_from_pairs(
        &pairs,
        chrom,
        settings.min_clust_depth,
        settings.min_pileup_len,
        settings.merge_dist,
        capture,
        contigs,
    );
    let mut locus = PutativeLocus {
        rearrangement: RearrangementType::Intrachromosomal,
        contigs: vec![chrom.to_string()],
        interval_lists: vec![intervals],
        read_pairs: pairs,
        source: source.to_string(),
        nsegments: 0,
        primary: None,
        partners: Vec::new(),
        num_partners: 0,
        tdist: None,
    };
    summarize_evidence(&mut locus);
    locus
}

/// Assemble an interchromosomal locus with one interval list per contig of the pair.
/// `capture` should already be padded the way the mate-contig pileup padded it.
pub fn assemble_interchromosomal_locus(
    pairs: Vec<Arc<ReadPair>>,
    contig_pair: (&str, &str),
    settings: &CallerSettings,
    capture: &CaptureRegions,
    contigs: &ContigTable,
    source: &str,
) -> PutativeLocus {
    let (first_chrom, second_chrom) = contig_pair;
    let interval_lists = [first_chrom, second_chrom]
        .iter()
        .map(|chrom| {
            intervals_from_pairs(
                &pairs,
                chrom,
                settings.min_clust_depth,
                settings.min_pileup_len,
                settings.merge_dist,
                capture,
                contigs,
            )
        })
        .collect();
    let mut locus = PutativeLocus {
        rearrangement: RearrangementType::Interchromosomal,
        contigs: vec![first_chrom.to_string(), second_chrom.to_string()],
        interval_lists,
        read_pairs: pairs,
        source: source.to_string(),
        nsegments: 0,
        primary: None,
        partners: Vec::new(),
        num_partners: 0,
        tdist: None,
    };
    summarize_evidence(&mut locus);
    locus
}

/// Fill in segment count, primary interval, partners and breakpoint distance of a locus.
///
/// The primary interval is the interval of the first list overlapped by the most pairs,
/// the earliest one on ties. Partners are intervals linked to the primary by a read pair:
/// other intervals of the same list for intrachromosomal loci, intervals of the second
/// list for interchromosomal loci.
fn summarize_evidence(locus: &mut PutativeLocus) {
    let regions: Vec<&GenomicInterval> = locus.intervals().map(|c| &c.region).collect();
    locus.nsegments = locus
        .read_pairs
        .iter()
        .filter(|pair| regions.iter().any(|region| pair.overlaps(region)))
        .count();

    let first_list: Vec<&GenomicInterval> = match locus.interval_lists.first() {
        Some(list) => list.iter().map(|c| &c.region).collect(),
        None => Vec::new(),
    };
    let mut primary: Option<(&GenomicInterval, usize)> = None;
    for region in first_list.iter() {
        let count = locus
            .read_pairs
            .iter()
            .filter(|pair| pair.overlaps(region))
            .count();
        match primary {
            Some((_, best_count)) if count <= best_count => {}
            _ => primary = Some((*region, count)),
        }
    }
    let primary = match primary {
        Some((region, _)) => region.clone(),
        None => {
            debug!("No intervals left for locus on {}", locus.contigs.join("/"));
            return;
        }
    };

    let partner_pool: Vec<&GenomicInterval> = match locus.rearrangement {
        RearrangementType::Intrachromosomal => first_list
            .iter()
            .filter(|region| ***region != primary)
            .copied()
            .collect(),
        RearrangementType::Interchromosomal => match locus.interval_lists.get(1) {
            Some(list) => list.iter().map(|c| &c.region).collect(),
            None => Vec::new(),
        },
    };
    let partners: Vec<GenomicInterval> = partner_pool
        .into_iter()
        .filter(|partner| {
            locus
                .read_pairs
                .iter()
                .any(|pair| pair.links(&primary, partner))
        })
        .cloned()
        .collect();

    locus.tdist = match locus.rearrangement {
        RearrangementType::Intrachromosomal => Some(
            partners
                .iter()
                .map(|partner| (partner.start - primary.start).abs())
                .max()
                .unwrap_or(0),
        ),
        RearrangementType::Interchromosomal => None,
    };
    locus.num_partners = partners.len();
    locus.partners = partners;
    locus.primary = Some(primary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::create_test_pair;

    fn interval(chrom: &str, start: i64, end: i64) -> GenomicInterval {
        GenomicInterval::new(chrom.to_string(), start, end)
    }

    fn contigs() -> ContigTable {
        ContigTable::new(vec![
            ("chr1".to_string(), 200_000),
            ("chr2".to_string(), 200_000),
        ])
    }

    fn settings() -> CallerSettings {
        CallerSettings {
            min_clust_depth: 2,
            ..CallerSettings::default()
        }
    }

    #[test]
    fn test_merge_intervals() {
        let merged = merge_intervals(
            vec![
                interval("chr1", 600, 700),
                interval("chr1", 100, 200),
                interval("chr1", 349, 400),
                interval("chr1", 850, 900),
                interval("chr2", 100, 200),
            ],
            150,
        );
        // gap 200-349 is 149 and merges; gap 700-850 is exactly 150 and does not
        assert_eq!(
            merged,
            vec![
                interval("chr1", 100, 400),
                interval("chr1", 600, 700),
                interval("chr1", 850, 900),
                interval("chr2", 100, 200),
            ]
        );
    }

    #[test]
    fn test_merge_intervals_fixed_point() {
        let inputs = vec![
            interval("chr1", 0, 10),
            interval("chr1", 100, 120),
            interval("chr1", 260, 270),
            interval("chr1", 265, 400),
            interval("chr1", 900, 950),
        ];
        let once = merge_intervals(inputs, 150);
        let twice = merge_intervals(once.clone(), 150);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_intrachromosomal_locus_with_partner() {
        let pairs: Vec<Arc<ReadPair>> = vec![
            Arc::new(create_test_pair("a", "chr1", 1000, "chr1", 61000, 50, "LI")),
            Arc::new(create_test_pair("b", "chr1", 1010, "chr1", 61010, 50, "LI")),
            Arc::new(create_test_pair("c", "chr1", 1020, "chr1", 1400, 50, "NF")),
        ];
        let capture = CaptureRegions::from_intervals(vec![
            interval("chr1", 900, 1100),
            interval("chr1", 60900, 61200),
        ]);
        let locus =
            assemble_intrachromosomal_locus(pairs, "chr1", &settings(), &capture, &contigs(), "s.bam");
        assert_eq!(locus.rearrangement, RearrangementType::Intrachromosomal);
        assert_eq!(locus.interval_lists.len(), 1);
        let regions: Vec<&GenomicInterval> = locus.intervals().map(|c| &c.region).collect();
        assert_eq!(
            regions,
            vec![&interval("chr1", 1010, 1060), &interval("chr1", 61010, 61050)]
        );
        assert_eq!(locus.nsegments, 3);
        assert_eq!(locus.primary, Some(interval("chr1", 1010, 1060)));
        assert_eq!(locus.partners, vec![interval("chr1", 61010, 61050)]);
        assert_eq!(locus.num_partners, 1);
        assert_eq!(locus.tdist, Some(60000));
    }

    #[test]
    fn test_locus_without_partners() {
        let pairs: Vec<Arc<ReadPair>> = vec![
            Arc::new(create_test_pair("a", "chr1", 1000, "chr1", 61000, 50, "LI")),
            Arc::new(create_test_pair("b", "chr1", 1010, "chr1", 61010, 50, "LI")),
        ];
        let capture = CaptureRegions::from_intervals(vec![interval("chr1", 900, 1100)]);
        let locus =
            assemble_intrachromosomal_locus(pairs, "chr1", &settings(), &capture, &contigs(), "s.bam");
        assert_eq!(locus.nsegments, 2);
        assert_eq!(locus.num_partners, 0);
        assert_eq!(locus.tdist, Some(0));
    }

    #[test]
    fn test_locus_without_intervals() {
        let pairs: Vec<Arc<ReadPair>> = vec![Arc::new(create_test_pair(
            "a", "chr1", 1000, "chr1", 61000, 50, "LI",
        ))];
        let capture = CaptureRegions::from_intervals(vec![interval("chr1", 900, 1100)]);
        let locus =
            assemble_intrachromosomal_locus(pairs, "chr1", &settings(), &capture, &contigs(), "s.bam");
        assert_eq!(locus.nsegments, 0);
        assert!(locus.primary.is_none());
    }

    #[test]
    fn test_primary_is_most_supported_interval() {
        let pairs: Vec<Arc<ReadPair>> = vec![
            Arc::new(create_test_pair("a", "chr1", 1000, "chr1", 61000, 50, "LI")),
            Arc::new(create_test_pair("b", "chr1", 1010, "chr1", 61010, 50, "LI")),
            Arc::new(create_test_pair("c", "chr1", 61020, "chr1", 61400, 50, "NF")),
        ];
        let capture = CaptureRegions::from_intervals(vec![
            interval("chr1", 900, 1100),
            interval("chr1", 60900, 61200),
        ]);
        let locus =
            assemble_intrachromosomal_locus(pairs, "chr1", &settings(), &capture, &contigs(), "s.bam");
        assert_eq!(locus.primary, Some(interval("chr1", 61010, 61060)));
        assert_eq!(locus.partners, vec![interval("chr1", 1010, 1050)]);
        assert_eq!(locus.tdist, Some(60000));
    }

    #[test]
    fn test_interchromosomal_locus() {
        let pairs: Vec<Arc<ReadPair>> = vec![
            Arc::new(create_test_pair("a", "chr1", 1000, "chr2", 5000, 50, "MDC")),
            Arc::new(create_test_pair("b", "chr1", 1010, "chr2", 5010, 50, "MDC")),
        ];
        let capture = CaptureRegions::from_intervals(vec![
            interval("chr1", 900, 1100),
            interval("chr2", 4900, 5100),
        ]);
        let locus = assemble_interchromosomal_locus(
            pairs,
            ("chr1", "chr2"),
            &settings(),
            &capture,
            &contigs(),
            "s.bam",
        );
        assert_eq!(locus.rearrangement, RearrangementType::Interchromosomal);
        assert_eq!(locus.contigs, vec!["chr1", "chr2"]);
        assert_eq!(locus.interval_lists.len(), 2);
        assert_eq!(locus.nsegments, 2);
        assert_eq!(locus.primary, Some(interval("chr1", 1010, 1050)));
        assert_eq!(locus.partners, vec![interval("chr2", 5010, 5050)]);
        assert_eq!(locus.num_partners, 1);
        assert_eq!(locus.tdist, None);
    }
}
