use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::SystemTime;

use crate::cluster_finder::cluster_by_insert_size;
use crate::cluster_support_builder::{supporting_read_pairs, supporting_read_pairs_for_all};
use crate::containers::{AlignmentStore, CaptureRegions, PutativeLocus, ReadPair, SvTag, SvTagSet};
use crate::errors::SvError;
use crate::ingester::{select_read_pairs, ReferenceLookup};
use crate::locus_assembler::{assemble_interchromosomal_locus, assemble_intrachromosomal_locus};
use crate::pileup::{pileup_clusters_by_pos, pileup_mate_contigs};
use crate::utils;
use crate::variant_formatter::{format_variant_line, VariantLine};

/// Thresholds and tag filters for one calling run
#[derive(Debug, Clone, PartialEq)]
pub struct CallerSettings {
    pub min_mapq: u8,
    pub min_base_quality: u8,
    pub min_clust_depth: u32,
    pub min_pileup_len: i64,
    pub ins_distance: i64,
    pub bed_dist: i64,
    pub merge_dist: i64,
    pub min_tdist: i64,
    pub intrachromosomal_filter: SvTagSet,
    pub interchromosomal_filter: SvTagSet,
}

impl Default for CallerSettings {
    fn default() -> Self {
        CallerSettings {
            min_mapq: 0,
            min_base_quality: 0,
            min_clust_depth: utils::MIN_CLUST_DEPTH,
            min_pileup_len: utils::MIN_PILEUP_LEN,
            ins_distance: utils::INS_DISTANCE,
            bed_dist: utils::BED_DIST,
            merge_dist: utils::MERGE_DIST,
            min_tdist: utils::MIN_INTRACHROMOSOMAL_TDIST,
            intrachromosomal_filter: [SvTag::LongInsert, SvTag::OriginallyRescued]
                .into_iter()
                .collect(),
            interchromosomal_filter: [SvTag::MateDifferentContig, SvTag::OriginallyRescued]
                .into_iter()
                .collect(),
        }
    }
}

impl CallerSettings {
    /// Reject thresholds that would make every position or every run qualify
    pub fn validate(&self) -> Result<(), SvError> {
        if self.min_clust_depth == 0 {
            return Err(SvError::Configuration(
                "Minimum cluster depth must be at least 1".to_string(),
            ));
        }
        if self.min_pileup_len <= 0 {
            return Err(SvError::Configuration(
                "Minimum pileup length must be at least 1".to_string(),
            ));
        }
        if self.ins_distance < 0 || self.bed_dist < 0 || self.merge_dist < 0 || self.min_tdist < 0
        {
            return Err(SvError::Configuration(
                "Distances must not be negative".to_string(),
            ));
        }
        if self.intrachromosomal_filter.is_empty() || self.interchromosomal_filter.is_empty() {
            return Err(SvError::Configuration("Empty SV tag filter".to_string()));
        }
        Ok(())
    }
}

/// Intrachromosomal loci: tagged pairs with both reads on one contig, clustered by insert
/// size and piled up by position, one locus per candidate interval
fn find_intrachromosomal_loci(
    store: &AlignmentStore,
    capture: &CaptureRegions,
    settings: &CallerSettings,
) -> Vec<PutativeLocus> {
    let selected = select_read_pairs(
        store,
        &settings.intrachromosomal_filter,
        settings.min_mapq,
        settings.min_base_quality,
    );
    let mut pairs_by_contig: BTreeMap<String, Vec<Arc<ReadPair>>> = BTreeMap::new();
    for pair in selected.into_iter().filter(|pair| pair.is_same_contig()) {
        pairs_by_contig
            .entry(pair.read1.chrom.clone())
            .or_default()
            .push(pair);
    }
    let mut chroms: Vec<String> = pairs_by_contig.keys().cloned().collect();
    store.contigs().sort_contigs(&mut chroms);

    let mut loci = Vec::new();
    for chrom in chroms.iter() {
        let pairs = match pairs_by_contig.get(chrom) {
            Some(pairs) => pairs,
            None => continue,
        };
        let clusters = cluster_by_insert_size(pairs, settings.ins_distance);
        if clusters.is_empty() {
            debug!("No insert size clusters on {chrom}");
            continue;
        }
        let candidates = pileup_clusters_by_pos(
            &clusters,
            chrom,
            settings.min_clust_depth,
            settings.min_pileup_len,
            capture,
            store.contigs(),
        );
        if candidates.is_empty() {
            debug!("No candidate intervals on {chrom}");
            continue;
        }
        for candidate in candidates.iter() {
            let support = supporting_read_pairs(&candidate.region, store);
            let locus = assemble_intrachromosomal_locus(
                support,
                chrom,
                settings,
                capture,
                store.contigs(),
                store.source(),
            );
            if locus.nsegments == 0 {
                debug!("Dropping locus for {} without segments", candidate.region);
                continue;
            }
            loci.push(locus);
        }
    }
    loci
}

/// Interchromosomal loci: tagged pairs with reads on two contigs, grouped by contig pair
/// and piled up on both contigs against the padded capture regions
fn find_interchromosomal_loci(
    store: &AlignmentStore,
    capture: &CaptureRegions,
    settings: &CallerSettings,
) -> Vec<PutativeLocus> {
    let selected = select_read_pairs(
        store,
        &settings.interchromosomal_filter,
        settings.min_mapq,
        settings.min_base_quality,
    );
    let mut pairs_by_contig_pair: BTreeMap<(String, String), Vec<Arc<ReadPair>>> =
        BTreeMap::new();
    for pair in selected.into_iter().filter(|pair| !pair.is_same_contig()) {
        pairs_by_contig_pair
            .entry(pair.contig_pair())
            .or_default()
            .push(pair);
    }

    // each contig pair is ordered by header rank, and the pairs themselves likewise
    let contigs = store.contigs();
    let mut ordered: Vec<(Vec<String>, &Vec<Arc<ReadPair>>)> = pairs_by_contig_pair
        .iter()
        .map(|((first, second), pairs)| {
            let mut names = vec![first.clone(), second.clone()];
            contigs.sort_contigs(&mut names);
            (names, pairs)
        })
        .collect();
    ordered.sort_by_key(|(names, _)| (contigs.rank(&names[0]), contigs.rank(&names[1])));

    let padded_capture = capture.padded(settings.bed_dist);
    let mut loci = Vec::new();
    for (names, pairs) in ordered {
        let contig_pair = (names[0].as_str(), names[1].as_str());
        let linked = pileup_mate_contigs(
            pairs,
            contig_pair,
            settings.min_clust_depth,
            settings.min_pileup_len,
            capture,
            settings.bed_dist,
            contigs,
        );
        if linked.is_empty() {
            debug!("No linked candidate intervals for {}/{}", names[0], names[1]);
            continue;
        }
        for (first, second) in linked.iter() {
            let support = supporting_read_pairs_for_all(&[&first.region, &second.region], store);
            let locus = assemble_interchromosomal_locus(
                support,
                contig_pair,
                settings,
                &padded_capture,
                contigs,
                store.source(),
            );
            if locus.nsegments == 0 {
                debug!(
                    "Dropping locus for {} / {} without segments",
                    first.region, second.region
                );
                continue;
            }
            loci.push(locus);
        }
    }
    loci
}

/// Find every putative rearrangement locus, intrachromosomal ones first
pub fn find_putative_loci(
    store: &AlignmentStore,
    capture: &CaptureRegions,
    settings: &CallerSettings,
) -> Vec<PutativeLocus> {
    let start_time = SystemTime::now();
    if store.is_empty() {
        info!("No read pairs in {}; nothing to call", store.source());
        return Vec::new();
    }
    debug!("Searching {} read pairs for putative loci", store.len());
    let mut loci = find_intrachromosomal_loci(store, capture, settings);
    let intra_count = loci.len();
    loci.extend(find_interchromosomal_loci(store, capture, settings));
    info!(
        "{} intrachromosomal and {} interchromosomal putative loci",
        intra_count,
        loci.len() - intra_count
    );
    debug!(
        "Finding loci: {}s",
        start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    );
    loci
}

/// Call translocations: format every locus, drop duplicate lines and apply the output filters.
/// Lines come back in key order.
pub fn call_translocations(
    store: &AlignmentStore,
    capture: &CaptureRegions,
    settings: &CallerSettings,
    reference: &ReferenceLookup,
) -> Vec<VariantLine> {
    let loci = find_putative_loci(store, capture, settings);
    let unique_lines: BTreeSet<VariantLine> = loci
        .iter()
        .filter_map(|locus| format_variant_line(locus, reference))
        .collect();
    debug!("{} unique variant lines", unique_lines.len());
    let lines: Vec<VariantLine> = unique_lines
        .into_iter()
        .filter(|line| line.passes_output_filters(settings.min_tdist))
        .collect();
    info!("{} variant lines pass output filters", lines.len());
    lines
}
