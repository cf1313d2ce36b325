use core::fmt;
use serde_derive::Serialize;
use std::{
    cmp::{max, min},
    collections::{BTreeSet, HashMap},
    str::FromStr,
    sync::Arc,
};

use crate::errors::SvError;

/// Simple genomic interval, comparable to a BED record. Zero-based, half-open.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord, Serialize)]
pub struct GenomicInterval {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
}

impl GenomicInterval {
    pub fn new(chrom: String, start: i64, end: i64) -> Self {
        GenomicInterval { chrom, start, end }
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &GenomicInterval) -> bool {
        self.chrom == other.chrom && self.start < other.end && other.start < self.end
    }

    /// Overlapping part of the two intervals, if any
    pub fn intersect(&self, other: &GenomicInterval) -> Option<GenomicInterval> {
        if !self.overlaps(other) {
            return None;
        }
        Some(GenomicInterval::new(
            self.chrom.clone(),
            max(self.start, other.start),
            min(self.end, other.end),
        ))
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}-{}", &self.chrom, &self.start, &self.end)
    }
}

/// Structural variant evidence labels written by the upstream tagging stage
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum SvTag {
    /// insert size far above the library expectation
    LongInsert,
    /// mate aligned to a different contig
    MateDifferentContig,
    OriginallyRescued,
}

impl SvTag {
    const ALL: [SvTag; 3] = [
        SvTag::LongInsert,
        SvTag::MateDifferentContig,
        SvTag::OriginallyRescued,
    ];

    fn bit(self) -> u8 {
        match self {
            SvTag::LongInsert => 1,
            SvTag::MateDifferentContig => 1 << 1,
            SvTag::OriginallyRescued => 1 << 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SvTag::LongInsert => "LI",
            SvTag::MateDifferentContig => "MDC",
            SvTag::OriginallyRescued => "ORB",
        }
    }
}

impl FromStr for SvTag {
    type Err = SvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LI" => Ok(SvTag::LongInsert),
            "MDC" => Ok(SvTag::MateDifferentContig),
            "ORB" => Ok(SvTag::OriginallyRescued),
            _ => Err(SvError::Configuration(format!("Unknown SV tag \"{s}\""))),
        }
    }
}

/// Small flag set of SV tags.
///
/// Used both for the tags carried by a read pair and for tag filters such as `LI,ORB`,
/// where a pair matches the filter when it carries any one of the filter's tags.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Default)]
pub struct SvTagSet(u8);

impl SvTagSet {
    pub fn empty() -> Self {
        SvTagSet(0)
    }

    pub fn insert(&mut self, tag: SvTag) {
        self.0 |= tag.bit();
    }

    pub fn contains(&self, tag: SvTag) -> bool {
        self.0 & tag.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn matches_any(&self, filter: &SvTagSet) -> bool {
        self.0 & filter.0 != 0
    }

    pub fn union(&self, other: &SvTagSet) -> SvTagSet {
        SvTagSet(self.0 | other.0)
    }

    /// Parse the value of a BAM `SV` aux tag. Labels other than LI, MDC and ORB
    /// are emitted upstream for other purposes and are ignored here.
    pub fn from_record_value(value: &str) -> Self {
        value
            .split(',')
            .filter_map(|label| label.trim().parse::<SvTag>().ok())
            .collect()
    }
}

impl FromIterator<SvTag> for SvTagSet {
    fn from_iter<I: IntoIterator<Item = SvTag>>(iter: I) -> Self {
        let mut tags = SvTagSet::empty();
        for tag in iter {
            tags.insert(tag);
        }
        tags
    }
}

impl FromStr for SvTagSet {
    type Err = SvError;

    /// Strict parse of a comma-separated filter expression
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tags = SvTagSet::empty();
        for label in s.split(',').map(str::trim).filter(|l| !l.is_empty()) {
            tags.insert(label.parse::<SvTag>()?);
        }
        if tags.is_empty() {
            return Err(SvError::Configuration(format!(
                "Empty SV tag filter \"{s}\""
            )));
        }
        Ok(tags)
    }
}

impl fmt::Display for SvTagSet {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = SvTag::ALL
            .iter()
            .filter(|tag| self.contains(**tag))
            .map(|tag| tag.label())
            .collect();
        write!(formatter, "{}", labels.join(","))
    }
}

/// One aligned read of a pair
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ReadEnd {
    pub chrom: String,
    pub pos: i64,
    pub end: i64,
    pub mapq: u8,
    /// floor of the mean base quality of the read
    pub base_quality: u8,
    pub is_reverse: bool,
}

impl ReadEnd {
    pub fn overlaps(&self, interval: &GenomicInterval) -> bool {
        self.chrom == interval.chrom && self.pos < interval.end && interval.start < self.end
    }
}

/// Two primary alignments from the same sequenced fragment.
/// Built once at load time and shared as `Arc<ReadPair>` afterwards.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ReadPair {
    pub name: String,
    pub read1: ReadEnd,
    pub read2: ReadEnd,
    /// absolute template length; zero for mates on different contigs
    pub insert_size: i64,
    pub sv_tags: SvTagSet,
}

impl ReadPair {
    pub fn reads(&self) -> [&ReadEnd; 2] {
        [&self.read1, &self.read2]
    }

    pub fn mapq(&self) -> u8 {
        min(self.read1.mapq, self.read2.mapq)
    }

    pub fn base_quality(&self) -> u8 {
        min(self.read1.base_quality, self.read2.base_quality)
    }

    pub fn is_same_contig(&self) -> bool {
        self.read1.chrom == self.read2.chrom
    }

    /// Contig names of the two reads in sorted order
    pub fn contig_pair(&self) -> (String, String) {
        if self.read1.chrom <= self.read2.chrom {
            (self.read1.chrom.clone(), self.read2.chrom.clone())
        } else {
            (self.read2.chrom.clone(), self.read1.chrom.clone())
        }
    }

    pub fn overlaps(&self, interval: &GenomicInterval) -> bool {
        self.read1.overlaps(interval) || self.read2.overlaps(interval)
    }

    /// True if one read lies in `first` and its mate lies in `second`
    pub fn links(&self, first: &GenomicInterval, second: &GenomicInterval) -> bool {
        (self.read1.overlaps(first) && self.read2.overlaps(second))
            || (self.read2.overlaps(first) && self.read1.overlaps(second))
    }
}

impl fmt::Display for ReadPair {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {}:{}-{} / {}:{}-{} (isize={}, tags={})",
            &self.name,
            &self.read1.chrom,
            &self.read1.pos,
            &self.read1.end,
            &self.read2.chrom,
            &self.read2.pos,
            &self.read2.end,
            &self.insert_size,
            &self.sv_tags,
        )
    }
}

/// Contig names in header order, with lengths
#[derive(Debug, Clone, Default)]
pub struct ContigTable {
    names: Vec<String>,
    lengths: HashMap<String, u64>,
}

impl ContigTable {
    pub fn new(contigs: Vec<(String, u64)>) -> Self {
        let mut names = Vec::new();
        let mut lengths = HashMap::new();
        for (name, length) in contigs {
            names.push(name.clone());
            lengths.insert(name, length);
        }
        ContigTable { names, lengths }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn length(&self, chrom: &str) -> Option<u64> {
        self.lengths.get(chrom).copied()
    }

    /// Header position of the contig. Unknown contigs sort after all known ones.
    pub fn rank(&self, chrom: &str) -> usize {
        self.names
            .iter()
            .position(|name| name == chrom)
            .unwrap_or(self.names.len())
    }

    /// Sort contig names by header order, then by name
    pub fn sort_contigs(&self, contigs: &mut [String]) {
        contigs.sort_by(|a, b| self.rank(a).cmp(&self.rank(b)).then_with(|| a.cmp(b)));
    }
}

/// A region of sufficient read depth that may hold a breakpoint
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct CandidateInterval {
    pub region: GenomicInterval,
    /// depth at each position of the region
    pub depth_profile: Vec<u32>,
}

impl CandidateInterval {
    pub fn new(region: GenomicInterval, depth_profile: Vec<u32>) -> Self {
        CandidateInterval {
            region,
            depth_profile,
        }
    }

    pub fn min_depth(&self) -> u32 {
        self.depth_profile.iter().copied().min().unwrap_or(0)
    }

    pub fn max_depth(&self) -> u32 {
        self.depth_profile.iter().copied().max().unwrap_or(0)
    }
}

impl fmt::Display for CandidateInterval {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} (depth {}-{})",
            self.region,
            self.min_depth(),
            self.max_depth()
        )
    }
}

/// Container for a hashmap of chromosome name to sorted, non-overlapping capture regions
/// loaded from a BED file
#[derive(Debug, Clone, Default)]
pub struct CaptureRegions {
    pub regions: HashMap<String, Vec<GenomicInterval>>,
}

impl CaptureRegions {
    pub fn from_intervals(intervals: Vec<GenomicInterval>) -> Self {
        let mut by_chrom: HashMap<String, Vec<GenomicInterval>> = HashMap::new();
        for interval in intervals.into_iter().filter(|i| !i.is_empty()) {
            by_chrom
                .entry(interval.chrom.clone())
                .or_default()
                .push(interval);
        }
        let mut regions = HashMap::new();
        for (chrom, mut chrom_intervals) in by_chrom {
            chrom_intervals.sort();
            let mut merged: Vec<GenomicInterval> = Vec::new();
            for interval in chrom_intervals {
                match merged.last_mut() {
                    Some(last) if interval.start <= last.end => {
                        last.end = max(last.end, interval.end);
                    }
                    _ => merged.push(interval),
                }
            }
            regions.insert(chrom, merged);
        }
        CaptureRegions { regions }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.values().all(|r| r.is_empty())
    }

    pub fn len(&self) -> usize {
        self.regions.values().map(|r| r.len()).sum()
    }

    /// Copy of the regions with every region widened by `dist` on both sides
    pub fn padded(&self, dist: i64) -> Self {
        let widened = self
            .regions
            .values()
            .flatten()
            .map(|r| GenomicInterval::new(r.chrom.clone(), max(0, r.start - dist), r.end + dist))
            .collect();
        CaptureRegions::from_intervals(widened)
    }

    /// Pieces of `interval` that fall within capture regions, in ascending order
    pub fn clip(&self, interval: &GenomicInterval) -> Vec<GenomicInterval> {
        match self.regions.get(&interval.chrom) {
            Some(chrom_regions) => {
                let first = chrom_regions.partition_point(|r| r.end <= interval.start);
                chrom_regions[first..]
                    .iter()
                    .take_while(|r| r.start < interval.end)
                    .filter_map(|r| r.intersect(interval))
                    .collect()
            }
            None => Vec::new(),
        }
    }
}

/// Rearrangement class of a putative locus
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum RearrangementType {
    Intrachromosomal,
    Interchromosomal,
}

impl fmt::Display for RearrangementType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RearrangementType::Intrachromosomal => "IntrachromosomalRearrangement",
            RearrangementType::Interchromosomal => "InterchromosomalRearrangement",
        };
        write!(formatter, "{s}")
    }
}

impl serde::Serialize for RearrangementType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Aggregate evidence for one candidate rearrangement.
///
/// Intrachromosomal loci hold one interval list, interchromosomal loci one list per contig
/// of the pair, in the same order as `contigs`.
#[derive(Debug, Clone)]
pub struct PutativeLocus {
    pub rearrangement: RearrangementType,
    pub contigs: Vec<String>,
    pub interval_lists: Vec<Vec<CandidateInterval>>,
    pub read_pairs: Vec<Arc<ReadPair>>,
    /// name of the BAM the evidence came from
    pub source: String,
    /// supporting pairs with a read inside any locus interval
    pub nsegments: usize,
    pub primary: Option<GenomicInterval>,
    /// intervals linked to the primary interval by at least one read pair
    pub partners: Vec<GenomicInterval>,
    pub num_partners: usize,
    /// breakpoint distance, intrachromosomal loci only
    pub tdist: Option<i64>,
}

impl PutativeLocus {
    pub fn intervals(&self) -> impl Iterator<Item = &CandidateInterval> {
        self.interval_lists.iter().flatten()
    }
}

struct ContigIndex {
    /// (read start, read end, pair index), sorted by start
    entries: Vec<(i64, i64, usize)>,
    longest_read: i64,
}

/// Every complete primary read pair of the input, with a per-contig position index
/// for overlap queries. Read-only once built.
pub struct AlignmentStore {
    source: String,
    contigs: ContigTable,
    pairs: Vec<Arc<ReadPair>>,
    index: HashMap<String, ContigIndex>,
}

impl AlignmentStore {
    pub fn new(source: String, contigs: ContigTable, pairs: Vec<ReadPair>) -> Self {
        let pairs: Vec<Arc<ReadPair>> = pairs.into_iter().map(Arc::new).collect();
        let mut index: HashMap<String, ContigIndex> = HashMap::new();
        for (idx, pair) in pairs.iter().enumerate() {
            for read in pair.reads() {
                let contig_index = index.entry(read.chrom.clone()).or_insert(ContigIndex {
                    entries: Vec::new(),
                    longest_read: 0,
                });
                contig_index.entries.push((read.pos, read.end, idx));
                contig_index.longest_read = max(contig_index.longest_read, read.end - read.pos);
            }
        }
        for contig_index in index.values_mut() {
            contig_index.entries.sort_unstable();
        }
        AlignmentStore {
            source,
            contigs,
            pairs,
            index,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn contigs(&self) -> &ContigTable {
        &self.contigs
    }

    pub fn pairs(&self) -> &[Arc<ReadPair>] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Indices of pairs with at least one read overlapping the interval
    pub fn overlapping_pair_indices(&self, interval: &GenomicInterval) -> BTreeSet<usize> {
        let mut hits = BTreeSet::new();
        if let Some(contig_index) = self.index.get(&interval.chrom) {
            let search_start = interval.start - contig_index.longest_read;
            let first = contig_index
                .entries
                .partition_point(|(start, _, _)| *start < search_start);
            for (start, end, idx) in contig_index.entries[first..].iter() {
                if *start >= interval.end {
                    break;
                }
                if *end > interval.start {
                    hits.insert(*idx);
                }
            }
        }
        hits
    }

    pub fn pair(&self, idx: usize) -> &Arc<ReadPair> {
        &self.pairs[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::create_test_pair;

    fn interval(chrom: &str, start: i64, end: i64) -> GenomicInterval {
        GenomicInterval::new(chrom.to_string(), start, end)
    }

    #[test]
    fn test_interval_overlap_and_intersect() {
        let a = interval("chr1", 100, 200);
        let b = interval("chr1", 150, 300);
        let c = interval("chr1", 200, 300);
        let d = interval("chr2", 100, 200);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&d));
        assert_eq!(a.intersect(&b), Some(interval("chr1", 150, 200)));
        assert_eq!(a.intersect(&c), None);
        assert_eq!(a.to_string(), "chr1:100-200");
        assert_eq!(a.len(), 100);
    }

    #[test]
    fn test_interval_ordering() {
        let mut intervals = vec![
            interval("chr2", 10, 20),
            interval("chr1", 50, 60),
            interval("chr1", 10, 30),
            interval("chr1", 10, 20),
        ];
        intervals.sort();
        assert_eq!(intervals[0], interval("chr1", 10, 20));
        assert_eq!(intervals[1], interval("chr1", 10, 30));
        assert_eq!(intervals[3], interval("chr2", 10, 20));
    }

    #[test]
    fn test_sv_tag_set_parse_and_match() {
        let filter: SvTagSet = "LI,ORB".parse().unwrap();
        assert!(filter.contains(SvTag::LongInsert));
        assert!(filter.contains(SvTag::OriginallyRescued));
        assert!(!filter.contains(SvTag::MateDifferentContig));
        assert_eq!(filter.to_string(), "LI,ORB");

        let li_only = SvTagSet::from_record_value("LI");
        let orb_only = SvTagSet::from_record_value("ORB,NF");
        let mdc_only = SvTagSet::from_record_value("MDC");
        assert!(li_only.matches_any(&filter));
        assert!(orb_only.matches_any(&filter));
        assert!(!mdc_only.matches_any(&filter));
        assert!(SvTagSet::from_record_value("NF").is_empty());
    }

    #[test]
    fn test_sv_tag_set_rejects_unknown_filter_labels() {
        assert!("LI,XYZ".parse::<SvTagSet>().is_err());
        assert!("".parse::<SvTagSet>().is_err());
    }

    #[test]
    fn test_read_pair_quality_and_contigs() {
        let mut pair = create_test_pair("p1", "chr2", 100, "chr1", 5000, 50, "MDC");
        pair.read1.mapq = 20;
        pair.read2.base_quality = 12;
        assert_eq!(pair.mapq(), 20);
        assert_eq!(pair.base_quality(), 12);
        assert!(!pair.is_same_contig());
        assert_eq!(
            pair.contig_pair(),
            ("chr1".to_string(), "chr2".to_string())
        );
        assert!(pair.links(&interval("chr1", 5000, 5010), &interval("chr2", 120, 130)));
        assert!(!pair.links(&interval("chr1", 0, 10), &interval("chr2", 120, 130)));
    }

    #[test]
    fn test_contig_table_rank() {
        let contigs = ContigTable::new(vec![
            ("chr2".to_string(), 1000),
            ("chr1".to_string(), 2000),
        ]);
        assert_eq!(contigs.rank("chr2"), 0);
        assert_eq!(contigs.rank("chr1"), 1);
        assert_eq!(contigs.rank("chrUn"), 2);
        assert_eq!(contigs.length("chr1"), Some(2000));

        let mut names = vec!["chrUn".to_string(), "chr1".to_string(), "chr2".to_string()];
        contigs.sort_contigs(&mut names);
        assert_eq!(names, vec!["chr2", "chr1", "chrUn"]);
    }

    #[test]
    fn test_capture_regions_merge_and_clip() {
        let capture = CaptureRegions::from_intervals(vec![
            interval("chr1", 500, 600),
            interval("chr1", 100, 200),
            interval("chr1", 150, 250),
            interval("chr2", 0, 10),
        ]);
        assert_eq!(capture.len(), 3);
        assert_eq!(
            capture.regions.get("chr1").unwrap()[0],
            interval("chr1", 100, 250)
        );

        let pieces = capture.clip(&interval("chr1", 200, 550));
        assert_eq!(
            pieces,
            vec![interval("chr1", 200, 250), interval("chr1", 500, 550)]
        );
        assert!(capture.clip(&interval("chr1", 300, 400)).is_empty());
        assert!(capture.clip(&interval("chr3", 0, 400)).is_empty());
    }

    #[test]
    fn test_capture_regions_padded() {
        let capture = CaptureRegions::from_intervals(vec![
            interval("chr1", 100, 200),
            interval("chr1", 300, 400),
        ]);
        let padded = capture.padded(60);
        assert_eq!(padded.len(), 1);
        assert_eq!(
            padded.regions.get("chr1").unwrap()[0],
            interval("chr1", 40, 460)
        );
    }

    #[test]
    fn test_alignment_store_overlap_query() {
        let pairs = vec![
            create_test_pair("p1", "chr1", 1000, "chr1", 9000, 100, "LI"),
            create_test_pair("p2", "chr1", 1050, "chr1", 1300, 100, ""),
            create_test_pair("p3", "chr2", 1000, "chr1", 20000, 100, "MDC"),
        ];
        let store = AlignmentStore::new("test.bam".to_string(), ContigTable::default(), pairs);
        assert_eq!(store.len(), 3);

        let hits = store.overlapping_pair_indices(&interval("chr1", 1090, 1120));
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![0, 1]);

        let hits = store.overlapping_pair_indices(&interval("chr1", 9050, 9060));
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![0]);

        let hits = store.overlapping_pair_indices(&interval("chr2", 1100, 1200));
        assert!(hits.is_empty());

        let hits = store.overlapping_pair_indices(&interval("chr1", 1399, 1400));
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![1]);
    }
}
