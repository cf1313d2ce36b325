use log::{debug, info, warn};
use rust_htslib::bam::{self, Read};
use rust_htslib::faidx;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::bam_tag_parser::{get_read_end, get_readname, get_sv_tags};
use crate::containers::{
    AlignmentStore, CaptureRegions, ContigTable, GenomicInterval, ReadEnd, ReadPair, SvTagSet,
};
use crate::errors::SvError;
use crate::utils::{self, is_local_file};

/// A primary record waiting for its mate
struct PendingRead {
    name: String,
    /// None when the record is unmapped
    read: Option<ReadEnd>,
    is_first_in_template: bool,
    insert_size: i64,
    sv_tags: SvTagSet,
}

impl PendingRead {
    fn from_record(record: &bam::Record, contigs: &ContigTable) -> Result<Self, SvError> {
        let name = get_readname(record);
        let mut read = None;
        let mut sv_tags = SvTagSet::empty();
        if !record.is_unmapped() && record.tid() >= 0 {
            let chrom = contigs
                .names()
                .get(record.tid() as usize)
                .cloned()
                .ok_or_else(|| {
                    SvError::Input(format!(
                        "Read {} has reference id {} missing from the header",
                        name,
                        record.tid()
                    ))
                })?;
            sv_tags = get_sv_tags(record)?;
            read = Some(get_read_end(record, chrom));
        }
        Ok(PendingRead {
            name,
            read,
            is_first_in_template: record.is_first_in_template(),
            insert_size: record.insert_size().abs(),
            sv_tags,
        })
    }
}

/// Join two primary records of one template into a pair, if both are mapped
fn join_mates(first: PendingRead, second: PendingRead) -> Option<ReadPair> {
    let (first_read, second_read) = match (first.read, second.read) {
        (Some(a), Some(b)) => (a, b),
        _ => return None,
    };
    let sv_tags = first.sv_tags.union(&second.sv_tags);
    let (read1, read2, insert_size) = if first.is_first_in_template || !second.is_first_in_template
    {
        (first_read, second_read, first.insert_size)
    } else {
        (second_read, first_read, second.insert_size)
    };
    let insert_size = if read1.chrom == read2.chrom {
        insert_size
    } else {
        0
    };
    Some(ReadPair {
        name: first.name,
        read1,
        read2,
        insert_size,
        sv_tags,
    })
}

/// Get the contig names and lengths from the bam header
pub fn get_contig_table(header: &bam::HeaderView) -> ContigTable {
    let contigs = header
        .target_names()
        .iter()
        .enumerate()
        .map(|(tid, name)| {
            (
                String::from_utf8_lossy(name).to_string(),
                header.target_len(tid as u32).unwrap_or(0),
            )
        })
        .collect();
    ContigTable::new(contigs)
}

/// Load every complete primary read pair from a name-sorted, SV-tagged BAM.
///
/// Secondary and supplementary records are skipped, as are singletons and pairs with an
/// unmapped mate. A mapped primary record without the SV tag is an input error.
pub fn load_alignment_store(bam_filename: &Path) -> Result<AlignmentStore, SvError> {
    let start_time = SystemTime::now();
    let bam_name_str = bam_filename.display().to_string();
    if !is_local_file(bam_filename) {
        return Err(SvError::Input(format!(
            "Input BAM does not exist: \"{bam_name_str}\""
        )));
    }
    let mut bam_reader = bam::Reader::from_path(bam_filename)
        .map_err(|e| SvError::Input(format!("Failed to open BAM \"{bam_name_str}\": {e}")))?;
    let contigs = get_contig_table(bam_reader.header());

    let mut pairs: Vec<ReadPair> = Vec::new();
    let mut pending: Option<PendingRead> = None;
    let mut unpaired_count = 0;
    let mut unmapped_mate_count = 0;
    let mut record_count = 0;

    // reading into one record rather than allocating new ones keeps a single allocation
    let mut record = bam::Record::new();
    while let Some(result) = bam_reader.read(&mut record) {
        if let Err(e) = result {
            return Err(SvError::Input(format!(
                "Error parsing BAM \"{bam_name_str}\": {e}"
            )));
        }
        if record.is_secondary() || record.is_supplementary() {
            continue;
        }
        record_count += 1;
        let current = PendingRead::from_record(&record, &contigs)?;
        pending = match pending.take() {
            Some(previous) if previous.name == current.name => {
                match join_mates(previous, current) {
                    Some(pair) => pairs.push(pair),
                    None => unmapped_mate_count += 1,
                }
                None
            }
            Some(_) => {
                unpaired_count += 1;
                Some(current)
            }
            None => Some(current),
        };
    }
    if pending.is_some() {
        unpaired_count += 1;
    }

    debug!("{record_count} primary records read from {bam_name_str}");
    debug!("{unpaired_count} records without a mate skipped; is the BAM name-sorted?");
    debug!("{unmapped_mate_count} pairs with an unmapped mate skipped");
    info!("{} read pairs loaded from {}", pairs.len(), bam_name_str);
    debug!(
        "Read extraction: {}s",
        start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    );

    let source = bam_filename
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or(bam_name_str);
    Ok(AlignmentStore::new(source, contigs, pairs))
}

/// Select the read pairs carrying any tag of the filter and meeting both quality thresholds
pub fn select_read_pairs(
    store: &AlignmentStore,
    tag_filter: &SvTagSet,
    min_mapq: u8,
    min_base_quality: u8,
) -> Vec<Arc<ReadPair>> {
    let selected: Vec<Arc<ReadPair>> = store
        .pairs()
        .iter()
        .filter(|pair| {
            pair.sv_tags.matches_any(tag_filter)
                && pair.mapq() >= min_mapq
                && pair.base_quality() >= min_base_quality
        })
        .cloned()
        .collect();
    debug!(
        "{} read pairs meet requirements for tags {}",
        selected.len(),
        tag_filter
    );
    selected
}

/// Load a BAM and return only the pairs passing the tag and quality filters
pub fn load_read_pairs(
    bam_filename: &Path,
    tag_filter: &SvTagSet,
    min_mapq: u8,
    min_base_quality: u8,
) -> Result<Vec<Arc<ReadPair>>, SvError> {
    let store = load_alignment_store(bam_filename)?;
    Ok(select_read_pairs(
        &store,
        tag_filter,
        min_mapq,
        min_base_quality,
    ))
}

/// Given a bedfile entry where a string is whitespace-delimited into
/// at least three fields, with the first being a string
/// and the next two being integers, create an interval to
/// represent them
fn bed_entry_to_interval(entry: &str, line_number: usize) -> Result<GenomicInterval, SvError> {
    let fields: Vec<&str> = entry.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(SvError::Input(format!(
            "Invalid entry length in capture bed file, line {line_number}"
        )));
    }
    let chrom = fields[0].to_string();
    let start: i64 = fields[1].parse().map_err(|_| {
        SvError::Input(format!(
            "Non-numeric start position in capture bed file, line {line_number}"
        ))
    })?;
    let end: i64 = fields[2].parse().map_err(|_| {
        SvError::Input(format!(
            "Non-numeric end position in capture bed file, line {line_number}"
        ))
    })?;
    Ok(GenomicInterval::new(chrom, start, end))
}

/// Reads a BED file of capture regions. Can read a gzip compressed or
/// uncompressed BED from a local path.
pub fn load_capture_regions(capture_bed_path: &Path) -> Result<CaptureRegions, SvError> {
    let lines = utils::read_file_from_path(capture_bed_path)?;
    let mut intervals = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("track")
            || trimmed.starts_with("browser")
        {
            continue;
        }
        intervals.push(bed_entry_to_interval(trimmed, idx + 1)?);
    }
    let capture_regions = CaptureRegions::from_intervals(intervals);
    if capture_regions.is_empty() {
        warn!(
            "No capture regions in {}; no translocations can be called",
            capture_bed_path.display()
        );
    }
    debug!(
        "{} capture regions loaded from {}",
        capture_regions.len(),
        capture_bed_path.display()
    );
    Ok(capture_regions)
}

/// Reference bases for the REF column of the output
pub struct ReferenceLookup {
    path: String,
    reader: Option<faidx::Reader>,
}

impl ReferenceLookup {
    /// Open a faidx-indexed FASTA. Failure is not fatal: REF falls back to N.
    pub fn open(reference_path: &Path) -> Self {
        let path = reference_path.display().to_string();
        match faidx::Reader::from_path(reference_path) {
            Ok(reader) => ReferenceLookup {
                path,
                reader: Some(reader),
            },
            Err(e) => {
                warn!("Reference {path} could not be opened ({e}); REF bases will be N");
                Self::unavailable(&path)
            }
        }
    }

    /// Lookup without a readable reference, reporting N for every base
    pub fn unavailable(reference_path: &str) -> Self {
        ReferenceLookup {
            path: reference_path.to_string(),
            reader: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Upper-case reference base at a zero-based position
    pub fn base_at(&self, chrom: &str, pos: i64) -> char {
        if pos < 0 {
            return 'N';
        }
        match &self.reader {
            Some(reader) => match reader.fetch_seq(chrom, pos as usize, pos as usize) {
                Ok(seq) => seq
                    .first()
                    .map(|base| base.to_ascii_uppercase() as char)
                    .unwrap_or('N'),
                Err(_) => 'N',
            },
            None => 'N',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::SvTag;
    use rust_htslib::bam::header::HeaderRecord;
    use rust_htslib::bam::record::{Aux, Cigar, CigarString};
    use std::io::Write;
    use std::path::PathBuf;

    /// Description of one read for writing test BAMs
    pub struct TestRecord {
        pub name: &'static str,
        pub tid: i32,
        pub pos: i64,
        pub mate_tid: i32,
        pub mate_pos: i64,
        pub first_in_template: bool,
        pub mapq: u8,
        pub sv_tag: Option<&'static str>,
    }

    pub const TEST_READ_LEN: usize = 50;

    pub fn mate_records(
        name: &'static str,
        tid: i32,
        pos: i64,
        mate_tid: i32,
        mate_pos: i64,
        sv_tag: Option<&'static str>,
    ) -> [TestRecord; 2] {
        [
            TestRecord {
                name,
                tid,
                pos,
                mate_tid,
                mate_pos,
                first_in_template: true,
                mapq: 60,
                sv_tag,
            },
            TestRecord {
                name,
                tid: mate_tid,
                pos: mate_pos,
                mate_tid: tid,
                mate_pos: pos,
                first_in_template: false,
                mapq: 60,
                sv_tag,
            },
        ]
    }

    /// Write a BAM with contigs chr1 and chr2 (200 kb each) holding the given records in order
    pub fn write_test_bam(dir: &Path, file_name: &str, records: &[TestRecord]) -> PathBuf {
        let path = dir.join(file_name);
        let mut header = bam::Header::new();
        let mut hd = HeaderRecord::new(b"HD");
        hd.push_tag(b"VN", "1.6");
        hd.push_tag(b"SO", "queryname");
        header.push_record(&hd);
        for chrom in ["chr1", "chr2"] {
            let mut sq = HeaderRecord::new(b"SQ");
            sq.push_tag(b"SN", chrom);
            sq.push_tag(b"LN", 200_000);
            header.push_record(&sq);
        }

        let mut writer = bam::Writer::from_path(&path, &header, bam::Format::Bam).unwrap();
        for test_record in records {
            let mut record = bam::Record::new();
            let cigar = CigarString(vec![Cigar::Match(TEST_READ_LEN as u32)]);
            record.set(
                test_record.name.as_bytes(),
                Some(&cigar),
                &[b'A'; TEST_READ_LEN],
                &[30u8; TEST_READ_LEN],
            );
            record.set_tid(test_record.tid);
            record.set_pos(test_record.pos);
            record.set_mtid(test_record.mate_tid);
            record.set_mpos(test_record.mate_pos);
            record.set_mapq(test_record.mapq);
            let mut flags: u16 = 0x1;
            flags |= if test_record.first_in_template {
                0x40
            } else {
                0x80
            };
            record.set_flags(flags);
            if test_record.tid == test_record.mate_tid {
                let left = test_record.pos.min(test_record.mate_pos);
                let right = test_record.pos.max(test_record.mate_pos) + TEST_READ_LEN as i64;
                let tlen = right - left;
                if test_record.pos <= test_record.mate_pos {
                    record.set_insert_size(tlen);
                } else {
                    record.set_insert_size(-tlen);
                }
            }
            if let Some(sv_tag) = test_record.sv_tag {
                record.push_aux(b"SV", Aux::String(sv_tag)).unwrap();
            }
            writer.write(&record).unwrap();
        }
        path
    }

    #[test]
    fn test_load_alignment_store_pairs_mates() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = Vec::new();
        records.extend(mate_records("pairA", 0, 1000, 0, 61000, Some("LI")));
        records.extend(mate_records("pairB", 0, 2000, 1, 5000, Some("MDC,ORB")));
        records.extend(mate_records("pairC", 0, 3000, 0, 3200, Some("NF")));
        let bam_path = write_test_bam(dir.path(), "sample.bam", &records);

        let store = load_alignment_store(&bam_path).unwrap();
        assert_eq!(store.source(), "sample.bam");
        assert_eq!(store.len(), 3);
        assert_eq!(store.contigs().names(), &["chr1", "chr2"]);
        assert_eq!(store.contigs().length("chr2"), Some(200_000));

        let pair_a = &store.pairs()[0];
        assert_eq!(pair_a.name, "pairA");
        assert_eq!(pair_a.read1.pos, 1000);
        assert_eq!(pair_a.read1.end, 1050);
        assert_eq!(pair_a.read2.pos, 61000);
        assert_eq!(pair_a.insert_size, 60050);
        assert!(pair_a.sv_tags.contains(SvTag::LongInsert));

        let pair_b = &store.pairs()[1];
        assert_eq!(pair_b.read2.chrom, "chr2");
        assert_eq!(pair_b.insert_size, 0);
        assert!(pair_b.sv_tags.contains(SvTag::MateDifferentContig));

        assert!(store.pairs()[2].sv_tags.is_empty());
    }

    #[test]
    fn test_load_alignment_store_skips_singletons() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = Vec::new();
        let [first, _] = mate_records("lonely", 0, 500, 0, 900, Some("LI"));
        records.push(first);
        records.extend(mate_records("pairA", 0, 1000, 0, 61000, Some("LI")));
        let bam_path = write_test_bam(dir.path(), "singletons.bam", &records);

        let store = load_alignment_store(&bam_path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.pairs()[0].name, "pairA");
    }

    #[test]
    fn test_missing_sv_tag_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let records = mate_records("untagged", 0, 1000, 0, 61000, None);
        let bam_path = write_test_bam(dir.path(), "untagged.bam", &records);

        let result = load_alignment_store(&bam_path);
        assert!(matches!(result, Err(SvError::Input(_))));
    }

    #[test]
    fn test_missing_bam_fails_load() {
        let result = load_alignment_store(Path::new("/nonexistent/sample.bam"));
        assert!(matches!(result, Err(SvError::Input(_))));
    }

    #[test]
    fn test_select_read_pairs_applies_tags_and_quality() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = Vec::new();
        records.extend(mate_records("li", 0, 1000, 0, 61000, Some("LI")));
        records.extend(mate_records("orb", 0, 2000, 0, 62000, Some("ORB")));
        records.extend(mate_records("mdc", 0, 3000, 1, 5000, Some("MDC")));
        let mut low_mapq = mate_records("lowmq", 0, 4000, 0, 64000, Some("LI"));
        low_mapq[1].mapq = 5;
        records.extend(low_mapq);
        let bam_path = write_test_bam(dir.path(), "filter.bam", &records);

        let filter: SvTagSet = "LI,ORB".parse().unwrap();
        let selected = load_read_pairs(&bam_path, &filter, 20, 10).unwrap();
        let names: Vec<&str> = selected.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["li", "orb"]);
        for pair in selected.iter() {
            assert!(pair.mapq() >= 20);
            assert!(pair.base_quality() >= 10);
            assert!(pair.sv_tags.matches_any(&filter));
        }

        let strict = load_read_pairs(&bam_path, &filter, 20, 31).unwrap();
        assert!(strict.is_empty());
    }

    #[test]
    fn test_load_capture_regions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bed");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "track name=capture").unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "chr1\t900\t1100\ttarget1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "chr2 4900 5100").unwrap();
        drop(file);

        let capture = load_capture_regions(&path).unwrap();
        assert_eq!(capture.len(), 2);
        assert_eq!(
            capture.regions.get("chr2").unwrap()[0],
            GenomicInterval::new("chr2".to_string(), 4900, 5100)
        );
    }

    #[test]
    fn test_malformed_capture_bed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bed");
        std::fs::write(&path, "chr1\tstart\t1100\n").unwrap();
        assert!(matches!(
            load_capture_regions(&path),
            Err(SvError::Input(_))
        ));

        std::fs::write(&path, "chr1\t900\n").unwrap();
        assert!(matches!(
            load_capture_regions(&path),
            Err(SvError::Input(_))
        ));
    }

    #[test]
    fn test_reference_lookup_unavailable() {
        let lookup = ReferenceLookup::unavailable("ref.fa");
        assert_eq!(lookup.path(), "ref.fa");
        assert_eq!(lookup.base_at("chr1", 100), 'N');
    }

    #[test]
    fn test_reference_lookup_reads_fasta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.fa");
        std::fs::write(&path, ">chr1\nACGTacgtNN\n").unwrap();
        std::fs::write(dir.path().join("ref.fa.fai"), "chr1\t10\t6\t10\t11\n").unwrap();

        let lookup = ReferenceLookup::open(&path);
        assert_eq!(lookup.base_at("chr1", 0), 'A');
        assert_eq!(lookup.base_at("chr1", 5), 'C');
        assert_eq!(lookup.base_at("chr9", 5), 'N');
    }
}
