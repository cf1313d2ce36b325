use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::errors::SvError;

/// Minimum depth for a pileup run to be reported as a candidate interval
pub const MIN_CLUST_DEPTH: u32 = 10;

/// Minimum length in bp of a pileup run to be reported as a candidate interval
pub const MIN_PILEUP_LEN: i64 = 8;

/// Greatest insert size difference between neighbouring read pairs in one cluster
pub const INS_DISTANCE: i64 = 35;

/// Distance by which capture regions are widened for mate-contig pileups
pub const BED_DIST: i64 = 10_000;

/// Qualifying runs closer than this are merged into one locus interval
pub const MERGE_DIST: i64 = 150;

/// Smallest breakpoint distance reported for an intrachromosomal rearrangement.
/// Closer events are mostly local indels or alignment artifacts.
pub const MIN_INTRACHROMOSOMAL_TDIST: i64 = 50_000;

/// Tag filter for read pairs used in intrachromosomal calling
pub const INTRACHROMOSOMAL_TAG_FILTER: &str = "LI,ORB";

/// Tag filter for read pairs used in interchromosomal calling
pub const INTERCHROMOSOMAL_TAG_FILTER: &str = "MDC,ORB";

/// BAM aux tag holding the comma-separated SV evidence labels
pub const SV_AUX_TAG: &[u8] = b"SV";

/// first two bytes of a gzip file that indicatee the compression algorithm used
const GZIP_INDICATOR: [u8; 2] = [0x1F, 0x8B];

pub fn is_local_file(filepath: &Path) -> bool {
    match std::fs::metadata(filepath) {
        Ok(metadata) => metadata.is_file(),
        Err(_) => false,
    }
}

/// Check if a file is a gzipped file from its path
pub fn is_gzipped(path: &Path) -> Result<bool, SvError> {
    if !is_local_file(path) {
        return Ok(false);
    }
    let file_handle = std::fs::File::open(path).map_err(|e| SvError::io(e, path))?;
    let mut reader = std::io::BufReader::new(file_handle);
    let mut gzip_indicator_bytes = [0; 2];
    let _ = std::io::Read::read_exact(&mut reader, &mut gzip_indicator_bytes);
    Ok(gzip_indicator_bytes == GZIP_INDICATOR)
}

/// Read a plain text or gzipped text file into vector of Strings by line
pub fn read_file_from_path(file_path: &Path) -> Result<Vec<String>, SvError> {
    if !is_local_file(file_path) {
        return Err(SvError::Input(format!(
            "File not found {}",
            file_path.display()
        )));
    }

    let lines_result: std::io::Result<Vec<String>> = if is_gzipped(file_path)? {
        let bgzf_reader = rust_htslib::bgzf::Reader::from_path(file_path).map_err(|e| {
            SvError::Input(format!(
                "Failed to open compressed file {}: {}",
                file_path.display(),
                e
            ))
        })?;
        BufReader::new(bgzf_reader).lines().collect()
    } else {
        let file = std::fs::File::open(file_path).map_err(|e| SvError::io(e, file_path))?;
        BufReader::new(file).lines().collect()
    };
    lines_result.map_err(|e| SvError::io(e, file_path))
}

/// Strip a trailing extension (e.g. `.bam`) from a path string and add a new suffix.
/// Paths without the extension keep their full name.
pub fn replace_suffix(path: &Path, old_ext: &str, new_suffix: &str) -> String {
    let path_str = path.to_string_lossy();
    let base = path_str.strip_suffix(old_ext).unwrap_or(&path_str);
    format!("{base}{new_suffix}")
}

#[cfg(test)]
pub fn create_test_read(chrom: &str, pos: i64, read_len: i64) -> crate::containers::ReadEnd {
    crate::containers::ReadEnd {
        chrom: chrom.to_string(),
        pos,
        end: pos + read_len,
        mapq: 60,
        base_quality: 30,
        is_reverse: false,
    }
}

/// Build a read pair with MAPQ 60 and base quality 30. The insert size is the
/// template span for same-contig mates and zero otherwise.
#[cfg(test)]
pub fn create_test_pair(
    name: &str,
    chrom1: &str,
    pos1: i64,
    chrom2: &str,
    pos2: i64,
    read_len: i64,
    tags: &str,
) -> crate::containers::ReadPair {
    let read1 = create_test_read(chrom1, pos1, read_len);
    let mut read2 = create_test_read(chrom2, pos2, read_len);
    read2.is_reverse = true;
    let insert_size = if chrom1 == chrom2 {
        std::cmp::max(read1.end, read2.end) - std::cmp::min(read1.pos, read2.pos)
    } else {
        0
    };
    crate::containers::ReadPair {
        name: name.to_string(),
        read1,
        read2,
        insert_size,
        sv_tags: crate::containers::SvTagSet::from_record_value(tags),
    }
}
