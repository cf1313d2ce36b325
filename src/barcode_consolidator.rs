use bio::io::fastq;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::SvError;
use crate::utils;

const BARCODE_KEY: &str = "|BS=";
const PHRED_OFFSET: u8 = 33;
const NUCLEOTIDES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Counts reported by a consolidation run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsolidationStats {
    pub records_read: usize,
    pub families_written: usize,
    pub records_skipped: usize,
}

/// Per-position evidence for all reads sharing one barcode
struct BarcodeFamily {
    first_desc: String,
    size: u32,
    /// A, C, G, T, N
    nuc_counts: Vec<[u32; 5]>,
    /// phred sums for A, C, G, T
    phred_sums: Vec<[u64; 4]>,
    max_quals: Vec<u8>,
}

impl BarcodeFamily {
    fn new(first_desc: String, read_len: usize) -> Self {
        BarcodeFamily {
            first_desc,
            size: 0,
            nuc_counts: vec![[0; 5]; read_len],
            phred_sums: vec![[0; 4]; read_len],
            max_quals: vec![PHRED_OFFSET; read_len],
        }
    }

    fn read_len(&self) -> usize {
        self.max_quals.len()
    }

    fn push(&mut self, seq: &[u8], qual: &[u8]) {
        for (idx, (base, quality)) in seq.iter().zip(qual.iter()).enumerate() {
            let phred = quality.saturating_sub(PHRED_OFFSET) as u64;
            match nucleotide_index(*base) {
                Some(nuc_idx) => {
                    self.nuc_counts[idx][nuc_idx] += 1;
                    self.phred_sums[idx][nuc_idx] += phred;
                }
                None => self.nuc_counts[idx][4] += 1,
            }
            self.max_quals[idx] = self.max_quals[idx].max(*quality);
        }
        self.size += 1;
    }

    /// Consensus sequence with the agreement count and combined phred value per position,
    /// plus the total number of disagreeing bases
    fn consensus(&self) -> (Vec<u8>, Vec<u32>, Vec<i64>, u32) {
        let mut seq = Vec::with_capacity(self.read_len());
        let mut agrees = Vec::with_capacity(self.read_len());
        let mut phred_values = Vec::with_capacity(self.read_len());
        let mut disagreements = 0;
        for idx in 0..self.read_len() {
            match argmax_phred(&self.phred_sums[idx]) {
                Some(nuc_idx) => {
                    let agree_count = self.nuc_counts[idx][nuc_idx];
                    seq.push(NUCLEOTIDES[nuc_idx]);
                    agrees.push(agree_count);
                    phred_values.push(fisher_phred(self.size, self.phred_sums[idx][nuc_idx]));
                    disagreements += self.size - agree_count;
                }
                // no called base at this position in any read
                None => {
                    seq.push(b'N');
                    agrees.push(0);
                    phred_values.push(0);
                    disagreements += self.size;
                }
            }
        }
        (seq, agrees, phred_values, disagreements)
    }
}

fn nucleotide_index(base: u8) -> Option<usize> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Base with the highest phred sum. A later base must be strictly higher to win.
fn argmax_phred(phred_sums: &[u64; 4]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, sum) in phred_sums.iter().enumerate() {
        if *sum == 0 {
            continue;
        }
        match best {
            Some(best_idx) if *sum <= phred_sums[best_idx] => {}
            _ => best = Some(idx),
        }
    }
    best
}

/// Fisher's combined p-value for `num_pvalues` agreeing observations whose phred values
/// sum to `phred_sum`, returned as a phred value.
///
/// With chi2 = 2 * sum(-ln p), the p-value is the upper regularised incomplete gamma
/// Q(k, chi2 / 2), which for integer k is exp(-x) * sum_{i<k} x^i / i!.
/// The terms are summed in log space with a running log-factorial, so the cost is linear in k.
pub fn fisher_phred(num_pvalues: u32, phred_sum: u64) -> i64 {
    if num_pvalues == 0 || phred_sum == 0 {
        return 0;
    }
    let x = phred_sum as f64 * std::f64::consts::LN_10 / 10.0;
    let ln_x = x.ln();
    let mut ln_factorial = 0.0;
    let mut log_terms = Vec::with_capacity(num_pvalues as usize);
    for i in 0..num_pvalues {
        if i > 1 {
            ln_factorial += (i as f64).ln();
        }
        log_terms.push(i as f64 * ln_x - ln_factorial - x);
    }
    let max_term = log_terms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_pvalue = max_term
        + log_terms
            .iter()
            .map(|term| (term - max_term).exp())
            .sum::<f64>()
            .ln();
    let phred = -10.0 * log_pvalue / std::f64::consts::LN_10;
    (phred + 1e-6).floor().max(0.0) as i64
}

/// Pull the molecular barcode from a FASTQ description such as `|FP=IndexPass|BS=ACGT`
pub fn get_barcode(desc: &str) -> Option<&str> {
    let start = desc.find(BARCODE_KEY)? + BARCODE_KEY.len();
    let barcode = desc[start..]
        .split(|c: char| c == '|' || c.is_whitespace())
        .next()
        .unwrap_or("");
    if barcode.is_empty() {
        None
    } else {
        Some(barcode)
    }
}

/// Default output for a FASTQ path: compression and FASTQ extensions are replaced
/// by `.cons.fastq`
pub fn consolidated_output_path(fastq_path: &Path) -> PathBuf {
    let path_str = fastq_path.to_string_lossy();
    let mut base: &str = path_str.strip_suffix(".gz").unwrap_or(&path_str);
    for ext in [".fastq", ".fq"] {
        if let Some(stripped) = base.strip_suffix(ext) {
            base = stripped;
            break;
        }
    }
    PathBuf::from(format!("{base}.cons.fastq"))
}

fn open_fastq(fastq_path: &Path) -> Result<fastq::Reader<std::io::BufReader<Box<dyn Read>>>, SvError> {
    if !utils::is_local_file(fastq_path) {
        return Err(SvError::Input(format!(
            "FASTQ not found: {}",
            fastq_path.display()
        )));
    }
    let file = File::open(fastq_path).map_err(|e| SvError::io(e, fastq_path))?;
    let reader: Box<dyn Read> = if utils::is_gzipped(fastq_path)? {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(fastq::Reader::new(reader))
}

/// Collapse reads sharing a molecular barcode into one consensus read per family.
/// Families are written in barcode order; the output is gzip-compressed when its path
/// ends in `.gz`.
pub fn consolidate_fastq(fastq_path: &Path, out_path: &Path) -> Result<ConsolidationStats, SvError> {
    let start_time = SystemTime::now();
    let reader = open_fastq(fastq_path)?;
    let mut stats = ConsolidationStats::default();
    let mut families: BTreeMap<String, BarcodeFamily> = BTreeMap::new();

    for result in reader.records() {
        let record = result.map_err(|e| {
            SvError::Input(format!(
                "Failed to parse FASTQ {}: {}",
                fastq_path.display(),
                e
            ))
        })?;
        stats.records_read += 1;
        let desc = record.desc().unwrap_or("");
        let barcode = get_barcode(desc).ok_or_else(|| {
            SvError::Input(format!("Read {} has no {} barcode", record.id(), BARCODE_KEY))
        })?;
        let family = families
            .entry(barcode.to_string())
            .or_insert_with(|| BarcodeFamily::new(desc.to_string(), record.seq().len()));
        if record.seq().len() != family.read_len() || record.qual().len() != family.read_len() {
            warn!(
                "Skipping read {}: length {} differs from family {} length {}",
                record.id(),
                record.seq().len(),
                barcode,
                family.read_len()
            );
            stats.records_skipped += 1;
            continue;
        }
        family.push(record.seq(), record.qual());
    }
    debug!("{} barcode families from {} reads", families.len(), stats.records_read);

    let file_handle = File::create(out_path).map_err(|e| SvError::io(e, out_path))?;
    stats.families_written = if out_path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
        let mut encoder = GzEncoder::new(file_handle, flate2::Compression::default());
        let written = write_families(&mut encoder, &families, out_path)?;
        encoder.finish().map_err(|e| SvError::io(e, out_path))?;
        written
    } else {
        write_families(BufWriter::new(file_handle), &families, out_path)?
    };

    info!(
        "{} reads consolidated into {} families ({} skipped), written to {}",
        stats.records_read,
        stats.families_written,
        stats.records_skipped,
        out_path.display()
    );
    debug!(
        "Consolidation: {}s",
        start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    );
    Ok(stats)
}

fn to_csv<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<String>>()
        .join(",")
}

/// Write one consensus record per non-empty family, returning the number written
fn write_families<W: Write>(
    writer: W,
    families: &BTreeMap<String, BarcodeFamily>,
    out_path: &Path,
) -> Result<usize, SvError> {
    let mut fastq_writer = fastq::Writer::new(writer);
    let mut written = 0;
    for (barcode, family) in families.iter() {
        if family.size == 0 {
            continue;
        }
        let (seq, agrees, phred_values, disagreements) = family.consensus();
        let desc = format!(
            "{}|FM={}|ND={}|FA={}|PV={}",
            family.first_desc,
            family.size,
            disagreements,
            to_csv(&agrees),
            to_csv(&phred_values)
        );
        fastq_writer
            .write(barcode, Some(desc.as_str()), &seq, &family.max_quals)
            .map_err(|e| SvError::io(e, out_path))?;
        written += 1;
    }
    fastq_writer.flush().map_err(|e| SvError::io(e, out_path))?;
    Ok(written)
}
