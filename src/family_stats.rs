use log::{debug, info};
use rust_htslib::bam::{self, Read};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::bam_tag_parser::{get_optional_integer_aux_tag, get_readname};
use crate::errors::SvError;
use crate::utils::is_local_file;

const FAMILY_SIZE_TAG: &[u8] = b"FM";
const REVERSED_COUNT_TAG: &[u8] = b"RV";
const BARCODE_PASS_TAG: &[u8] = b"FP";

/// Thresholds for counting a consolidated record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FamilyStatsSettings {
    pub min_mapq: u8,
    pub min_family_size: u32,
}

/// Family size summary of a BAM of consolidated reads.
///
/// Only read 1 of each primary, QC-passing record is counted, so each family is seen once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FamilyStats {
    pub records_read: u64,
    pub passed: u64,
    pub flag_failed: u64,
    pub barcode_failed: u64,
    pub family_size_failed: u64,
    /// family size -> number of families
    pub family_sizes: BTreeMap<u32, u64>,
    /// reverse-complemented reads in a family -> number of families
    pub reversed_counts: BTreeMap<u32, u64>,
    pub summed_family_size: u64,
    pub summed_real_family_size: u64,
    pub real_families: u64,
    pub summed_reversed: u64,
    pub summed_real_reversed: u64,
    /// raw reads behind every record with a passing barcode, regardless of the other filters
    pub raw_reads: u64,
    /// raw reads in families of at least the minimum family size
    pub raw_reads_at_min_family_size: u64,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn tag_as_count(record: &bam::Record, aux_tag: &[u8], value: i64) -> Result<u32, SvError> {
    u32::try_from(value).map_err(|_| {
        SvError::Input(format!(
            "Negative {} tag in read {}: {}",
            String::from_utf8_lossy(aux_tag),
            get_readname(record),
            value
        ))
    })
}

impl FamilyStats {
    /// Count one record. A record without the family size tag is an input error.
    pub fn add_record(
        &mut self,
        record: &bam::Record,
        settings: &FamilyStatsSettings,
    ) -> Result<(), SvError> {
        self.records_read += 1;
        if record.is_secondary()
            || record.is_supplementary()
            || record.is_quality_check_failed()
            || record.is_last_in_template()
        {
            self.flag_failed += 1;
            return Ok(());
        }
        // records from tools that do not mark barcode QC carry no FP tag and pass
        if get_optional_integer_aux_tag(record, BARCODE_PASS_TAG)? == Some(0) {
            self.barcode_failed += 1;
            return Ok(());
        }
        let family_size = match get_optional_integer_aux_tag(record, FAMILY_SIZE_TAG)? {
            Some(value) => tag_as_count(record, FAMILY_SIZE_TAG, value)?,
            None => {
                return Err(SvError::Input(format!(
                    "Read {} lacks the {} tag; consolidate the reads first",
                    get_readname(record),
                    String::from_utf8_lossy(FAMILY_SIZE_TAG)
                )))
            }
        };
        let reversed = match get_optional_integer_aux_tag(record, REVERSED_COUNT_TAG)? {
            Some(value) => tag_as_count(record, REVERSED_COUNT_TAG, value)?,
            None => 0,
        };

        self.raw_reads += family_size as u64;
        if family_size >= settings.min_family_size {
            self.raw_reads_at_min_family_size += family_size as u64;
        }

        if record.mapq() < settings.min_mapq {
            self.flag_failed += 1;
            return Ok(());
        }
        if family_size < settings.min_family_size {
            self.family_size_failed += 1;
            return Ok(());
        }
        self.passed += 1;
        self.summed_family_size += family_size as u64;
        self.summed_reversed += reversed as u64;
        if family_size > 1 {
            self.real_families += 1;
            self.summed_real_family_size += family_size as u64;
            self.summed_real_reversed += reversed as u64;
        }
        *self.family_sizes.entry(family_size).or_insert(0) += 1;
        *self.reversed_counts.entry(reversed).or_insert(0) += 1;
        Ok(())
    }

    pub fn failed(&self) -> u64 {
        self.flag_failed + self.barcode_failed + self.family_size_failed
    }

    pub fn mean_family_size(&self) -> f64 {
        ratio(self.summed_family_size, self.passed)
    }

    /// Mean size of families with more than one read
    pub fn mean_real_family_size(&self) -> f64 {
        ratio(self.summed_real_family_size, self.real_families)
    }

    /// Fraction of raw reads that sit in families of at least the minimum size
    pub fn fraction_at_min_family_size(&self) -> f64 {
        ratio(self.raw_reads_at_min_family_size, self.raw_reads)
    }
}

/// Collect family size statistics from a BAM of consolidated reads
pub fn collect_family_stats(
    bam_filename: &Path,
    settings: &FamilyStatsSettings,
) -> Result<FamilyStats, SvError> {
    let start_time = SystemTime::now();
    let bam_name_str = bam_filename.display().to_string();
    if !is_local_file(bam_filename) {
        return Err(SvError::Input(format!(
            "Input BAM does not exist: \"{bam_name_str}\""
        )));
    }
    let mut bam_reader = bam::Reader::from_path(bam_filename)
        .map_err(|e| SvError::Input(format!("Failed to open BAM \"{bam_name_str}\": {e}")))?;

    let mut stats = FamilyStats::default();
    let mut record = bam::Record::new();
    while let Some(result) = bam_reader.read(&mut record) {
        if let Err(e) = result {
            return Err(SvError::Input(format!(
                "Error parsing BAM \"{bam_name_str}\": {e}"
            )));
        }
        stats.add_record(&record, settings)?;
    }
    info!(
        "{} of {} records from {} pass family filters",
        stats.passed, stats.records_read, bam_name_str
    );
    debug!(
        "Family statistics: {}s",
        start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    );
    Ok(stats)
}

/// Write the summary lines followed by the family size and reversed-read histograms
pub fn write_family_stats<W: Write>(
    writer: &mut W,
    stats: &FamilyStats,
    settings: &FamilyStatsSettings,
) -> io::Result<()> {
    writeln!(writer, "#Number passing filters: {}", stats.passed)?;
    writeln!(writer, "#Number failing filters: {}", stats.failed())?;
    writeln!(writer, "#Number failing FP filters: {}", stats.barcode_failed)?;
    writeln!(writer, "#Number failing FM filters: {}", stats.family_size_failed)?;
    writeln!(writer, "#Number failing flag filters: {}", stats.flag_failed)?;
    writeln!(writer, "#Summed FM (total founding reads): {}", stats.summed_family_size)?;
    writeln!(
        writer,
        "#Summed FM (total founding reads), (FM > 1): {}",
        stats.summed_real_family_size
    )?;
    writeln!(writer, "#Summed RV (total reverse-complemented reads): {}", stats.summed_reversed)?;
    writeln!(
        writer,
        "#Summed RV (total reverse-complemented reads), (FM > 1): {}",
        stats.summed_real_reversed
    )?;
    writeln!(
        writer,
        "#RV fraction for all read families: {:.6}",
        ratio(stats.summed_reversed, stats.summed_family_size)
    )?;
    writeln!(
        writer,
        "#RV fraction for real read families: {:.6}",
        ratio(stats.summed_real_reversed, stats.summed_real_family_size)
    )?;
    writeln!(writer, "#Mean Family Size (all)\t{:.6}", stats.mean_family_size())?;
    writeln!(writer, "#Mean Family Size (real)\t{:.6}", stats.mean_real_family_size())?;
    writeln!(
        writer,
        "#Fraction of raw reads with >= minFM {}: {:.6}",
        settings.min_family_size,
        stats.fraction_at_min_family_size()
    )?;
    writeln!(writer, "#Family size\tNumber of families")?;
    for (family_size, count) in stats.family_sizes.iter() {
        writeln!(writer, "{family_size}\t{count}")?;
    }
    writeln!(writer, "#RV'd in family\tNumber of families")?;
    for (reversed, count) in stats.reversed_counts.iter() {
        writeln!(writer, "{reversed}\t{count}")?;
    }
    Ok(())
}

/// Write the report to `out_path`, or to stdout when no path is given
pub fn write_family_stats_report(
    stats: &FamilyStats,
    settings: &FamilyStatsSettings,
    out_path: Option<&Path>,
) -> Result<(), SvError> {
    match out_path {
        Some(path) => {
            let file_handle = File::create(path).map_err(|e| SvError::io(e, path))?;
            let mut buf_writer = BufWriter::new(file_handle);
            write_family_stats(&mut buf_writer, stats, settings)
                .and_then(|_| buf_writer.flush())
                .map_err(|e| SvError::io(e, path))?;
            info!("Family statistics written to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            write_family_stats(&mut stdout, stats, settings)
                .and_then(|_| stdout.flush())
                .map_err(|e| SvError::io(e, "stdout"))?;
        }
    }
    Ok(())
}
