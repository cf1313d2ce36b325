use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::errors::SvError;
use crate::family_stats::FamilyStatsSettings;
use crate::translocation_caller::CallerSettings;
use crate::utils;

#[derive(Clone, Parser)]
#[clap(author, version, about,
    after_help = "This program comes with ABSOLUTELY NO WARRANTY; it is intended for
Research Use Only and not for use in diagnostic procedures.")]
pub struct Arguments {
    #[clap(subcommand)]
    pub command: Command,

    /// Optional flag to print verbose output for debugging purposes.
    #[clap(long = "verbose", global = true)]
    pub verbose: bool,
}

#[derive(Clone, Subcommand)]
pub enum Command {
    /// Call putative translocations from an SV-tagged, name-sorted BAM
    #[clap(name = "call")]
    Call(CallArgs),

    /// Collapse barcoded FASTQ reads into one consensus read per barcode family
    #[clap(name = "consolidate")]
    Consolidate(ConsolidateArgs),

    /// Family size histogram and raw-read fraction of a BAM of consolidated reads
    #[clap(name = "famstats")]
    Famstats(FamstatsArgs),
}

#[derive(Clone, Args)]
pub struct CallArgs {
    /// Name-sorted BAM whose records carry the SV tag.
    #[clap(required = true)]
    #[clap(long = "bam")]
    #[clap(value_name = "BAM")]
    pub bam_filename: PathBuf,

    /// BED file of capture regions. GZIP files allowed.
    #[clap(long = "bed")]
    #[clap(value_name = "BED")]
    pub capture_bed_path: Option<PathBuf>,

    /// faidx-indexed reference FASTA, used for the REF column.
    #[clap(long = "ref")]
    #[clap(value_name = "FASTA")]
    pub reference_path: Option<PathBuf>,

    /// Output path. Defaults to the BAM path with `.bam` replaced by `.putativeSV.txt`;
    /// paths ending in `.gz` are BGZF-compressed.
    #[clap(long = "out")]
    #[clap(value_name = "TXT")]
    pub out_path: Option<PathBuf>,

    /// Optional JSON summary of the reported variants
    #[clap(long = "json")]
    #[clap(value_name = "JSON")]
    pub json_path: Option<PathBuf>,

    /// Minimum mapping quality of both reads of a pair
    #[clap(long = "min-mq")]
    #[clap(value_name = "INT")]
    #[clap(default_value = "0")]
    pub min_mapq: u8,

    /// Minimum mean base quality of both reads of a pair
    #[clap(long = "min-bq")]
    #[clap(value_name = "INT")]
    #[clap(default_value = "0")]
    pub min_base_quality: u8,

    /// Minimum read depth for a pileup run
    #[clap(long = "min-clust-depth")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::MIN_CLUST_DEPTH)]
    pub min_clust_depth: u32,

    /// Minimum length of a pileup run
    #[clap(long = "min-pileup-len")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::MIN_PILEUP_LEN)]
    pub min_pileup_len: i64,

    /// Largest insert size difference between neighbouring pairs of a cluster
    #[clap(long = "ins-distance")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::INS_DISTANCE)]
    pub ins_distance: i64,

    /// Padding added to capture regions for interchromosomal calling
    #[clap(long = "bed-dist")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::BED_DIST)]
    pub bed_dist: i64,

    /// Intervals closer than this are merged into one locus interval
    #[clap(long = "merge-dist")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::MERGE_DIST)]
    pub merge_dist: i64,

    /// Minimum breakpoint distance for intrachromosomal events
    #[clap(long = "min-tdist")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::MIN_INTRACHROMOSOMAL_TDIST)]
    pub min_tdist: i64,
}

impl CallArgs {
    /// Build validated caller settings from the thresholds
    pub fn caller_settings(&self) -> Result<CallerSettings, SvError> {
        let settings = CallerSettings {
            min_mapq: self.min_mapq,
            min_base_quality: self.min_base_quality,
            min_clust_depth: self.min_clust_depth,
            min_pileup_len: self.min_pileup_len,
            ins_distance: self.ins_distance,
            bed_dist: self.bed_dist,
            merge_dist: self.merge_dist,
            min_tdist: self.min_tdist,
            intrachromosomal_filter: utils::INTRACHROMOSOMAL_TAG_FILTER.parse()?,
            interchromosomal_filter: utils::INTERCHROMOSOMAL_TAG_FILTER.parse()?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn capture_bed_path(&self) -> Result<&PathBuf, SvError> {
        self.capture_bed_path
            .as_ref()
            .ok_or_else(|| SvError::Configuration("`--bed` capture regions are required".to_string()))
    }

    pub fn reference_path(&self) -> Result<&PathBuf, SvError> {
        self.reference_path
            .as_ref()
            .ok_or_else(|| SvError::Configuration("`--ref` reference FASTA is required".to_string()))
    }
}

#[derive(Clone, Args)]
pub struct ConsolidateArgs {
    /// Barcoded FASTQ, with `|BS=<barcode>` in each read description. GZIP files allowed.
    #[clap(required = true)]
    #[clap(long = "fastq")]
    #[clap(value_name = "FASTQ")]
    pub fastq_path: PathBuf,

    /// Output path. Defaults to the input base name with `.cons.fastq`;
    /// paths ending in `.gz` are gzip-compressed.
    #[clap(long = "out")]
    #[clap(value_name = "FASTQ")]
    pub out_path: Option<PathBuf>,
}

#[derive(Clone, Args)]
pub struct FamstatsArgs {
    /// BAM of consolidated reads carrying FM, and optionally RV and FP, tags.
    #[clap(required = true)]
    #[clap(long = "bam")]
    #[clap(value_name = "BAM")]
    pub bam_filename: PathBuf,

    /// Report path. Written to stdout when omitted.
    #[clap(long = "out")]
    #[clap(value_name = "TXT")]
    pub out_path: Option<PathBuf>,

    /// Minimum mapping quality of a counted family
    #[clap(long = "min-mq")]
    #[clap(value_name = "INT")]
    #[clap(default_value = "0")]
    pub min_mapq: u8,

    /// Minimum family size of a counted family
    #[clap(long = "min-fm")]
    #[clap(value_name = "INT")]
    #[clap(default_value = "0")]
    pub min_family_size: u32,
}

impl FamstatsArgs {
    pub fn family_stats_settings(&self) -> FamilyStatsSettings {
        FamilyStatsSettings {
            min_mapq: self.min_mapq,
            min_family_size: self.min_family_size,
        }
    }
}

pub fn get_args() -> Arguments {
    Arguments::parse()
}
