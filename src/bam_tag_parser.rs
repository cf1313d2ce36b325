use rust_htslib::bam::{self, ext::BamRecordExtensions, record::Record};

use crate::{
    containers::{ReadEnd, SvTagSet},
    errors::SvError,
    utils,
};

/// Quality value htslib stores when a record has no base qualities
const MISSING_QUAL: u8 = 0xff;

/// Retrieve a string aux tag from a bam record.
///
/// Returns an input error if the tag is present with a non-string value.
pub fn get_optional_string_aux_tag(
    record: &Record,
    aux_tag: &[u8],
) -> Result<Option<String>, SvError> {
    match record.aux(aux_tag) {
        Ok(aux_val) => match aux_val {
            bam::record::Aux::String(val) => Ok(Some(val.to_string())),
            _ => Err(unexpected_aux_val_err(record, aux_tag, aux_val)),
        },
        _ => Ok(None),
    }
}

/// Retrieve an integer aux tag of any integer width from a bam record
pub fn get_optional_integer_aux_tag(
    record: &Record,
    aux_tag: &[u8],
) -> Result<Option<i64>, SvError> {
    match record.aux(aux_tag) {
        Ok(aux_val) => match aux_val {
            bam::record::Aux::I8(val) => Ok(Some(val as i64)),
            bam::record::Aux::U8(val) => Ok(Some(val as i64)),
            bam::record::Aux::I16(val) => Ok(Some(val as i64)),
            bam::record::Aux::U16(val) => Ok(Some(val as i64)),
            bam::record::Aux::I32(val) => Ok(Some(val as i64)),
            bam::record::Aux::U32(val) => Ok(Some(val as i64)),
            _ => Err(unexpected_aux_val_err(record, aux_tag, aux_val)),
        },
        _ => Ok(None),
    }
}

/// Parse the SV evidence labels of a record. Records without the tag
/// were not processed by the upstream tagging stage and cannot be used.
pub fn get_sv_tags(record: &Record) -> Result<SvTagSet, SvError> {
    match get_optional_string_aux_tag(record, utils::SV_AUX_TAG)? {
        Some(value) => Ok(SvTagSet::from_record_value(&value)),
        None => Err(SvError::Input(format!(
            "Read {} lacks the required {} tag; run the SV tagging step first",
            get_readname(record),
            String::from_utf8_lossy(utils::SV_AUX_TAG),
        ))),
    }
}

pub fn get_readname(record: &Record) -> String {
    String::from_utf8_lossy(record.qname()).to_string()
}

/// Floor of the mean base quality. Records without qualities report zero.
pub fn get_mean_base_quality(qual: &[u8]) -> u8 {
    if qual.is_empty() || qual.iter().all(|q| *q == MISSING_QUAL) {
        return 0;
    }
    let total: u64 = qual.iter().map(|q| *q as u64).sum();
    (total / qual.len() as u64) as u8
}

/// Summarise one mapped record as a read end on the given contig
pub fn get_read_end(record: &Record, chrom: String) -> ReadEnd {
    ReadEnd {
        chrom,
        pos: record.pos(),
        end: record.reference_end(),
        mapq: record.mapq(),
        base_quality: get_mean_base_quality(record.qual()),
        is_reverse: record.is_reverse(),
    }
}

fn unexpected_aux_val_err(record: &Record, aux_tag: &[u8], aux_val: bam::record::Aux<'_>) -> SvError {
    SvError::Input(format!(
        "Unexpected {} tag format in read {}: {:?}",
        String::from_utf8_lossy(aux_tag),
        get_readname(record),
        aux_val,
    ))
}
