use core::fmt;
use serde_derive::Serialize;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::containers::{GenomicInterval, PutativeLocus, RearrangementType};
use crate::ingester::ReferenceLookup;

/// One output record for a putative rearrangement.
///
/// Equality, hashing and ordering only look at the event itself
/// (position, type, partners and segment count), so the same event
/// found from different candidates collapses to one line.
#[derive(Debug, Clone, Serialize)]
pub struct VariantLine {
    pub chrom: String,
    /// 1-based start of the primary interval
    pub pos: i64,
    pub end: i64,
    pub ref_base: char,
    pub rearrangement: RearrangementType,
    pub num_partners: usize,
    pub tdist: Option<i64>,
    pub partners: Vec<GenomicInterval>,
    pub nsegments: usize,
    pub source: String,
    pub reference: String,
}

type VariantKey<'a> = (
    &'a str,
    i64,
    i64,
    RearrangementType,
    usize,
    Option<i64>,
    &'a [GenomicInterval],
    usize,
);

impl VariantLine {
    fn key(&self) -> VariantKey<'_> {
        (
            &self.chrom,
            self.pos,
            self.end,
            self.rearrangement,
            self.num_partners,
            self.tdist,
            &self.partners,
            self.nsegments,
        )
    }

    /// Lines without partners are never reported. Intrachromosomal events must also
    /// span at least `min_tdist`.
    pub fn passes_output_filters(&self, min_tdist: i64) -> bool {
        if self.num_partners == 0 {
            return false;
        }
        match self.rearrangement {
            RearrangementType::Intrachromosomal => self.tdist.unwrap_or(0) >= min_tdist,
            RearrangementType::Interchromosomal => true,
        }
    }

    fn info_field(&self) -> String {
        let mut info = vec![
            format!("TransType={}", self.rearrangement),
            format!("NumPartners={}", self.num_partners),
        ];
        if let Some(tdist) = self.tdist {
            info.push(format!("TDIST={tdist}"));
        }
        let partners: Vec<String> = self.partners.iter().map(|p| p.to_string()).collect();
        info.push(format!("PARTNERS={}", partners.join(",")));
        info.push(format!("NSEGMENTS={}", self.nsegments));
        info.push(format!("SOURCE={}", self.source));
        info.push(format!("REFERENCE={}", self.reference));
        info.join(";")
    }
}

impl PartialEq for VariantLine {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for VariantLine {}

impl Hash for VariantLine {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for VariantLine {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VariantLine {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for VariantLine {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}\t{}\t.\t{}\t<TRA>\t.\tPASS\t{}",
            self.chrom,
            self.pos,
            self.ref_base,
            self.info_field()
        )
    }
}

/// Turn a locus into an output line anchored at its primary interval.
/// Loci without segments or without a primary interval produce nothing.
pub fn format_variant_line(
    locus: &PutativeLocus,
    reference: &ReferenceLookup,
) -> Option<VariantLine> {
    if locus.nsegments == 0 {
        return None;
    }
    let primary = locus.primary.as_ref()?;
    Some(VariantLine {
        chrom: primary.chrom.clone(),
        pos: primary.start + 1,
        end: primary.end,
        ref_base: reference.base_at(&primary.chrom, primary.start),
        rearrangement: locus.rearrangement,
        num_partners: locus.num_partners,
        tdist: locus.tdist,
        partners: locus.partners.clone(),
        nsegments: locus.nsegments,
        source: locus.source.clone(),
        reference: reference.path().to_string(),
    })
}
