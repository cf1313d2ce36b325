pub mod bam_tag_parser;
pub mod barcode_consolidator;
pub mod cli;
pub mod cluster_finder;
pub mod cluster_support_builder;
pub mod containers;
pub mod errors;
pub mod family_stats;
pub mod ingester;
pub mod locus_assembler;
pub mod pileup;
pub mod result_writer;
pub mod translocation_caller;
pub mod utils;
pub mod variant_formatter;
