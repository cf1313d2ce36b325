use bgzip::{BGZFWriter, Compression};
use log::{debug, info};
use serde_derive::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::SvError;
use crate::utils;
use crate::variant_formatter::VariantLine;

const COLUMN_HEADER: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO";

/// Serializable summary of a calling run
#[derive(Debug, Serialize)]
pub struct TranslocationCalls<'a> {
    pub version: String,
    pub source: String,
    pub reference: String,
    pub variants: &'a [VariantLine],
}

/// Default output path: the BAM path with a trailing `.bam` replaced by `.putativeSV.txt`
pub fn default_output_path(bam_path: &Path) -> PathBuf {
    PathBuf::from(utils::replace_suffix(bam_path, ".bam", ".putativeSV.txt"))
}

/// Write the variant lines as text, BGZF-compressed when the output path ends in `.gz`,
/// plus an optional pretty JSON summary
pub fn write_results(
    lines: &[VariantLine],
    out_path: &Path,
    json_path_opt: Option<&Path>,
    source: &str,
    reference: &str,
) -> Result<(), SvError> {
    debug!("{} variant lines to write", lines.len());
    let header = build_header(reference);
    let file_handle = File::create(out_path).map_err(|e| SvError::io(e, out_path))?;
    let mut buf_writer = BufWriter::new(file_handle);

    if out_path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
        let mut writer = BGZFWriter::new(&mut buf_writer, Compression::default());
        write_lines(&mut writer, &header, lines).map_err(|e| SvError::io(e, out_path))?;
        writer.flush().map_err(|e| SvError::io(e, out_path))?;
    } else {
        write_lines(&mut buf_writer, &header, lines).map_err(|e| SvError::io(e, out_path))?;
    }
    buf_writer.flush().map_err(|e| SvError::io(e, out_path))?;
    info!("Variants written to {}", out_path.display());

    if let Some(json_path) = json_path_opt {
        let calls = TranslocationCalls {
            version: env!("CARGO_PKG_VERSION").to_string(),
            source: source.to_string(),
            reference: reference.to_string(),
            variants: lines,
        };
        write_json(&calls, json_path)?;
        info!("JSON written to {}", json_path.display());
    }
    Ok(())
}

fn build_header(reference: &str) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let file_date = chrono::Local::now().format("%Y%m%d");
    format!(
        "##source=svtrans v{version}\n##fileDate={file_date}\n##reference={reference}\n{COLUMN_HEADER}\n"
    )
}

/// Each line is written whole, so a failure leaves complete lines behind
fn write_lines<W: Write>(writer: &mut W, header: &str, lines: &[VariantLine]) -> io::Result<()> {
    writer.write_all(header.as_bytes())?;
    for line in lines.iter() {
        writer.write_all(format!("{line}\n").as_bytes())?;
    }
    Ok(())
}

/// Write the json summary
fn write_json(calls: &TranslocationCalls, json_path: &Path) -> Result<(), SvError> {
    let json_string = serde_json::to_string_pretty(calls)
        .map_err(|e| SvError::Input(format!("Failed to serialize variants as JSON: {e}")))?;
    let file_handle = File::create(json_path).map_err(|e| SvError::io(e, json_path))?;
    let mut writer = BufWriter::new(file_handle);
    writer
        .write_all(json_string.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| SvError::io(e, json_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::{GenomicInterval, RearrangementType};
    use std::io::Read;

    fn test_line() -> VariantLine {
        VariantLine {
            chrom: "chr1".to_string(),
            pos: 1011,
            end: 1050,
            ref_base: 'A',
            rearrangement: RearrangementType::Intrachromosomal,
            num_partners: 1,
            tdist: Some(60000),
            partners: vec![GenomicInterval::new("chr1".to_string(), 61010, 61050)],
            nsegments: 2,
            source: "sample.bam".to_string(),
            reference: "ref.fa".to_string(),
        }
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/data/sample.bam")),
            PathBuf::from("/data/sample.putativeSV.txt")
        );
    }

    #[test]
    fn test_write_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("sample.putativeSV.txt");
        write_results(&[test_line()], &out_path, None, "sample.bam", "ref.fa").unwrap();

        let contents = std::fs::read_to_string(&out_path).unwrap();
        let rows: Vec<&str> = contents.lines().collect();
        assert!(rows[0].starts_with("##source=svtrans v"));
        assert!(rows[1].starts_with("##fileDate="));
        assert_eq!(rows[1].len(), "##fileDate=".len() + 8);
        assert_eq!(rows[2], "##reference=ref.fa");
        assert_eq!(rows[3], COLUMN_HEADER);
        assert!(rows[4].starts_with("chr1\t1011\t.\tA\t<TRA>\t.\tPASS\t"));
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_write_bgzf_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("sample.putativeSV.txt.gz");
        let json_path = dir.path().join("sample.json");
        write_results(
            &[test_line()],
            &out_path,
            Some(json_path.as_path()),
            "sample.bam",
            "ref.fa",
        )
        .unwrap();

        let file = File::open(&out_path).unwrap();
        let mut decoder = flate2::read::MultiGzDecoder::new(file);
        let mut contents = String::new();
        decoder.read_to_string(&mut contents).unwrap();
        assert!(contents.contains("TDIST=60000"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["source"], "sample.bam");
        assert_eq!(json["variants"][0]["chrom"], "chr1");
        assert_eq!(
            json["variants"][0]["rearrangement"],
            "IntrachromosomalRearrangement"
        );
        assert_eq!(json["variants"][0]["partners"][0]["start"], 61010);
    }

    #[test]
    fn test_unwritable_output_is_io_error() {
        let result = write_results(
            &[test_line()],
            Path::new("/nonexistent/dir/out.txt"),
            None,
            "sample.bam",
            "ref.fa",
        );
        assert!(matches!(result, Err(SvError::Io { .. })));
    }
}
