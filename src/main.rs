use std::time::SystemTime;

use log::{debug, error, info, warn, LevelFilter};
use std::env;
use svtrans::barcode_consolidator::{consolidate_fastq, consolidated_output_path};
use svtrans::cli::{get_args, Arguments, CallArgs, Command, ConsolidateArgs, FamstatsArgs};
use svtrans::errors::SvError;
use svtrans::family_stats::{collect_family_stats, write_family_stats_report};
use svtrans::ingester::{load_alignment_store, load_capture_regions, ReferenceLookup};
use svtrans::result_writer::{default_output_path, write_results};
use svtrans::translocation_caller::call_translocations;

fn set_up() -> Arguments {
    let args = get_args();
    let filter_level: LevelFilter = match args.verbose {
        false => LevelFilter::Info,
        true => LevelFilter::Debug,
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("\nRunning svtrans v{version}\n");

    let cmd: Vec<String> = env::args().collect();
    let cmd_str = cmd.join(" ");
    debug!("Run command: {cmd_str}");
    args
}

fn log_time(start_time: SystemTime) {
    let elapsed_time = start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0);
    let hours = elapsed_time / 3600;
    let minutes = (elapsed_time % 3600) / 60;
    let seconds = elapsed_time % 60;
    debug!("Running time: {hours}h:{minutes}m:{seconds}s");
}

/// Load the read pairs, capture regions and reference, call translocations and write them out
fn run_call(call_args: &CallArgs) -> Result<(), SvError> {
    // configuration is checked in full before any input is read
    let settings = call_args.caller_settings()?;
    let capture_bed_path = call_args.capture_bed_path()?;
    let reference_path = call_args.reference_path()?;

    let capture = load_capture_regions(capture_bed_path)?;
    let reference = ReferenceLookup::open(reference_path);
    let store = load_alignment_store(&call_args.bam_filename)?;

    let lines = call_translocations(&store, &capture, &settings, &reference);

    let out_path = call_args
        .out_path
        .clone()
        .unwrap_or_else(|| default_output_path(&call_args.bam_filename));
    write_results(
        &lines,
        &out_path,
        call_args.json_path.as_deref(),
        store.source(),
        reference.path(),
    )
}

fn run_consolidate(consolidate_args: &ConsolidateArgs) -> Result<(), SvError> {
    let out_path = consolidate_args
        .out_path
        .clone()
        .unwrap_or_else(|| consolidated_output_path(&consolidate_args.fastq_path));
    consolidate_fastq(&consolidate_args.fastq_path, &out_path)?;
    Ok(())
}

fn run_famstats(famstats_args: &FamstatsArgs) -> Result<(), SvError> {
    let settings = famstats_args.family_stats_settings();
    if settings.min_family_size == 0 {
        warn!("--min-fm is 0; every raw read counts towards the family size fraction");
    }
    let stats = collect_family_stats(&famstats_args.bam_filename, &settings)?;
    write_family_stats_report(&stats, &settings, famstats_args.out_path.as_deref())
}

fn main() {
    let args = set_up();
    let start_time = SystemTime::now();

    let result = match &args.command {
        Command::Call(call_args) => run_call(call_args),
        Command::Consolidate(consolidate_args) => run_consolidate(consolidate_args),
        Command::Famstats(famstats_args) => run_famstats(famstats_args),
    };
    if let Err(e) = result {
        error!("{e}");
        std::process::exit(e.exit_code());
    }
    log_time(start_time);
}
