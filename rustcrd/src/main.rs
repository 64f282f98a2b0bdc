use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, LevelFilter};

use rustcrd::batch::{process_batch, BatchSettings};
use rustcrd::calfile;
use rustcrd::error::CrdError;
use rustcrd::export;
use rustcrd::processor::CrdFileProcessor;

/// Evaluate CRD files: apply filters, build spectra, compute integrals,
/// and export the results as csv.
#[derive(Parser)]
#[command(name = "crdeval", version, about)]
struct Cli {
    /// CRD files to evaluate
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Calibration file applied to all inputs (default: each file's own
    /// .cal.json, if present)
    #[arg(short, long)]
    calibration: Option<PathBuf>,

    /// Directory for csv exports (default: next to each CRD file)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Also export the full spectrum per file
    #[arg(long)]
    export_spectra: bool,

    /// Verbose output (-v: info, -vv: debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match run(&cli) {
        Ok(failures) if failures == 0 => ExitCode::SUCCESS,
        Ok(failures) => {
            error!("{failures} file(s) failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<usize, CrdError> {
    let shared_cal = match &cli.calibration {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            let calibration: calfile::CalibrationFile =
                serde_json::from_reader(std::io::BufReader::new(file))
                    .map_err(|e| CrdError::CalFile(format!("{}: {e}", path.display())))?;
            Some(calibration)
        }
        None => None,
    };

    let mut processors = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let mut processor = CrdFileProcessor::open(path)?;
        if let Some(calibration) = &shared_cal {
            calibration.apply_to(&mut processor)?;
        }
        info!("opened {}", processor);
        processors.push(processor);
    }

    // Every processor already carries the settings to run with, either
    // from the shared calibration or its own file; the snapshot for the
    // batch comes from the first one.
    let settings = BatchSettings::from_processor(&processors[0]);
    let outcomes = process_batch(&mut processors, &settings);

    let mut failures = 0usize;
    for (processor, outcome) in processors.iter().zip(outcomes.iter()) {
        match &outcome.result {
            Ok(()) => {
                export_results(processor, cli)?;
                print_summary(processor);
            }
            Err(err) => {
                failures += 1;
                eprintln!("{}: {err}", outcome.path.display());
            }
        }
    }
    Ok(failures)
}

fn export_results(processor: &CrdFileProcessor, cli: &Cli) -> Result<(), CrdError> {
    let stem = processor
        .path()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "crd".to_string());
    let base_dir = match &cli.out_dir {
        Some(dir) => dir.clone(),
        None => processor
            .path()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf(),
    };
    std::fs::create_dir_all(&base_dir)?;

    if processor.integrals().is_some_and(|i| !i.is_empty()) {
        export::export_integrals(processor, &base_dir.join(format!("{stem}_integrals.csv")))?;
    }
    if processor.deltas().is_some_and(|d| !d.is_empty()) {
        export::export_deltas(processor, &base_dir.join(format!("{stem}_deltas.csv")))?;
    }
    if processor.packages().is_some_and(|p| !p.is_empty()) {
        export::export_package_integrals(
            processor,
            &base_dir.join(format!("{stem}_integrals_pkg.csv")),
        )?;
    }
    if cli.export_spectra {
        export::export_spectrum(processor, &base_dir.join(format!("{stem}_spectrum.csv")))?;
    }
    Ok(())
}

fn print_summary(processor: &CrdFileProcessor) {
    println!("{}", processor.path().display());
    if let (Some(filtered), Some(report)) = (processor.filtered(), processor.exclusion_report()) {
        println!(
            "  shots: {} of {} retained, ions: {} ({} excluded)",
            filtered.retained_shots(),
            filtered.nof_shots,
            filtered.nof_ions(),
            report.total().excluded_ions
        );
    }
    if let Some(packages) = processor.packages() {
        if !packages.is_empty() {
            println!("  packages: {}", packages.len());
        }
    }
    for integral in processor.integrals_iter() {
        println!("  {integral}");
    }
}
