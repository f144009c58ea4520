//! `filter-contaminants`: keep the reads of each sample that do not align to
//! a reference genome.
//!
//! ```bash
//! filter-contaminants --reference ref.fasta --samples sampleA.fastq.gz sampleB.fastq --threads 4
//! ```
//!
//! `minimap2` and `samtools` must be installed, on `PATH` or given with
//! `--minimap2` and `--samtools`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

use contamfilter::{pipeline::DEFAULT_COMPRESSION_LEVEL, resolve_samples, tools::DEFAULT_PRESET};
use contamfilter::{ContaminantFilter, RunReport, Sample, Toolchain};

/// A sample failed.
const EXIT_FAILURE: u8 = 1;
/// Bad arguments, detected before any sample is processed. Same code clap uses.
const EXIT_USAGE: u8 = 2;
/// All deliverables were produced but some intermediates could not be removed.
const EXIT_CLEANUP: u8 = 3;

/// Filter contaminant reads by aligning them to a reference genome and
/// keeping only the reads that do not map.
#[derive(Parser, Debug)]
#[command(name = "filter-contaminants", version, about)]
struct Args {
    /// Reference genome (FASTA)
    #[arg(long, value_name = "FASTA")]
    reference: PathBuf,

    /// Sample FASTQ files (optionally .gz or .zst) or directories containing them
    #[arg(long, required = true, num_args = 1.., value_name = "PATH")]
    samples: Vec<PathBuf>,

    /// Number of threads forwarded to minimap2 and samtools
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    threads: u16,

    /// Directory receiving intermediate and output files
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    /// minimap2 preset
    #[arg(long, default_value = DEFAULT_PRESET)]
    preset: String,

    /// minimap2 executable
    #[arg(long, default_value = "minimap2")]
    minimap2: PathBuf,

    /// samtools executable
    #[arg(long, default_value = "samtools")]
    samtools: PathBuf,

    /// gzip level of the output files
    #[arg(long, default_value_t = DEFAULT_COMPRESSION_LEVEL, value_parser = clap::value_parser!(u32).range(0..=9))]
    compression_level: u32,

    /// Kill an external command running longer than this many seconds
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Continue with the remaining samples when one fails
    #[arg(long)]
    keep_going: bool,

    /// Do not delete intermediate files
    #[arg(long)]
    keep_intermediates: bool,

    /// Write a JSON report of the run
    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,
}

impl Args {
    /// Checks that need the file system, done before any work starts.
    fn resolve_samples(&self) -> Result<Vec<Sample>> {
        if !self.reference.is_file() {
            bail!("reference genome not found: {}", self.reference.display());
        }
        let samples = resolve_samples(&self.samples)?;
        self.filter().plan(&samples)?;
        Ok(samples)
    }

    fn toolchain(&self) -> Toolchain {
        Toolchain::default()
            .with_minimap2(&self.minimap2)
            .with_samtools(&self.samtools)
            .with_preset(&self.preset)
    }

    fn filter(&self) -> ContaminantFilter {
        ContaminantFilter::new(&self.reference)
            .with_toolchain(self.toolchain())
            .with_threads(self.threads)
            .with_outdir(&self.outdir)
            .with_compression_level(self.compression_level)
            .with_timeout(self.timeout.map(Duration::from_secs))
            .with_keep_going(self.keep_going)
            .with_keep_intermediates(self.keep_intermediates)
            .with_progress(true)
    }
}

fn run(args: &Args, samples: &[Sample]) -> Result<RunReport> {
    let filter = args.filter();
    filter.toolchain().check()?;
    let report = filter.run(samples)?;
    if let Some(path) = &args.report {
        report.write_json(path)?;
        info!("Report written to {}", path.display());
    }
    Ok(report)
}

fn exit_status(report: &RunReport) -> u8 {
    if report.has_failures() {
        for sample in report.failed() {
            error!("Sample '{}' failed", sample.sample);
        }
        EXIT_FAILURE
    } else if report.has_cleanup_failures() {
        warn!(
            "All samples filtered, but {} intermediate file(s) could not be removed",
            report.cleanup_failures().count()
        );
        EXIT_CLEANUP
    } else {
        0
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let samples = match args.resolve_samples() {
        Ok(samples) => samples,
        Err(err) => {
            error!("{:#}", err);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match run(&args, &samples) {
        Ok(report) => {
            print!("{}", report);
            ExitCode::from(exit_status(&report))
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
