mod stages;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::manifest::{check_overwrites, ArtifactManifest};
use crate::report::{RunReport, SampleReport, SampleStatus};
use crate::sample::Sample;
use crate::tools::Toolchain;
use stages::StageContext;

/// Default gzip level of the deliverables.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Removes reads that align to a reference genome from a series of samples.
///
/// Samples are processed one after another. For each one the aligner maps the
/// reads against the reference, the alignment toolkit keeps the unmapped
/// records, and those are written to `other_<sample>.fastq.gz` in the output
/// directory. Intermediate files are deleted once the sample is done.
#[derive(Debug, Clone)]
pub struct ContaminantFilter {
    reference: PathBuf,
    toolchain: Toolchain,
    threads: u16,
    outdir: PathBuf,
    compression_level: u32,
    timeout: Option<Duration>,
    keep_going: bool,
    keep_intermediates: bool,
    show_progress: bool,
}

impl ContaminantFilter {
    pub fn new<P: Into<PathBuf>>(reference: P) -> Self {
        Self {
            reference: reference.into(),
            toolchain: Toolchain::default(),
            threads: 1,
            outdir: PathBuf::from("."),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            timeout: None,
            keep_going: false,
            keep_intermediates: false,
            show_progress: false,
        }
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Thread count handed unchanged to every external command. Zero is
    /// raised to one.
    pub fn with_threads(mut self, threads: u16) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_outdir<P: Into<PathBuf>>(mut self, outdir: P) -> Self {
        self.outdir = outdir.into();
        self
    }

    /// gzip level of the deliverables, from 0 to 9. Higher levels are
    /// lowered to 9.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Kill any external command still running after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep processing the remaining samples after one fails.
    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    pub fn with_keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn threads(&self) -> u16 {
        self.threads
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn keeps_intermediates(&self) -> bool {
        self.keep_intermediates
    }

    /// Lay out the files of every sample, making sure none of them would
    /// overwrite another sample's input.
    pub fn plan(&self, samples: &[Sample]) -> Result<Vec<ArtifactManifest>> {
        let manifests: Vec<_> = samples
            .iter()
            .map(|sample| ArtifactManifest::new(sample, &self.outdir))
            .collect();
        check_overwrites(&manifests)?;
        Ok(manifests)
    }

    /// Process `samples` in order.
    ///
    /// A failed sample stops the run unless `keep_going` is set; samples that
    /// were never attempted are reported as skipped. Errors returned here are
    /// about the run as a whole (missing reference, unusable output
    /// directory, outputs clobbering inputs); per-sample failures live in the
    /// report.
    pub fn run(&self, samples: &[Sample]) -> Result<RunReport> {
        if !self.reference.is_file() {
            bail!("reference genome not found: {}", self.reference.display());
        }
        let manifests = self.plan(samples)?;
        fs::create_dir_all(&self.outdir)
            .with_context(|| format!("cannot create output directory: {}", self.outdir.display()))?;

        info!(
            "Filtering {} sample(s) against {} with {} thread(s)",
            samples.len(),
            self.reference.display(),
            self.threads
        );

        let progress_bar = if self.show_progress {
            ProgressBar::new(samples.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed}] {bar:40.cyan/blue} {pos:>3}/{len:3} samples {msg}",
        ) {
            progress_bar.set_style(style);
        }

        let mut report = RunReport::default();
        let mut aborted = false;
        for (sample, manifest) in samples.iter().zip(&manifests) {
            if aborted {
                report.samples.push(SampleReport::new(manifest));
                continue;
            }
            progress_bar.set_message(sample.id().to_string());
            let sample_report = self.process_sample(sample, manifest);
            if !sample_report.is_success() && !self.keep_going {
                warn!("Aborting run, {} sample(s) not processed", samples.len() - report.samples.len() - 1);
                aborted = true;
            }
            report.samples.push(sample_report);
            progress_bar.inc(1);
        }
        progress_bar.finish_and_clear();

        info!(
            "{} of {} sample(s) filtered successfully",
            report.succeeded(),
            samples.len()
        );
        Ok(report)
    }

    /// Run every stage for one sample. Intermediates are removed along the
    /// way on success, and whatever is left is removed on failure.
    pub fn process_sample(&self, sample: &Sample, manifest: &ArtifactManifest) -> SampleReport {
        let start = Instant::now();
        let mut report = SampleReport::new(manifest);
        info!("Processing sample '{}' from {}", sample.id(), sample.path().display());

        let ctx = StageContext {
            filter: self,
            sample,
            manifest,
        };
        match stages::execute(&ctx, &mut report) {
            Ok(()) => {
                report.status = SampleStatus::Succeeded;
                report.output = Some(manifest.deliverable().to_path_buf());
                info!(
                    "Filtering complete for '{}'. Output file: {}",
                    sample.id(),
                    manifest.deliverable().display()
                );
            }
            Err(err) => {
                error!("{}", err);
                report.status = SampleStatus::Failed {
                    stage: err.stage(),
                    error: err.to_string(),
                };
                report
                    .cleanup_failures
                    .extend(stages::discard_partial(manifest, self.keep_intermediates));
            }
        }
        for failure in &report.cleanup_failures {
            warn!("[{}] {}", sample.id(), failure);
        }
        report.elapsed_secs = start.elapsed().as_secs_f64();
        report
    }
}
