use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::{info, warn};

use crate::command::Invocation;
use crate::error::{CleanupFailure, PipelineError};
use crate::io::{count_records, decompress_file, gzip_file};
use crate::manifest::{Artifact, ArtifactManifest, Stage};
use crate::report::SampleReport;
use crate::sample::Sample;

use super::ContaminantFilter;

/// What every stage of one sample needs.
pub(crate) struct StageContext<'a> {
    pub filter: &'a ContaminantFilter,
    pub sample: &'a Sample,
    pub manifest: &'a ArtifactManifest,
}

impl StageContext<'_> {
    fn id(&self) -> &str {
        self.sample.id()
    }

    fn invoke(&self, stage: Stage, invocation: Invocation) -> Result<(), PipelineError> {
        invocation.run(self.id(), stage, self.filter.timeout())
    }

    fn io_error<'b>(
        &'b self,
        stage: Stage,
        path: &'b Path,
    ) -> impl FnOnce(std::io::Error) -> PipelineError + 'b {
        move |source| PipelineError::Io {
            sample: self.id().to_string(),
            stage,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Delete the intermediates whose last reader is `stage`. A missing file
    /// is reported too, since its producer has run.
    fn release(&self, stage: Stage, report: &mut SampleReport) {
        if self.filter.keeps_intermediates() {
            return;
        }
        let failures = self
            .manifest
            .intermediates()
            .filter(|(artifact, _)| artifact.last_consumer() == Some(stage))
            .filter_map(|(artifact, path)| remove(artifact, path, false));
        report.cleanup_failures.extend(failures);
    }

    /// Read counts feed the report only, so a count that cannot be taken is
    /// logged and left out rather than failing the sample.
    fn count_reads(&self, path: &Path) -> Option<u64> {
        match count_records(path) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("[{}] cannot count reads in {}: {}", self.id(), path.display(), e);
                None
            }
        }
    }
}

/// Run every stage of one sample in order, recording read counts in `report`.
/// Each intermediate is removed as soon as the stage that last reads it is
/// done.
pub(crate) fn execute(ctx: &StageContext, report: &mut SampleReport) -> Result<(), PipelineError> {
    preprocess(ctx)?;
    report.input_reads = ctx.count_reads(ctx.manifest.query());
    align(ctx)?;
    ctx.release(Stage::Align, report);
    convert(ctx, report)?;
    extract_unmapped(ctx, report)?;
    report.unmapped_reads = ctx.count_reads(ctx.manifest.unmapped_fastq());
    finalize(ctx)?;
    ctx.release(Stage::Compress, report);
    Ok(())
}

/// Decompress the sample next to the original when needed.
pub(crate) fn preprocess(ctx: &StageContext) -> Result<(), PipelineError> {
    let (Some(compression), Some(target)) = (ctx.sample.compression(), ctx.manifest.decompressed())
    else {
        return Ok(());
    };
    if target.exists() {
        warn!(
            "[{}] {} already exists and will be overwritten, then removed",
            ctx.id(),
            target.display()
        );
    }
    info!("[{}] Decompressing {}", ctx.id(), ctx.sample.path().display());
    decompress_file(ctx.sample.path(), target, compression)
        .map_err(ctx.io_error(Stage::Decompress, ctx.sample.path()))?;
    Ok(())
}

pub(crate) fn align(ctx: &StageContext) -> Result<(), PipelineError> {
    info!("[{}] Aligning reads with minimap2", ctx.id());
    let invocation = ctx.filter.toolchain().align(
        ctx.filter.threads(),
        ctx.filter.reference(),
        ctx.manifest.query(),
        ctx.manifest.sam(),
    );
    ctx.invoke(Stage::Align, invocation)
}

/// SAM to BAM, then coordinate sort.
pub(crate) fn convert(ctx: &StageContext, report: &mut SampleReport) -> Result<(), PipelineError> {
    let tools = ctx.filter.toolchain();
    let threads = ctx.filter.threads();

    info!("[{}] Converting SAM to BAM", ctx.id());
    ctx.invoke(
        Stage::SamToBam,
        tools.sam_to_bam(threads, ctx.manifest.sam(), ctx.manifest.bam()),
    )?;
    ctx.release(Stage::SamToBam, report);

    info!("[{}] Sorting BAM", ctx.id());
    ctx.invoke(
        Stage::Sort,
        tools.sort(threads, ctx.manifest.bam(), ctx.manifest.sorted_bam()),
    )?;
    ctx.release(Stage::Sort, report);
    Ok(())
}

/// Keep only unmapped records, then turn them back into FASTQ.
pub(crate) fn extract_unmapped(
    ctx: &StageContext,
    report: &mut SampleReport,
) -> Result<(), PipelineError> {
    let tools = ctx.filter.toolchain();
    let threads = ctx.filter.threads();

    info!("[{}] Extracting unmapped reads", ctx.id());
    ctx.invoke(
        Stage::FilterUnmapped,
        tools.filter_unmapped(threads, ctx.manifest.sorted_bam(), ctx.manifest.unmapped_bam()),
    )?;
    ctx.release(Stage::FilterUnmapped, report);

    info!("[{}] Converting unmapped BAM to FASTQ", ctx.id());
    ctx.invoke(
        Stage::BamToFastq,
        tools.bam_to_fastq(threads, ctx.manifest.unmapped_bam(), ctx.manifest.unmapped_fastq()),
    )?;
    ctx.release(Stage::BamToFastq, report);
    Ok(())
}

pub(crate) fn finalize(ctx: &StageContext) -> Result<(), PipelineError> {
    let deliverable = ctx.manifest.deliverable();
    info!("[{}] Compressing output to {}", ctx.id(), deliverable.display());
    gzip_file(
        ctx.manifest.unmapped_fastq(),
        deliverable,
        ctx.filter.compression_level(),
    )
    .map_err(ctx.io_error(Stage::Compress, deliverable))?;
    Ok(())
}

/// Delete whatever a failed sample left behind, including a partial
/// deliverable. Files never created or already released are skipped.
pub(crate) fn discard_partial(
    manifest: &ArtifactManifest,
    keep_intermediates: bool,
) -> Vec<CleanupFailure> {
    let intermediates = manifest
        .intermediates()
        .filter(|_| !keep_intermediates);
    intermediates
        .chain(std::iter::once((Artifact::Deliverable, manifest.deliverable())))
        .filter_map(|(artifact, path)| remove(artifact, path, true))
        .collect()
}

fn remove(artifact: Artifact, path: &Path, missing_ok: bool) -> Option<CleanupFailure> {
    match fs::remove_file(path) {
        Ok(()) => None,
        Err(e) if missing_ok && e.kind() == ErrorKind::NotFound => None,
        Err(e) => Some(CleanupFailure {
            artifact,
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
