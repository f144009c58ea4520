//! Contaminant read filtering.
//!
//! Reads are aligned to a reference genome with `minimap2`; `samtools` keeps
//! the records flagged unmapped and turns them back into FASTQ. What remains
//! is written to `other_<sample>.fastq.gz`, and every intermediate file is
//! removed.

pub mod command;
pub mod error;
pub mod io;
pub mod manifest;
pub mod pipeline;
pub mod report;
pub mod sample;
pub mod tools;

pub use error::{CleanupFailure, PipelineError};
pub use manifest::{Artifact, ArtifactManifest, Stage};
pub use pipeline::ContaminantFilter;
pub use report::{RunReport, SampleReport, SampleStatus};
pub use sample::{resolve_samples, Sample};
pub use tools::Toolchain;
