use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::manifest::{Artifact, Stage};

/// A fatal failure of one sample's pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("[{sample}] {stage} failed: `{command}` exited with {status}{}", format_diagnostics(.stderr))]
    Invocation {
        sample: String,
        stage: Stage,
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("[{sample}] {stage} failed: cannot run `{command}`: {source}")]
    Launch {
        sample: String,
        stage: Stage,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[{sample}] {stage} failed: `{command}` did not finish within {}s", .timeout.as_secs_f64())]
    Timeout {
        sample: String,
        stage: Stage,
        command: String,
        timeout: Duration,
    },

    #[error("[{sample}] {stage} failed on {}: {source}", .path.display())]
    Io {
        sample: String,
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn sample(&self) -> &str {
        match self {
            PipelineError::Invocation { sample, .. }
            | PipelineError::Launch { sample, .. }
            | PipelineError::Timeout { sample, .. }
            | PipelineError::Io { sample, .. } => sample,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Invocation { stage, .. }
            | PipelineError::Launch { stage, .. }
            | PipelineError::Timeout { stage, .. }
            | PipelineError::Io { stage, .. } => *stage,
        }
    }
}

fn format_diagnostics(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n{}", stderr)
    }
}

/// An intermediate file that could not be removed. Reported next to a
/// sample's result; never a pipeline failure by itself.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub artifact: Artifact,
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot remove {} {}: {}",
            self.artifact,
            self.path.display(),
            self.reason
        )
    }
}
