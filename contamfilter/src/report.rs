use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::CleanupFailure;
use crate::manifest::{ArtifactManifest, Stage};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SampleStatus {
    Succeeded,
    Failed { stage: Stage, error: String },
    /// Not attempted because an earlier sample aborted the run.
    Skipped,
}

/// Outcome of one sample.
#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    pub sample: String,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    #[serde(flatten)]
    pub status: SampleStatus,
    pub input_reads: Option<u64>,
    pub unmapped_reads: Option<u64>,
    pub elapsed_secs: f64,
    pub cleanup_failures: Vec<CleanupFailure>,
}

impl SampleReport {
    pub(crate) fn new(manifest: &ArtifactManifest) -> Self {
        Self {
            sample: manifest.sample_id().to_string(),
            input: manifest.input().to_path_buf(),
            output: None,
            status: SampleStatus::Skipped,
            input_reads: None,
            unmapped_reads: None,
            elapsed_secs: 0.0,
            cleanup_failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SampleStatus::Succeeded
    }

    /// Fraction of the input reads that did not map to the reference.
    pub fn frac_unmapped(&self) -> Option<f64> {
        match (self.input_reads, self.unmapped_reads) {
            (Some(total), Some(unmapped)) if total > 0 => Some(unmapped as f64 / total as f64),
            _ => None,
        }
    }
}

/// Per-sample outcomes of a run, in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub samples: Vec<SampleReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.samples.iter().filter(|s| s.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &SampleReport> {
        self.samples
            .iter()
            .filter(|s| matches!(s.status, SampleStatus::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn cleanup_failures(&self) -> impl Iterator<Item = &CleanupFailure> {
        self.samples.iter().flat_map(|s| s.cleanup_failures.iter())
    }

    pub fn has_cleanup_failures(&self) -> bool {
        self.cleanup_failures().next().is_some()
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(
            File::create(path)
                .with_context(|| format!("cannot create report: {}", path.display()))?,
        );
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for s in &self.samples {
            let status = match &s.status {
                SampleStatus::Succeeded => "ok".to_string(),
                SampleStatus::Failed { stage, .. } => format!("failed ({})", stage),
                SampleStatus::Skipped => "skipped".to_string(),
            };
            let reads = match (s.unmapped_reads, s.input_reads) {
                (Some(u), Some(t)) => format!("{}/{}", u, t),
                (Some(u), None) => u.to_string(),
                _ => "-".to_string(),
            };
            let output = s
                .output
                .as_ref()
                .map(|x| x.display().to_string())
                .unwrap_or("-".to_string());
            writeln!(f, "{}\t{}\t{}\t{}", s.sample, status, reads, output)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Artifact;

    fn report(sample: &str, status: SampleStatus) -> SampleReport {
        SampleReport {
            sample: sample.to_string(),
            input: PathBuf::from(format!("{}.fastq", sample)),
            output: None,
            status,
            input_reads: Some(10),
            unmapped_reads: Some(4),
            elapsed_secs: 1.5,
            cleanup_failures: Vec::new(),
        }
    }

    #[test]
    fn test_run_report_summary() {
        let mut ok = report("a", SampleStatus::Succeeded);
        ok.output = Some(PathBuf::from("other_a.fastq.gz"));
        ok.cleanup_failures.push(CleanupFailure {
            artifact: Artifact::TextAlignment,
            path: PathBuf::from("a.sam"),
            reason: "permission denied".to_string(),
        });
        let failed = report(
            "b",
            SampleStatus::Failed { stage: Stage::Sort, error: "boom".to_string() },
        );
        let run = RunReport { samples: vec![ok, failed, report("c", SampleStatus::Skipped)] };

        assert_eq!(run.succeeded(), 1);
        assert!(run.has_failures());
        assert_eq!(run.failed().count(), 1);
        assert!(run.has_cleanup_failures());
        assert_eq!(run.samples[0].frac_unmapped(), Some(0.4));

        let text = run.to_string();
        assert!(text.contains("a\tok\t4/10\tother_a.fastq.gz"));
        assert!(text.contains("b\tfailed (sort)"));
        assert!(text.contains("c\tskipped"));
    }

    #[test]
    fn test_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let failed = report(
            "b",
            SampleStatus::Failed { stage: Stage::SamToBam, error: "boom".to_string() },
        );
        RunReport { samples: vec![failed] }.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let sample = &value["samples"][0];
        assert_eq!(sample["sample"], "b");
        assert_eq!(sample["status"], "failed");
        assert_eq!(sample["stage"], "sam-to-bam");
        assert_eq!(sample["error"], "boom");
        assert_eq!(sample["input_reads"], 10);
    }
}
