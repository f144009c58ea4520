use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use log::info;

use crate::command::Invocation;

/// Default minimap2 preset, tuned for long noisy reads.
pub const DEFAULT_PRESET: &str = "map-ont";

/// The external aligner and alignment toolkit.
#[derive(Debug, Clone)]
pub struct Toolchain {
    minimap2: PathBuf,
    samtools: PathBuf,
    preset: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            minimap2: PathBuf::from("minimap2"),
            samtools: PathBuf::from("samtools"),
            preset: DEFAULT_PRESET.to_string(),
        }
    }
}

impl Toolchain {
    pub fn with_minimap2<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.minimap2 = path.into();
        self
    }

    pub fn with_samtools<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.samtools = path.into();
        self
    }

    pub fn with_preset<S: Into<String>>(mut self, preset: S) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn minimap2(&self) -> &Path {
        &self.minimap2
    }

    pub fn samtools(&self) -> &Path {
        &self.samtools
    }

    pub fn preset(&self) -> &str {
        &self.preset
    }

    /// Make sure both executables can be started, before any sample is touched.
    pub fn check(&self) -> Result<()> {
        for program in [&self.minimap2, &self.samtools] {
            let version = tool_version(program)?;
            info!("Found {} {}", program.display(), version);
        }
        Ok(())
    }

    /// `minimap2 -t <threads> -ax <preset> <reference> <query> > <sam>`
    pub fn align(&self, threads: u16, reference: &Path, query: &Path, sam: &Path) -> Invocation {
        let threads = threads.to_string();
        Invocation::new(&self.minimap2)
            .args(["-t", threads.as_str(), "-ax", self.preset.as_str()])
            .arg(reference)
            .arg(query)
            .stdout_to(sam)
    }

    /// `samtools view -@ <threads> -S -b <sam> > <bam>`
    pub fn sam_to_bam(&self, threads: u16, sam: &Path, bam: &Path) -> Invocation {
        let threads = threads.to_string();
        Invocation::new(&self.samtools)
            .args(["view", "-@", threads.as_str(), "-S", "-b"])
            .arg(sam)
            .stdout_to(bam)
    }

    /// `samtools sort -@ <threads> <bam> -o <sorted>`
    pub fn sort(&self, threads: u16, bam: &Path, sorted: &Path) -> Invocation {
        let threads = threads.to_string();
        Invocation::new(&self.samtools)
            .args(["sort", "-@", threads.as_str()])
            .arg(bam)
            .arg("-o")
            .arg(sorted)
    }

    /// `samtools view -@ <threads> -b -f 4 <sorted> > <unmapped>`; flag 4 marks
    /// records whose read did not map.
    pub fn filter_unmapped(&self, threads: u16, sorted: &Path, unmapped: &Path) -> Invocation {
        let threads = threads.to_string();
        Invocation::new(&self.samtools)
            .args(["view", "-@", threads.as_str(), "-b", "-f", "4"])
            .arg(sorted)
            .stdout_to(unmapped)
    }

    /// `samtools fastq -@ <threads> <unmapped> > <fastq>`
    pub fn bam_to_fastq(&self, threads: u16, unmapped: &Path, fastq: &Path) -> Invocation {
        let threads = threads.to_string();
        Invocation::new(&self.samtools)
            .args(["fastq", "-@", threads.as_str()])
            .arg(unmapped)
            .stdout_to(fastq)
    }
}

fn tool_version(program: &Path) -> Result<String> {
    let output = Command::new(program)
        .arg("--version")
        .output()
        .with_context(|| format!("cannot run {}, is it installed and on PATH?", program.display()))?;
    if !output.status.success() {
        bail!(
            "{} --version exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or("").trim().to_string())
}
