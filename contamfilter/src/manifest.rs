use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Serialize;

use crate::sample::Sample;

/// A step of the per-sample pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Decompress,
    Align,
    SamToBam,
    Sort,
    FilterUnmapped,
    BamToFastq,
    Compress,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Decompress => "decompress",
            Stage::Align => "align",
            Stage::SamToBam => "sam-to-bam",
            Stage::Sort => "sort",
            Stage::FilterUnmapped => "filter-unmapped",
            Stage::BamToFastq => "bam-to-fastq",
            Stage::Compress => "compress",
        };
        f.write_str(name)
    }
}

/// Files produced while processing a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    DecompressedInput,
    TextAlignment,
    BinaryAlignment,
    SortedAlignment,
    UnmappedAlignment,
    UnmappedReads,
    Deliverable,
}

impl Artifact {
    /// The last stage that reads this artifact. The deliverable has none.
    pub fn last_consumer(&self) -> Option<Stage> {
        match self {
            Artifact::DecompressedInput => Some(Stage::Align),
            Artifact::TextAlignment => Some(Stage::SamToBam),
            Artifact::BinaryAlignment => Some(Stage::Sort),
            Artifact::SortedAlignment => Some(Stage::FilterUnmapped),
            Artifact::UnmappedAlignment => Some(Stage::BamToFastq),
            Artifact::UnmappedReads => Some(Stage::Compress),
            Artifact::Deliverable => None,
        }
    }
}

impl Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Artifact::DecompressedInput => "decompressed input",
            Artifact::TextAlignment => "SAM alignment",
            Artifact::BinaryAlignment => "BAM alignment",
            Artifact::SortedAlignment => "sorted BAM alignment",
            Artifact::UnmappedAlignment => "unmapped BAM alignment",
            Artifact::UnmappedReads => "unmapped FASTQ",
            Artifact::Deliverable => "compressed unmapped FASTQ",
        };
        f.write_str(name)
    }
}

/// Every path a sample's pipeline reads or writes, computed once.
///
/// Stages look their inputs and outputs up here, and cleanup walks
/// [`ArtifactManifest::intermediates`], so a file name is never derived twice.
#[derive(Debug, Clone)]
pub struct ArtifactManifest {
    sample_id: String,
    input: PathBuf,
    decompressed: Option<PathBuf>,
    sam: PathBuf,
    bam: PathBuf,
    sorted_bam: PathBuf,
    unmapped_bam: PathBuf,
    unmapped_fastq: PathBuf,
    deliverable: PathBuf,
}

impl ArtifactManifest {
    pub fn new<P: AsRef<Path>>(sample: &Sample, outdir: P) -> Self {
        let outdir = outdir.as_ref();
        let id = sample.id();
        Self {
            sample_id: id.to_string(),
            input: sample.path().to_path_buf(),
            decompressed: sample.decompressed_path(),
            sam: outdir.join(format!("{}.sam", id)),
            bam: outdir.join(format!("{}.bam", id)),
            sorted_bam: outdir.join(format!("{}_sorted.bam", id)),
            unmapped_bam: outdir.join(format!("unmapped_{}.bam", id)),
            unmapped_fastq: outdir.join(format!("other_{}.fastq", id)),
            deliverable: outdir.join(format!("other_{}.fastq.gz", id)),
        }
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn get(&self, artifact: Artifact) -> Option<&Path> {
        let path = match artifact {
            Artifact::DecompressedInput => return self.decompressed.as_deref(),
            Artifact::TextAlignment => &self.sam,
            Artifact::BinaryAlignment => &self.bam,
            Artifact::SortedAlignment => &self.sorted_bam,
            Artifact::UnmappedAlignment => &self.unmapped_bam,
            Artifact::UnmappedReads => &self.unmapped_fastq,
            Artifact::Deliverable => &self.deliverable,
        };
        Some(path.as_path())
    }

    /// The original sample file as given on the command line.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// The uncompressed reads handed to the aligner.
    pub fn query(&self) -> &Path {
        self.decompressed.as_deref().unwrap_or(self.input.as_path())
    }

    pub fn decompressed(&self) -> Option<&Path> {
        self.decompressed.as_deref()
    }

    pub fn sam(&self) -> &Path {
        &self.sam
    }

    pub fn bam(&self) -> &Path {
        &self.bam
    }

    pub fn sorted_bam(&self) -> &Path {
        &self.sorted_bam
    }

    pub fn unmapped_bam(&self) -> &Path {
        &self.unmapped_bam
    }

    pub fn unmapped_fastq(&self) -> &Path {
        &self.unmapped_fastq
    }

    pub fn deliverable(&self) -> &Path {
        &self.deliverable
    }

    /// Temporary files to remove once the sample is done, in creation order.
    pub fn intermediates(&self) -> impl Iterator<Item = (Artifact, &Path)> + '_ {
        [
            Artifact::DecompressedInput,
            Artifact::TextAlignment,
            Artifact::BinaryAlignment,
            Artifact::SortedAlignment,
            Artifact::UnmappedAlignment,
            Artifact::UnmappedReads,
        ]
        .into_iter()
        .filter_map(move |a| self.get(a).map(|p| (a, p)))
    }

    /// Every file written for this sample, the deliverable last.
    pub fn outputs(&self) -> impl Iterator<Item = (Artifact, &Path)> + '_ {
        self.intermediates()
            .chain(std::iter::once((Artifact::Deliverable, self.deliverable.as_path())))
    }
}

/// Refuse a run in which a file written for one sample is the input of
/// another. That input would be overwritten, then deleted with the
/// intermediates.
pub fn check_overwrites(manifests: &[ArtifactManifest]) -> Result<()> {
    let written: HashMap<PathBuf, (&str, Artifact)> = manifests
        .iter()
        .flat_map(|m| {
            m.outputs()
                .map(move |(artifact, path)| (resolve(path), (m.sample_id(), artifact)))
        })
        .collect();
    for m in manifests {
        if let Some((owner, artifact)) = written.get(&resolve(m.input())) {
            bail!(
                "input {} of sample '{}' would be overwritten by the {} of sample '{}', use another output directory",
                m.input().display(),
                m.sample_id(),
                artifact,
                owner
            );
        }
    }
    Ok(())
}

/// Canonical form of a path whose file may not exist yet.
fn resolve(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_names() {
        let sample = Sample::new("data/sampleA.fastq.gz").unwrap();
        let manifest = ArtifactManifest::new(&sample, "out");

        assert_eq!(manifest.query(), Path::new("data/sampleA.fastq"));
        assert_eq!(manifest.sam(), Path::new("out/sampleA.sam"));
        assert_eq!(manifest.bam(), Path::new("out/sampleA.bam"));
        assert_eq!(manifest.sorted_bam(), Path::new("out/sampleA_sorted.bam"));
        assert_eq!(manifest.unmapped_bam(), Path::new("out/unmapped_sampleA.bam"));
        assert_eq!(manifest.unmapped_fastq(), Path::new("out/other_sampleA.fastq"));
        assert_eq!(manifest.deliverable(), Path::new("out/other_sampleA.fastq.gz"));

        let intermediates: Vec<_> = manifest.intermediates().map(|(a, _)| a).collect();
        assert_eq!(intermediates.len(), 6);
        assert_eq!(intermediates[0], Artifact::DecompressedInput);
        assert!(!intermediates.contains(&Artifact::Deliverable));
    }

    #[test]
    fn test_uncompressed_sample_has_no_decompressed_input() {
        let sample = Sample::new("sampleB.fq").unwrap();
        let manifest = ArtifactManifest::new(&sample, ".");

        assert_eq!(manifest.query(), Path::new("sampleB.fq"));
        assert!(manifest.get(Artifact::DecompressedInput).is_none());
        assert_eq!(manifest.intermediates().count(), 5);
        assert!(manifest.intermediates().all(|(_, p)| p != Path::new("sampleB.fq")));
    }

    #[test]
    fn test_intermediates_are_released_in_stage_order() {
        let sample = Sample::new("s.fastq.gz").unwrap();
        let manifest = ArtifactManifest::new(&sample, ".");
        let consumers: Vec<_> = manifest
            .intermediates()
            .map(|(a, _)| a.last_consumer().unwrap())
            .collect();
        assert_eq!(consumers.first(), Some(&Stage::Align));
        assert_eq!(consumers.last(), Some(&Stage::Compress));
        assert!(consumers.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Artifact::Deliverable.last_consumer(), None);
    }

    #[test]
    fn test_outputs_cannot_overwrite_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        let samples = [
            Sample::new(data.join("a.fastq")).unwrap(),
            Sample::new(data.join("other_a.fastq")).unwrap(),
        ];

        // Spelled differently, same directory.
        let outdir = data.join("..").join("data");
        let manifests: Vec<_> = samples.iter().map(|s| ArtifactManifest::new(s, &outdir)).collect();
        let err = check_overwrites(&manifests).unwrap_err().to_string();
        assert!(err.contains("other_a"), "{}", err);
        assert!(err.contains("unmapped FASTQ"), "{}", err);

        let manifests: Vec<_> = samples
            .iter()
            .map(|s| ArtifactManifest::new(s, dir.path().join("out")))
            .collect();
        assert!(check_overwrites(&manifests).is_ok());
    }
}
