use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use glob::{glob, Pattern};
use itertools::Itertools;

use crate::io::Compression;

/// Sequence-format suffixes removed when deriving a sample identifier.
pub const SEQUENCE_SUFFIXES: [&str; 5] = [".fastq", ".fq", ".fasta", ".fa", ".fna"];

/// File patterns picked up when a directory is given as a sample.
const DIRECTORY_PATTERNS: [&str; 6] = [
    "*.fastq",
    "*.fq",
    "*.fastq.gz",
    "*.fq.gz",
    "*.fastq.zst",
    "*.fq.zst",
];

/// A read file to be filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    path: PathBuf,
    compression: Option<Compression>,
    id: String,
}

impl Sample {
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let compression = Compression::from_path(&path);
        let file_name = path
            .file_name()
            .and_then(|x| x.to_str())
            .ok_or(anyhow!("invalid sample file name: {:?}", path))?;
        let id = sample_id(file_name, compression).to_string();
        if id.is_empty() {
            bail!("cannot derive a sample name from {:?}", path);
        }
        Ok(Self {
            path,
            compression,
            id,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    /// Base identifier used to name every file derived from this sample.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sibling path receiving the decompressed reads, for compressed samples.
    pub fn decompressed_path(&self) -> Option<PathBuf> {
        self.compression.map(|_| self.path.with_extension(""))
    }
}

fn sample_id(file_name: &str, compression: Option<Compression>) -> &str {
    let name = compression
        .and_then(|c| file_name.strip_suffix(c.suffix()))
        .unwrap_or(file_name);
    SEQUENCE_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

/// Turn command-line sample arguments into samples, in the given order.
///
/// Directories expand to the read files they contain, sorted by name.
/// Two samples mapping to the same identifier would overwrite each other's
/// output, so that is rejected up front.
pub fn resolve_samples<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            let files = list_read_files(input)?;
            if files.is_empty() {
                bail!("no FASTQ files found in directory: {}", input.display());
            }
            for file in files {
                samples.push(Sample::new(file)?);
            }
        } else if input.is_file() {
            samples.push(Sample::new(input)?);
        } else {
            bail!("sample not found: {}", input.display());
        }
    }

    if let Some(id) = samples.iter().map(|s| s.id()).duplicates().next() {
        bail!("multiple samples share the name '{}', their outputs would collide", id);
    }
    Ok(samples)
}

fn list_read_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let dir_str = dir
        .to_str()
        .ok_or(anyhow!("invalid directory name: {:?}", dir))?;
    let prefix = Pattern::escape(dir_str);
    let mut files = Vec::new();
    for pattern in DIRECTORY_PATTERNS {
        let full = format!("{}/{}", prefix, pattern);
        let paths = glob(&full).with_context(|| format!("invalid glob pattern: {}", full))?;
        files.extend(paths.filter_map(Result::ok).filter(|p| p.is_file()));
    }
    files.sort();
    files.dedup();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_sample_id() {
        let cases = [
            ("sampleA.fastq.gz", "sampleA", true),
            ("sampleA.fastq", "sampleA", false),
            ("run1.fq.zst", "run1", true),
            ("reads.fasta", "reads", false),
            ("x.y.fq", "x.y", false),
            ("nosuffix", "nosuffix", false),
            ("weird.gz", "weird", true),
        ];
        for (name, id, compressed) in cases {
            let sample = Sample::new(Path::new("dir").join(name)).unwrap();
            assert_eq!(sample.id(), id, "{}", name);
            assert_eq!(sample.is_compressed(), compressed, "{}", name);
        }
    }

    #[test]
    fn test_decompressed_path() {
        let sample = Sample::new("/data/sampleA.fastq.gz").unwrap();
        assert_eq!(sample.decompressed_path(), Some(PathBuf::from("/data/sampleA.fastq")));
        assert_eq!(sample.compression(), Some(Compression::Gzip));

        let sample = Sample::new("/data/sampleA.fastq").unwrap();
        assert_eq!(sample.decompressed_path(), None);
    }

    #[test]
    fn test_empty_id_is_rejected() {
        assert!(Sample::new(".fastq").is_err());
    }

    #[test]
    fn test_resolve_samples() {
        let dir = tempfile::tempdir().unwrap();
        let batch = dir.path().join("batch");
        fs::create_dir(&batch).unwrap();
        for name in ["b.fastq.gz", "a.fq", "notes.txt", "c.fastq.zst"] {
            fs::write(batch.join(name), b"").unwrap();
        }
        let single = dir.path().join("z.fastq");
        fs::write(&single, b"").unwrap();

        let samples = resolve_samples(&[single.clone(), batch.clone()]).unwrap();
        let ids: Vec<_> = samples.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["z", "a", "b", "c"]);

        assert!(resolve_samples(&[dir.path().join("missing.fastq")]).is_err());

        let empty = dir.path().join("empty");
        fs::create_dir(&empty).unwrap();
        assert!(resolve_samples(&[empty]).is_err());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("s1.fastq");
        let packed = dir.path().join("s1.fastq.gz");
        fs::write(&plain, b"").unwrap();
        fs::write(&packed, b"").unwrap();

        let err = resolve_samples(&[plain, packed]).unwrap_err();
        assert!(err.to_string().contains("s1"));
    }
}
