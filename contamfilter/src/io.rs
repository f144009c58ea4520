use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Read, Write},
    path::Path,
};

use noodles::{fasta, fastq};

/// Compression formats recognised on sample files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
}

impl Compression {
    /// Determine the compression type from the file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?;
        if ext == "gz" {
            Some(Compression::Gzip)
        } else if ext == "zst" {
            Some(Compression::Zstd)
        } else {
            None
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Compression::Gzip => ".gz",
            Compression::Zstd => ".zst",
        }
    }
}

/// Open a file, possibly compressed. Supports gzip (including multi-member
/// archives) and zstd.
pub fn open_file_for_read<P: AsRef<Path>>(
    file: P,
    compression: Option<Compression>,
) -> io::Result<Box<dyn Read + Send>> {
    let handle = File::open(file.as_ref())?;
    let reader: Box<dyn Read + Send> = match compression {
        Some(Compression::Gzip) => Box::new(flate2::read::MultiGzDecoder::new(handle)),
        Some(Compression::Zstd) => Box::new(zstd::stream::read::Decoder::new(handle)?),
        None => Box::new(handle),
    };
    Ok(reader)
}

/// Stream the decompressed content of `input` into `output`.
/// Returns the number of bytes written.
pub fn decompress_file<P1: AsRef<Path>, P2: AsRef<Path>>(
    input: P1,
    output: P2,
    compression: Compression,
) -> io::Result<u64> {
    let mut reader = open_file_for_read(input, Some(compression))?;
    let mut writer = BufWriter::new(File::create(output)?);
    let n = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(n)
}

/// Gzip `input` into `output`. An empty input still yields a complete gzip
/// member, so the result is always a valid archive.
pub fn gzip_file<P1: AsRef<Path>, P2: AsRef<Path>>(
    input: P1,
    output: P2,
    compression_level: u32,
) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut encoder = flate2::write::GzEncoder::new(
        BufWriter::new(File::create(output)?),
        flate2::Compression::new(compression_level),
    );
    let n = io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(n)
}

/// Count the records of a FASTQ or FASTA file, possibly compressed.
/// The format is taken from the first byte; an empty file has zero records.
pub fn count_records<P: AsRef<Path>>(file: P) -> io::Result<u64> {
    let compression = Compression::from_path(file.as_ref());
    let mut reader = BufReader::new(open_file_for_read(file, compression)?);
    let first = reader.fill_buf()?.first().copied();

    let mut n = 0;
    match first {
        None => {}
        Some(b'@') => {
            let mut reader = fastq::io::Reader::new(reader);
            for result in reader.records() {
                result?;
                n += 1;
            }
        }
        Some(b'>') => {
            let mut reader = fasta::io::Reader::new(reader);
            for result in reader.records() {
                result?;
                n += 1;
            }
        }
        Some(x) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("not a FASTQ or FASTA file, unexpected leading byte: {:?}", x as char),
            ))
        }
    }
    Ok(n)
}
