//! Content fingerprints used to decide whether two files differ.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use xxhash_rust::xxh3::Xxh3;

use crate::errors::{SyncError, SyncResult};
use crate::file_ops::FileSystem;

pub const HASH_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Xxh3,
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xxh3 => "xxh3",
            Self::Sha256 => "sha256",
        }
    }

    /// Builds the hasher for this algorithm.
    pub fn hasher(&self) -> Box<dyn ContentHasher> {
        match self {
            Self::Xxh3 => Box::new(Xxh3Hasher),
            Self::Sha256 => Box::new(Sha256Hasher),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xxh3" => Ok(Self::Xxh3),
            "sha256" => Ok(Self::Sha256),
            other => Err(SyncError::InvalidArgument(format!(
                "unknown hash algorithm '{}' (expected xxh3 or sha256)",
                other
            ))),
        }
    }
}

/// Digest of a file's content. Two fingerprints are equal only when both the
/// algorithm and the digest bytes match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl Fingerprint {
    pub fn new(algorithm: HashAlgorithm, digest: Vec<u8>) -> Self {
        Self { algorithm, digest }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.algorithm)?;
        for byte in &self.digest {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A relative path paired with the fingerprint of the file found there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
}

/// Stream-based digest computation.
pub trait ContentHasher: Send + Sync {
    fn algorithm(&self) -> HashAlgorithm;

    /// Digests everything `reader` yields. Implementations read through a
    /// fixed-size buffer and never hold the whole content in memory.
    fn fingerprint(&self, reader: &mut dyn Read) -> io::Result<Fingerprint>;
}

fn stream_into(reader: &mut dyn Read, mut update: impl FnMut(&[u8])) -> io::Result<()> {
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        update(&buffer[..bytes_read]);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3Hasher;

impl ContentHasher for Xxh3Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Xxh3
    }

    fn fingerprint(&self, reader: &mut dyn Read) -> io::Result<Fingerprint> {
        let mut hasher = Xxh3::new();
        stream_into(reader, |chunk| hasher.update(chunk))?;
        Ok(Fingerprint::new(
            HashAlgorithm::Xxh3,
            hasher.digest().to_be_bytes().to_vec(),
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }

    fn fingerprint(&self, reader: &mut dyn Read) -> io::Result<Fingerprint> {
        let mut hasher = Sha256::new();
        stream_into(reader, |chunk| hasher.update(chunk))?;
        Ok(Fingerprint::new(
            HashAlgorithm::Sha256,
            hasher.finalize().to_vec(),
        ))
    }
}

/// Fingerprints the file at `relative` beneath `root`.
pub fn fingerprint_file(
    fs: &dyn FileSystem,
    hasher: &dyn ContentHasher,
    root: &Path,
    relative: &Path,
) -> SyncResult<FileFingerprint> {
    let path = root.join(relative);
    let mut reader = fs
        .open_read(&path)
        .map_err(|e| SyncError::io("open", &path, e))?;
    let fingerprint = hasher
        .fingerprint(&mut reader)
        .map_err(|e| SyncError::io("hash", &path, e))?;
    Ok(FileFingerprint {
        path: relative.to_path_buf(),
        fingerprint,
    })
}
