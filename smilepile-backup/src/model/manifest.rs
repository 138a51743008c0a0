//! Photo manifest entries and content checksums.
//!
//! This engine writes SHA-256, lowercase hex. Restores also check MD5
//! digests written by other producers; the algorithm is picked by digest
//! length. Checksums guard against corruption in transit, not tampering.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::utils::errors::BackupWarning;

/// Length of a lowercase hex SHA-256 digest
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Length of a hex MD5 digest
pub const MD5_HEX_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    /// Recognise a hex digest by its length.
    pub fn detect(checksum: &str) -> Option<Self> {
        if !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match checksum.len() {
            MD5_HEX_LEN => Some(ChecksumAlgorithm::Md5),
            CHECKSUM_HEX_LEN => Some(ChecksumAlgorithm::Sha256),
            _ => None,
        }
    }
}

/// Maps one photo to its file inside the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoManifestEntry {
    pub photo_id: i64,

    /// Path on the producing device; informational only
    #[serde(default)]
    pub original_path: String,

    /// Entry name inside the archive, e.g. `photos/12_cat.jpg`
    pub zip_entry_name: String,

    #[serde(default)]
    pub file_name: String,

    #[serde(default)]
    pub file_size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl PhotoManifestEntry {
    /// Algorithm of the recorded checksum, if it is one this engine knows.
    pub fn checksum_algorithm(&self) -> Option<ChecksumAlgorithm> {
        self.checksum.as_deref().and_then(ChecksumAlgorithm::detect)
    }

    /// Compare `actual`, a hex digest computed with
    /// [`checksum_algorithm`](Self::checksum_algorithm), with the recorded
    /// checksum.
    ///
    /// Returns `None` when they agree or no checksum was recorded.
    pub fn verify(&self, actual: &str) -> Option<BackupWarning> {
        let expected = self.checksum.as_deref()?;

        if !is_verifiable(expected) {
            return Some(BackupWarning::UnverifiableChecksum {
                photo_id: self.photo_id,
                checksum: expected.to_string(),
            });
        }

        if expected.eq_ignore_ascii_case(actual) {
            None
        } else {
            Some(BackupWarning::ChecksumMismatch {
                photo_id: self.photo_id,
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }
}

/// Whether a checksum string is a digest this engine can check.
pub fn is_verifiable(checksum: &str) -> bool {
    ChecksumAlgorithm::detect(checksum).is_some()
}

/// SHA-256 of an in-memory buffer.
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 of any reader, streamed in fixed-size chunks.
pub fn checksum_reader(reader: &mut dyn Read) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
}

/// `io::Write` sink that hashes everything written to it. SHA-256 unless
/// built with [`ChecksumWriter::with_algorithm`].
pub struct ChecksumWriter {
    hasher: Hasher,
}

impl Default for ChecksumWriter {
    fn default() -> Self {
        Self::with_algorithm(ChecksumAlgorithm::Sha256)
    }
}

impl ChecksumWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_algorithm(algorithm: ChecksumAlgorithm) -> Self {
        let hasher = match algorithm {
            ChecksumAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        };
        Self { hasher }
    }

    pub fn finish(self) -> String {
        match self.hasher {
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

impl std::io::Write for ChecksumWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.hasher {
            Hasher::Md5(h) => h.update(buf),
            Hasher::Sha256(h) => h.update(buf),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// SHA-256 of a file on disk.
pub fn checksum_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::io::BufReader::new(std::fs::File::open(path)?);
    checksum_reader(&mut file)
}
