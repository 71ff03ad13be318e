//! Git-compatible SHA256 blob hashing.
//!
//! A `Digest` is the lowercase hex SHA256 over the git object framing
//! `blob <len>\0<content>`, so the same identifier can be shared with any
//! tool (including plain `git hash-object`) that understands git blob
//! hashes. Hashing is streaming: callers never need to hold the whole file
//! in memory at once.

use crate::error::{PatchKitError, Result};
use sha2::{Digest as _, Sha256};
use std::io::Read;
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

/// A 64-hex-character lowercase git-blob SHA256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Build from an already-computed hex string, normalizing to lowercase.
    /// Does not validate length or hex-ness; use `parse` at trust boundaries.
    pub fn from_hex_lossy(hex: impl Into<String>) -> Self {
        Digest(hex.into().to_ascii_lowercase())
    }

    /// Parse and validate a 64-hex-character digest string.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PatchKitError::ManifestInvalid(format!(
                "not a valid 64-hex digest: {s}"
            )));
        }
        Ok(Digest(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Digest {
    type Err = PatchKitError;
    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

/// Hash a byte stream of known `length`, framed as a git blob.
///
/// Memory usage is O(chunk size): the reader is pulled in fixed-size
/// chunks rather than read to a `Vec` up front.
pub fn hash_reader(mut reader: impl Read, length: u64) -> Result<Digest> {
    let mut hasher = Sha256::new();
    hasher.update(b"blob ");
    hasher.update(length.to_string().as_bytes());
    hasher.update([0u8]);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = length;
    loop {
        let want = remaining.min(buf.len() as u64) as usize;
        if want == 0 {
            break;
        }
        let n = reader.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(Digest(hex::encode(hasher.finalize())))
}

/// Hash an in-memory byte slice, framed as a git blob.
pub fn hash_bytes(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(b"blob ");
    hasher.update(data.len().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(data);
    Digest(hex::encode(hasher.finalize()))
}

/// Hash the file at `path`. Symbolic links are followed (`std::fs::File::open`
/// resolves them). Fails with `io::ErrorKind::NotFound` wrapped in
/// `PatchKitError::Io` if the file does not exist.
pub fn hash_file(path: &Path) -> Result<Digest> {
    let file = std::fs::File::open(path)?;
    let length = file.metadata()?.len();
    hash_reader(file, length)
}
