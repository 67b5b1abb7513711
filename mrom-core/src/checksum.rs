//! SHA-256 content digests for downloaded files.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Lowercase hex SHA-256 of the file at `path`.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Outcome of comparing a file against an expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch { actual: String },
    Unreadable { reason: String },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Match)
    }

    /// What to print as the "actual" digest in error messages.
    pub fn actual(&self) -> &str {
        match self {
            Verification::Match => "",
            Verification::Mismatch { actual } => actual,
            Verification::Unreadable { reason } => reason,
        }
    }
}

/// Compare the file against `expected` (hex, any case).
///
/// A file that cannot be read never matches.
pub fn verify(path: &Path, expected: &str) -> Verification {
    match sha256_file(path) {
        Ok(actual) if actual.eq_ignore_ascii_case(expected.trim()) => Verification::Match,
        Ok(actual) => Verification::Mismatch { actual },
        Err(err) => Verification::Unreadable {
            reason: err.to_string(),
        },
    }
}

pub fn matches(path: &Path, expected: &str) -> bool {
    verify(path, expected).is_match()
}
