use mrom_hal::SuError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for install pipeline operations.
pub type Result<T> = std::result::Result<T, InstallError>;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Failed to find the staging directory as seen by su")]
    SuDirNotFound,

    #[error("Failed to create ROM folder for {0}")]
    RomAllocation(String),

    #[error("Failed to initialize ROM folder {}", .0.display())]
    RomInit(PathBuf),

    #[error("Failed to write recovery command script: {0}")]
    CommandScript(String),

    #[error("Failed to copy {0}")]
    Copy(String),

    #[error("Failed to write base URL: {0}")]
    Metadata(String),

    #[error(transparent)]
    Su(#[from] SuError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InstallError::Cancelled)
    }
}
