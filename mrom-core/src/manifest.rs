//! Ubuntu Touch install manifest.
//!
//! An [`InstallInfo`] lists the keyrings and system update files of one
//! channel. Keyrings must reach the recovery before the system partition is
//! mounted, so the download list always yields them first.

use crate::downloader::filename_from_url;
use crate::{InstallError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One file hosted on the system-image server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UbuntuFile {
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    /// Expected length in bytes, 0 when unknown.
    #[serde(default)]
    size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

impl UbuntuFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            signature: None,
            size: 0,
            checksum: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Local/remote file name of the payload.
    pub fn filename(&self) -> Result<&str> {
        command_safe_filename(&self.path)
    }

    /// File name of the detached signature, if there is one.
    pub fn signature_filename(&self) -> Result<Option<&str>> {
        self.signature.as_deref().map(command_safe_filename).transpose()
    }
}

/// Names end up as whitespace-separated tokens in `ubuntu_command`.
fn command_safe_filename(url: &str) -> Result<&str> {
    filename_from_url(url)
        .filter(|name| !name.chars().any(|c| c.is_whitespace() || c.is_control()))
        .ok_or_else(|| InstallError::InvalidUrl(url.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Keyring,
    Install,
}

/// Keyrings followed by install files, in manifest order.
#[derive(Debug, Clone, Copy)]
pub struct DownloadList<'a> {
    keyrings: &'a [UbuntuFile],
    install_files: &'a [UbuntuFile],
}

impl<'a> DownloadList<'a> {
    pub fn keyrings(&self) -> &'a [UbuntuFile] {
        self.keyrings
    }

    pub fn install_files(&self) -> &'a [UbuntuFile] {
        self.install_files
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileRole, &'a UbuntuFile)> + 'a {
        let keyrings = self.keyrings.iter().map(|f| (FileRole::Keyring, f));
        let installs = self.install_files.iter().map(|f| (FileRole::Install, f));
        keyrings.chain(installs)
    }

    pub fn len(&self) -> usize {
        self.keyrings.len() + self.install_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything needed for one Ubuntu Touch install run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallInfo {
    #[serde(rename = "channel")]
    pub channel_name: String,
    #[serde(default)]
    pub keyrings: Vec<UbuntuFile>,
    #[serde(rename = "files", alias = "install_files", default)]
    pub install_files: Vec<UbuntuFile>,
}

impl InstallInfo {
    pub fn new(
        channel_name: impl Into<String>,
        keyrings: Vec<UbuntuFile>,
        install_files: Vec<UbuntuFile>,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            keyrings,
            install_files,
        }
    }

    pub fn download_list(&self) -> DownloadList<'_> {
        DownloadList {
            keyrings: &self.keyrings,
            install_files: &self.install_files,
        }
    }

    /// Reject manifests that could only fail later, after network or su work.
    pub fn validate(&self) -> Result<()> {
        if self.channel_name.trim().is_empty() {
            return Err(InstallError::InvalidManifest("channel name is empty".into()));
        }
        if self.install_files.is_empty() {
            return Err(InstallError::InvalidManifest("no install files".into()));
        }
        for (_, file) in self.download_list().iter() {
            if file.path.trim().is_empty() {
                return Err(InstallError::InvalidManifest("file with empty path".into()));
            }
            file.filename()?;
            file.signature_filename()?;
        }
        Ok(())
    }
}

/// Parse a manifest; `.json` files are read as JSON, everything else as TOML.
pub fn parse_manifest(text: &str, json: bool) -> anyhow::Result<InstallInfo> {
    let info: InstallInfo = if json {
        serde_json::from_str(text).context("failed to parse JSON manifest")?
    } else {
        toml::from_str(text).context("failed to parse TOML manifest")?
    };
    info.validate().context("manifest failed validation")?;
    Ok(info)
}

pub fn load_manifest(path: &Path) -> anyhow::Result<InstallInfo> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    parse_manifest(&text, json).with_context(|| format!("Invalid manifest: {}", path.display()))
}
