//! Installer configuration.
//!
//! Device data (system-image base URL, storage layout) and user preferences are
//! read from a TOML file. Every field has a default so a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Subdirectory of the download dir that holds Ubuntu Touch files.
pub const UBUNTU_DOWNLOAD_DIR: &str = "UbuntuTouch";

pub const ENV_BASE_URL: &str = "MROM_BASE_URL";
pub const ENV_DOWNLOAD_DIR: &str = "MROM_DOWNLOAD_DIR";

/// Maps a path prefix visible to the app onto the prefix root sees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathRewrite {
    pub public: String,
    pub private: String,
}

impl PathRewrite {
    pub fn new(public: impl Into<String>, private: impl Into<String>) -> Self {
        Self {
            public: public.into(),
            private: private.into(),
        }
    }

    /// Rewrite `path` if it lives under `public`.
    pub fn apply(&self, path: &Path) -> Option<PathBuf> {
        let rest = path.strip_prefix(&self.public).ok()?;
        Some(Path::new(&self.private).join(rest))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallerConfig {
    /// Base URL of the system-image server; manifest paths are appended to it.
    pub base_url: String,
    /// Public download directory (as seen by the app, not by root).
    pub download_dir: PathBuf,
    /// MultiROM installation directory on internal storage.
    pub multirom_dir: PathBuf,
    pub su_binary: PathBuf,
    pub su_timeout_secs: u64,
    /// Bound for copying a single payload through su.
    pub copy_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// Remove local payloads once they have been copied into the ROM folder.
    pub delete_used_files: bool,
    pub rom_icon: String,
    pub path_rewrites: Vec<PathRewrite>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://system-image.ubports.com".to_string(),
            download_dir: PathBuf::from("/sdcard/Download"),
            multirom_dir: PathBuf::from("/data/media/0/multirom"),
            su_binary: PathBuf::from("su"),
            su_timeout_secs: 120,
            copy_timeout_secs: 30 * 60,
            http_timeout_secs: 60 * 60,
            delete_used_files: false,
            rom_icon: "romic_ubuntu1".to_string(),
            path_rewrites: vec![
                PathRewrite::new("/storage/emulated/legacy", "/data/media/0"),
                PathRewrite::new("/storage/emulated", "/data/media"),
                PathRewrite::new("/sdcard", "/data/media/0"),
                PathRewrite::new("/mnt/sdcard", "/data/media/0"),
            ],
        }
    }
}

impl InstallerConfig {
    /// Local directory downloads are staged in.
    pub fn staging_dir(&self) -> PathBuf {
        self.download_dir.join(UBUNTU_DOWNLOAD_DIR)
    }

    pub fn su_timeout(&self) -> Duration {
        Duration::from_secs(self.su_timeout_secs)
    }

    pub fn copy_timeout(&self) -> Duration {
        Duration::from_secs(self.copy_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Apply overrides from a variable lookup (normally the process env).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(dir) = lookup(ENV_DOWNLOAD_DIR).filter(|v| !v.trim().is_empty()) {
            self.download_dir = PathBuf::from(dir.trim());
        }
    }
}

pub fn parse_config(toml_text: &str) -> Result<InstallerConfig> {
    toml::from_str(toml_text).context("failed to parse installer config TOML")
}

/// Load the config file (defaults when `path` is `None`) and apply env overrides.
pub fn load_config(path: Option<&Path>) -> Result<InstallerConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            parse_config(&text)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        }
        None => InstallerConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    log::debug!("installer config: {:?}", config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
base_url = "http://localhost:8080"
delete_used_files = true
"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert!(config.delete_used_files);
        assert_eq!(config.su_timeout_secs, 120);
        assert_eq!(
            config.staging_dir(),
            PathBuf::from("/sdcard/Download/UbuntuTouch")
        );
    }

    #[test]
    fn rewrites_can_be_replaced() {
        let config = parse_config(
            r#"
[[path_rewrites]]
public = "/storage/self/primary"
private = "/data/media/0"
"#,
        )
        .unwrap();
        assert_eq!(config.path_rewrites.len(), 1);
        assert_eq!(
            config.path_rewrites[0].apply(Path::new("/storage/self/primary/Download")),
            Some(PathBuf::from("/data/media/0/Download"))
        );
    }

    #[test]
    fn rewrite_only_matches_whole_components() {
        let rewrite = PathRewrite::new("/sdcard", "/data/media/0");
        assert_eq!(rewrite.apply(Path::new("/sdcard2/x")), None);
        assert_eq!(
            rewrite.apply(Path::new("/sdcard/Download/UbuntuTouch")),
            Some(PathBuf::from("/data/media/0/Download/UbuntuTouch"))
        );
    }

    #[test]
    fn overrides_replace_base_url_and_download_dir() {
        let mut config = InstallerConfig::default();
        config.apply_overrides(|key| match key {
            ENV_BASE_URL => Some(" http://mirror.local ".to_string()),
            ENV_DOWNLOAD_DIR => Some("/tmp/dl".to_string()),
            _ => None,
        });
        assert_eq!(config.base_url, "http://mirror.local");
        assert_eq!(config.staging_dir(), PathBuf::from("/tmp/dl/UbuntuTouch"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let mut config = InstallerConfig::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config, InstallerConfig::default());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/mrom.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
