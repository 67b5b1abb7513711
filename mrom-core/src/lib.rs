//! MultiROM core library.
//!
//! `mrom-core` holds the Ubuntu Touch install pipeline: manifest types,
//! checksum verification, resumable downloads, the recovery command script,
//! privileged staging with rollback, and the orchestrator tying them together.
//! Higher-level crates (the `mrom` binary) only provide a listener and config.

pub mod acquisition;
pub mod cancel;
pub mod checksum;
pub mod command_script;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod installer;
pub mod listener;
pub mod logging;
pub mod manifest;
pub mod multirom;
pub mod staging;
pub mod su_paths;

pub use errors::{InstallError, Result};
