//! CLI argument parsing for mrom

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mrom")]
#[command(version, about = "MultiROM Ubuntu Touch installer")]
#[command(long_about = "MultiROM Ubuntu Touch installer\n\n\
    Downloads an Ubuntu Touch image set, verifies it and stages it as a new\n\
    secondary ROM for the MultiROM recovery to install on next boot.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Installer config file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Download, verify and stage an Ubuntu Touch image set
    Install {
        /// Install manifest (.toml or .json)
        #[arg(long)]
        manifest: PathBuf,
    },

    /// Print the recovery command script for a manifest
    Script {
        /// Install manifest (.toml or .json)
        #[arg(long)]
        manifest: PathBuf,
    },

    /// Check that su works and find the download folder as root sees it
    Probe,

    /// Print the SHA-256 of a file
    Checksum {
        file: PathBuf,

        /// Fail unless the digest equals this hex string
        #[arg(long)]
        expected: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mrom",
            "install",
            "--manifest",
            "devel.toml",
            "--config",
            "mrom.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("mrom.toml")));
        assert!(matches!(cli.command, Command::Install { ref manifest } if manifest.ends_with("devel.toml")));
    }

    #[test]
    fn install_requires_manifest() {
        assert!(Cli::try_parse_from(["mrom", "install"]).is_err());
    }
}
