//! `mrom` command line front end for the MultiROM Ubuntu Touch installer.

use anyhow::{bail, Context};
use clap::Parser;
use mrom_core::cancel::CancelToken;
use mrom_core::checksum::{self, Verification};
use mrom_core::command_script::CommandScript;
use mrom_core::config::{load_config, InstallerConfig};
use mrom_core::downloader::{format_bytes, HttpFetcher};
use mrom_core::installer::{spawn_install, InstallOutcome};
use mrom_core::listener::{InstallEvent, LogListener};
use mrom_core::manifest::{load_manifest, InstallInfo};
use mrom_core::multirom::SuRomStore;
use mrom_core::su_paths::resolve_su_dir;
use mrom_hal::{SuOps, SuShell};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub mod cancel;
pub mod cli;

use cli::{Cli, Command};

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mrom_core::logging::init(cli.log_file.as_deref());

    match &cli.command {
        Command::Script { manifest } => {
            let info = load_manifest(manifest)?;
            let script = CommandScript::from_info(&info)?;
            print!("{}", script.render());
        }
        Command::Checksum { file, expected } => checksum(file, expected.as_deref())?,
        Command::Probe => {
            let config = load_config(cli.config.as_deref())?;
            probe(&config)?;
        }
        Command::Install { manifest } => {
            let config = load_config(cli.config.as_deref())?;
            let info = load_manifest(manifest)?;
            log::info!("Installing Ubuntu Touch channel {}", info.channel_name);
            install(config, info)?;
        }
    }
    Ok(())
}

fn checksum(file: &Path, expected: Option<&str>) -> anyhow::Result<()> {
    let digest = checksum::sha256_file(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{}  {}", digest, file.display());
    if let Some(expected) = expected {
        if let Verification::Mismatch { actual } = checksum::verify(file, expected) {
            bail!("checksum mismatch: expected {}, got {}", expected, actual);
        }
    }
    Ok(())
}

fn probe(config: &InstallerConfig) -> anyhow::Result<()> {
    let local_dir = config.staging_dir();
    fs::create_dir_all(&local_dir)
        .with_context(|| format!("Failed to create {}", local_dir.display()))?;
    let su = SuShell::new(&config.su_binary);
    log::info!("Probing su dir with {}", su.su_binary().display());
    let su_dir = resolve_su_dir(
        &su,
        &local_dir,
        &config.path_rewrites,
        config.su_timeout(),
    )
    .context("su probe failed")?;
    println!("{} -> {}", local_dir.display(), su_dir.display());
    Ok(())
}

fn install(config: InstallerConfig, info: InstallInfo) -> anyhow::Result<()> {
    let su: Arc<dyn SuOps> = Arc::new(SuShell::new(&config.su_binary));
    let roms = Arc::new(SuRomStore::new(
        su.clone(),
        &config.multirom_dir,
        config.su_timeout(),
    ));
    let fetcher = Arc::new(HttpFetcher::new(config.http_timeout())?);
    let token = CancelToken::new();
    cancel::install_ctrlc_handler(token.clone())?;

    let (handle, events) = spawn_install(config, su, roms, fetcher, info, token)?;
    for event in events {
        event.forward_to(&LogListener);
        if let Some(line) = render_event(&event) {
            eprintln!("{}", line);
        }
    }
    let outcome = handle
        .join()
        .map_err(|_| anyhow::anyhow!("install thread panicked"))?;

    match outcome {
        InstallOutcome::Succeeded(staged) => {
            println!(
                "ROM {} staged at {}. Reboot to recovery to finish the installation.",
                staged.rom.name,
                staged.path.display()
            );
            Ok(())
        }
        InstallOutcome::Failed(err) => Err(err).context("Ubuntu Touch installation failed"),
        InstallOutcome::Cancelled => bail!("Installation cancelled"),
    }
}

/// One stderr line per event; `None` for events with nothing to show.
pub fn render_event(event: &InstallEvent) -> Option<String> {
    match event {
        InstallEvent::Progress {
            current,
            total,
            indeterminate,
            label,
        } => Some(if *indeterminate || *total == 0 {
            format!("… {}", label)
        } else {
            let percent = current.saturating_mul(100) / total;
            format!(
                "… {} {}/{} ({}%)",
                label,
                format_bytes(*current),
                format_bytes(*total),
                percent
            )
        }),
        InstallEvent::Log(line) => Some(line.clone()),
        InstallEvent::CancelEnabled(false) => {
            Some("Cancellation disabled while writing the ROM".into())
        }
        InstallEvent::RecoveryRequested(true) => {
            Some("Next boot must go to recovery to complete the install".into())
        }
        InstallEvent::Complete(true) => Some("Installation complete".into()),
        InstallEvent::Complete(false) => Some("Installation failed".into()),
        _ => None,
    }
}
