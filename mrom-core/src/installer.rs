//! Ubuntu Touch installation orchestrator.
//!
//! One run: probe root's view of the download directory, acquire every file,
//! lock out cancellation, then stage a new ROM. The listener hears exactly one
//! `on_install_complete` per run unless the user cancelled.

use crate::acquisition::Acquisition;
use crate::cancel::CancelToken;
use crate::config::InstallerConfig;
use crate::downloader::{format_bytes, DownloadProgress, Fetch};
use crate::listener::{self, InstallEvent, InstallListener};
use crate::manifest::InstallInfo;
use crate::multirom::RomStore;
use crate::staging::{StagedRom, Stager};
use crate::su_paths::resolve_su_dir;
use crate::{InstallError, Result};
use log::{error, info, warn};
use mrom_hal::SuOps;
use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug)]
pub enum InstallOutcome {
    Succeeded(StagedRom),
    Failed(InstallError),
    Cancelled,
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Succeeded(_))
    }
}

/// Per-run state, dropped when the run ends.
#[derive(Debug, Clone)]
pub struct InstallSession {
    /// Download directory as the app sees it.
    pub local_dir: PathBuf,
    /// The same directory as root sees it.
    pub su_dir: PathBuf,
    pub cancel: CancelToken,
    /// Progress of the file currently downloading.
    pub progress: Cell<Option<DownloadProgress>>,
}

pub struct UbuntuInstaller {
    config: InstallerConfig,
    su: Arc<dyn SuOps>,
    roms: Arc<dyn RomStore>,
    fetcher: Arc<dyn Fetch>,
    listener: Arc<dyn InstallListener>,
}

impl UbuntuInstaller {
    pub fn new(
        config: InstallerConfig,
        su: Arc<dyn SuOps>,
        roms: Arc<dyn RomStore>,
        fetcher: Arc<dyn Fetch>,
        listener: Arc<dyn InstallListener>,
    ) -> Self {
        Self {
            config,
            su,
            roms,
            fetcher,
            listener,
        }
    }

    pub fn run(&self, info: &InstallInfo, cancel: &CancelToken) -> InstallOutcome {
        let outcome = match self.try_run(info, cancel) {
            Ok(staged) => InstallOutcome::Succeeded(staged),
            Err(err) if err.is_cancelled() => InstallOutcome::Cancelled,
            Err(err) => InstallOutcome::Failed(err),
        };

        match &outcome {
            InstallOutcome::Succeeded(staged) => {
                info!("Ubuntu Touch staged in {}", staged.path.display());
                self.listener.on_install_complete(true);
            }
            InstallOutcome::Failed(err) => {
                error!("Ubuntu Touch install failed: {}", err);
                self.listener.on_install_log(&err.to_string());
                self.listener.on_install_complete(false);
            }
            InstallOutcome::Cancelled => warn!("Ubuntu Touch install cancelled"),
        }
        outcome
    }

    fn start_session(&self, cancel: &CancelToken) -> Result<InstallSession> {
        let local_dir = self.config.staging_dir();
        fs::create_dir_all(&local_dir)?;

        let su_dir = resolve_su_dir(
            self.su.as_ref(),
            &local_dir,
            &self.config.path_rewrites,
            self.config.su_timeout(),
        )
        .inspect_err(|_| {
            self.listener
                .on_install_log("Failed to find the download folder as seen by su");
        })?;

        info!("Using download directory {}", local_dir.display());
        info!("Using su download directory {}", su_dir.display());
        Ok(InstallSession {
            local_dir,
            su_dir,
            cancel: cancel.clone(),
            progress: Cell::new(None),
        })
    }

    fn try_run(&self, info: &InstallInfo, cancel: &CancelToken) -> Result<StagedRom> {
        self.listener
            .on_progress_update(0, 0, true, "Preparing downloads");
        self.listener.on_install_log("Preparing downloads");
        info.validate()?;

        let session = self.start_session(cancel)?;

        let acquired = Acquisition {
            fetcher: self.fetcher.as_ref(),
            listener: self.listener.as_ref(),
            cancel: &session.cancel,
            base_url: &self.config.base_url,
            dest_dir: &session.local_dir,
            progress: Some(&session.progress),
        }
        .run(info.download_list());
        if let (Err(InstallError::Cancelled), Some(p)) = (&acquired, session.progress.get()) {
            info!(
                "Download stopped at {} of {}",
                format_bytes(p.downloaded),
                p.total.map_or_else(|| "unknown".to_string(), format_bytes)
            );
        }
        acquired?;

        if !session.cancel.lock() {
            return Err(InstallError::Cancelled);
        }
        self.listener
            .on_progress_update(0, 0, true, "Installing Ubuntu Touch");
        self.listener.enable_cancel(false);

        Stager {
            su: self.su.as_ref(),
            roms: self.roms.as_ref(),
            listener: self.listener.as_ref(),
            config: &self.config,
            su_source_dir: &session.su_dir,
            local_dir: &session.local_dir,
        }
        .stage(info)
    }
}

/// Run an install on a dedicated thread, reporting through an event channel.
pub fn spawn_install(
    config: InstallerConfig,
    su: Arc<dyn SuOps>,
    roms: Arc<dyn RomStore>,
    fetcher: Arc<dyn Fetch>,
    info: InstallInfo,
    cancel: CancelToken,
) -> Result<(JoinHandle<InstallOutcome>, Receiver<InstallEvent>)> {
    let (listener, rx) = listener::channel();
    let installer = UbuntuInstaller::new(config, su, roms, fetcher, Arc::new(listener));
    let handle = thread::Builder::new()
        .name("ubuntu-install".to_string())
        .spawn(move || installer.run(&info, &cancel))?;
    Ok((handle, rx))
}
