//! Privileged staging of a verified download set into a new ROM folder.
//!
//! Steps run strictly in order. From the moment the ROM folder exists it is
//! owned by a [`RollbackGuard`]; any failure drops the guard, which deletes the
//! whole folder so MultiROM never lists a half-built ROM.

use crate::command_script::CommandScript;
use crate::config::InstallerConfig;
use crate::listener::{shorten, InstallListener};
use crate::manifest::InstallInfo;
use crate::multirom::{Rom, RomStore};
use crate::{InstallError, Result};
use log::{info, warn};
use mrom_hal::{ShellCommand, SuOps};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const RECOVERY_DIR: &str = "cache/recovery";
pub const COMMAND_FILE: &str = "ubuntu_command";
pub const BASE_URL_FILE: &str = "base_url";
pub const ROM_NAME_PREFIX: &str = "utouch_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingStep {
    AllocateSlot,
    InitLayout,
    WriteCommandScript,
    CopyFiles,
    WriteMetadata,
    Finalize,
}

impl StagingStep {
    pub fn name(&self) -> &'static str {
        match self {
            StagingStep::AllocateSlot => "Allocating ROM folder",
            StagingStep::InitLayout => "Initializing ROM layout",
            StagingStep::WriteCommandScript => "Writing recovery command script",
            StagingStep::CopyFiles => "Copying files",
            StagingStep::WriteMetadata => "Writing base URL",
            StagingStep::Finalize => "Finalizing",
        }
    }
}

/// RAII guard that deletes a ROM folder through su when dropped.
pub struct RollbackGuard<'a> {
    su: &'a dyn SuOps,
    path: PathBuf,
    timeout: Duration,
    active: bool,
}

impl<'a> RollbackGuard<'a> {
    pub fn new(su: &'a dyn SuOps, path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            su,
            path: path.into(),
            timeout,
            active: true,
        }
    }

    /// Keep the folder and return its path.
    pub fn release(mut self) -> PathBuf {
        self.active = false;
        self.path.clone()
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        warn!("Rolling back ROM folder {}", self.path.display());
        let script = ShellCommand::remove_tree(&self.path).into();
        if let Err(err) = self.su.run_confirmed(&script, self.timeout) {
            warn!(
                "rollback failed to remove {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

/// A ROM folder that is ready for the recovery to install into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRom {
    pub rom: Rom,
    pub path: PathBuf,
}

/// Everything the staging steps touch.
pub struct Stager<'a> {
    pub su: &'a dyn SuOps,
    pub roms: &'a dyn RomStore,
    pub listener: &'a dyn InstallListener,
    pub config: &'a InstallerConfig,
    /// Download directory as root sees it.
    pub su_source_dir: &'a Path,
    /// Download directory as the app sees it.
    pub local_dir: &'a Path,
}

impl Stager<'_> {
    fn start_step(&self, step: StagingStep) {
        info!("Staging step: {}", step.name());
    }

    fn log(&self, line: &str) {
        self.listener.on_install_log(line);
    }

    pub fn stage(&self, info: &InstallInfo) -> Result<StagedRom> {
        let timeout = self.config.su_timeout();

        self.start_step(StagingStep::AllocateSlot);
        let name_hint = format!("{}{}", ROM_NAME_PREFIX, info.channel_name);
        let path = self.roms.new_rom_folder(&name_hint).inspect_err(|_| {
            self.log("Failed to create ROM folder");
        })?;
        let guard = RollbackGuard::new(self.su, path.clone(), timeout);
        let rom_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name_hint.clone());
        let rom = Rom::secondary(rom_name);
        self.log(&format!("Installing ROM {}", rom.name));

        self.start_step(StagingStep::InitLayout);
        self.roms.init_ubuntu_dir(&path).inspect_err(|_| {
            self.log("Failed to initialize ROM folder");
        })?;
        if let Err(err) = self.roms.set_rom_icon(&rom, &path, &self.config.rom_icon) {
            warn!("Could not set icon of {}: {}", rom.name, err);
        }

        let recovery = path.join(RECOVERY_DIR);

        self.start_step(StagingStep::WriteCommandScript);
        CommandScript::from_info(info)
            .and_then(|script| script.write(self.su, &recovery.join(COMMAND_FILE), timeout))
            .inspect_err(|err| self.log(&format!("Failed to write command file: {}", err)))?;

        self.start_step(StagingStep::CopyFiles);
        self.copy_files(info, &recovery)?;

        self.start_step(StagingStep::WriteMetadata);
        self.write_base_url(&recovery)?;

        self.start_step(StagingStep::Finalize);
        let path = guard.release();
        self.listener.request_recovery(true);

        if self.config.delete_used_files {
            self.delete_used_files(info);
        }

        Ok(StagedRom { rom, path })
    }

    fn copy_one(&self, filename: &str, recovery: &Path) -> Result<()> {
        let script = ShellCommand::copy_file(
            &self.su_source_dir.join(filename),
            &recovery.join(filename),
        )
        .into();
        self.su
            .run_confirmed(&script, self.config.copy_timeout())
            .map_err(|err| {
                warn!("copy of {} failed: {}", filename, err);
                self.log(&format!("Failed to copy file {}", filename));
                InstallError::Copy(filename.to_string())
            })
    }

    fn copy_files(&self, info: &InstallInfo, recovery: &Path) -> Result<()> {
        for (_, file) in info.download_list().iter() {
            let filename = file.filename()?;
            self.log(&format!("Copying file {}", shorten(filename, 40)));
            self.copy_one(filename, recovery)?;
            if let Some(sig) = file.signature_filename()? {
                self.copy_one(sig, recovery)?;
            }
            self.log("OK");
        }
        Ok(())
    }

    fn write_base_url(&self, recovery: &Path) -> Result<()> {
        let script = ShellCommand::print_line(&self.config.base_url)
            .write_to(recovery.join(BASE_URL_FILE))
            .into();
        self.su
            .run_confirmed(&script, self.config.su_timeout())
            .map_err(|err| {
                self.log("Failed to write base URL");
                InstallError::Metadata(err.to_string())
            })
    }

    /// Best-effort removal of the local copies; failures are only logged.
    fn delete_used_files(&self, info: &InstallInfo) {
        self.log("Deleting used files");
        for name in staged_file_names(info) {
            remove_local(&self.local_dir.join(name));
        }
    }
}

fn remove_local(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!("Could not delete {}: {}", path.display(), err);
    }
}

/// Names of every file the ROM folder receives, payloads and signatures.
pub fn staged_file_names(info: &InstallInfo) -> Vec<String> {
    info.download_list()
        .iter()
        .flat_map(|(_, f)| {
            let payload = f.filename().ok().map(str::to_string);
            let sig = f.signature_filename().ok().flatten().map(str::to_string);
            payload.into_iter().chain(sig)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{channel, InstallEvent};
    use crate::manifest::UbuntuFile;
    use crate::multirom::{RomKind, SuRomStore};
    use mrom_hal::FakeSu;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _root: TempDir,
        local: PathBuf,
        multirom: PathBuf,
        config: InstallerConfig,
        su: Arc<FakeSu>,
        roms: SuRomStore,
    }

    fn fixture() -> Fixture {
        let root = tempdir().unwrap();
        let local = root.path().join("Download/UbuntuTouch");
        let multirom = root.path().join("multirom");
        fs::create_dir_all(&local).unwrap();
        let config = InstallerConfig {
            base_url: "http://system-image.example".to_string(),
            multirom_dir: multirom.clone(),
            su_timeout_secs: 10,
            copy_timeout_secs: 10,
            ..Default::default()
        };
        let su = Arc::new(FakeSu::with_local_shell());
        let roms = SuRomStore::new(su.clone(), &multirom, Duration::from_secs(10));
        Fixture {
            _root: root,
            local,
            multirom,
            config,
            su,
            roms,
        }
    }

    fn info() -> InstallInfo {
        InstallInfo::new(
            "devel",
            vec![UbuntuFile::new("/gpg/k.tar.gz").with_signature("/gpg/k.tar.gz.asc")],
            vec![
                UbuntuFile::new("/pool/a.img"),
                UbuntuFile::new("/pool/b.img").with_signature("/pool/b.img.asc"),
            ],
        )
    }

    fn write_locals(dir: &Path) {
        for name in ["k.tar.gz", "k.tar.gz.asc", "a.img", "b.img", "b.img.asc"] {
            fs::write(dir.join(name), name.as_bytes()).unwrap();
        }
    }

    #[cfg(unix)]
    #[test]
    fn stages_complete_rom_folder() {
        let fx = fixture();
        write_locals(&fx.local);
        let (listener, rx) = channel();
        let stager = Stager {
            su: fx.su.as_ref(),
            roms: &fx.roms,
            listener: &listener,
            config: &fx.config,
            su_source_dir: &fx.local,
            local_dir: &fx.local,
        };

        let staged = stager.stage(&info()).unwrap();
        drop(stager);
        drop(listener);

        assert_eq!(staged.path, fx.multirom.join("roms/utouch_devel"));
        assert_eq!(staged.rom.kind, RomKind::Secondary);
        let recovery = staged.path.join(RECOVERY_DIR);
        for name in ["k.tar.gz", "k.tar.gz.asc", "a.img", "b.img", "b.img.asc"] {
            assert_eq!(fs::read(recovery.join(name)).unwrap(), name.as_bytes());
        }
        assert_eq!(
            fs::read_to_string(recovery.join(BASE_URL_FILE)).unwrap(),
            "http://system-image.example\n"
        );
        assert!(fs::read_to_string(recovery.join(COMMAND_FILE))
            .unwrap()
            .contains("update b.img b.img.asc\n"));
        // Local files are kept unless configured otherwise.
        assert!(fx.local.join("a.img").exists());

        let events: Vec<_> = rx.iter().collect();
        assert!(events.contains(&InstallEvent::RecoveryRequested(true)));
        assert!(events.contains(&InstallEvent::Log("Installing ROM utouch_devel".into())));
    }

    #[cfg(unix)]
    #[test]
    fn copy_failure_on_second_file_rolls_back() {
        let fx = fixture();
        write_locals(&fx.local);
        fx.su.fail_on(format!("cat '{}/a.img'", fx.local.display()));
        let (listener, _rx) = channel();
        let stager = Stager {
            su: fx.su.as_ref(),
            roms: &fx.roms,
            listener: &listener,
            config: &fx.config,
            su_source_dir: &fx.local,
            local_dir: &fx.local,
        };

        let err = stager.stage(&info()).unwrap_err();

        assert!(matches!(err, InstallError::Copy(ref name) if name == "a.img"));
        let rom = fx.multirom.join("roms/utouch_devel");
        assert!(!fx.roms.rom_exists(&rom));
        assert!(fx
            .su
            .scripts()
            .iter()
            .any(|s| s.starts_with("rm '-rf'") && s.contains("utouch_devel")));
    }

    #[cfg(unix)]
    #[test]
    fn missing_local_file_rolls_back() {
        let fx = fixture();
        // Nothing downloaded: the first cat fails.
        let (listener, _rx) = channel();
        let stager = Stager {
            su: fx.su.as_ref(),
            roms: &fx.roms,
            listener: &listener,
            config: &fx.config,
            su_source_dir: &fx.local,
            local_dir: &fx.local,
        };

        assert!(stager.stage(&info()).is_err());
        assert!(!fx.multirom.join("roms/utouch_devel").exists());
    }

    fn assert_rolled_back(fx: &Fixture) {
        let rom = fx.multirom.join("roms/utouch_devel");
        assert!(!rom.exists());
        let rm = format!("rm '-rf' '{}'", rom.display());
        assert!(fx.su.scripts().iter().any(|s| s.starts_with(&rm)));
    }

    #[cfg(unix)]
    #[test]
    fn init_failure_rolls_back() {
        let fx = fixture();
        write_locals(&fx.local);
        fx.su.fail_on("chmod");
        let (listener, _rx) = channel();
        let stager = Stager {
            su: fx.su.as_ref(),
            roms: &fx.roms,
            listener: &listener,
            config: &fx.config,
            su_source_dir: &fx.local,
            local_dir: &fx.local,
        };

        let err = stager.stage(&info()).unwrap_err();

        assert!(matches!(err, InstallError::RomInit(_)));
        assert_rolled_back(&fx);
    }

    #[cfg(unix)]
    #[test]
    fn command_script_failure_rolls_back() {
        let fx = fixture();
        write_locals(&fx.local);
        fx.su.fail_on("ubuntu_command.tmp");
        let (listener, _rx) = channel();
        let stager = Stager {
            su: fx.su.as_ref(),
            roms: &fx.roms,
            listener: &listener,
            config: &fx.config,
            su_source_dir: &fx.local,
            local_dir: &fx.local,
        };

        let err = stager.stage(&info()).unwrap_err();

        assert!(matches!(err, InstallError::CommandScript(_)));
        assert_rolled_back(&fx);
        // Nothing was copied before the script failed.
        assert!(!fx.su.scripts().iter().any(|s| s.starts_with("cat ")));
    }

    #[cfg(unix)]
    #[test]
    fn metadata_failure_rolls_back() {
        let fx = fixture();
        write_locals(&fx.local);
        fx.su.fail_on(BASE_URL_FILE);
        let (listener, _rx) = channel();
        let stager = Stager {
            su: fx.su.as_ref(),
            roms: &fx.roms,
            listener: &listener,
            config: &fx.config,
            su_source_dir: &fx.local,
            local_dir: &fx.local,
        };

        let err = stager.stage(&info()).unwrap_err();
        assert!(matches!(err, InstallError::Metadata(_)));
        assert!(!fx.multirom.join("roms/utouch_devel").exists());
    }

    #[cfg(unix)]
    #[test]
    fn delete_used_files_after_success() {
        let mut fx = fixture();
        fx.config.delete_used_files = true;
        write_locals(&fx.local);
        let (listener, _rx) = channel();
        let stager = Stager {
            su: fx.su.as_ref(),
            roms: &fx.roms,
            listener: &listener,
            config: &fx.config,
            su_source_dir: &fx.local,
            local_dir: &fx.local,
        };

        stager.stage(&info()).unwrap();

        for name in ["k.tar.gz", "k.tar.gz.asc", "a.img", "b.img", "b.img.asc"] {
            assert!(!fx.local.join(name).exists(), "{} still present", name);
        }
    }

    #[test]
    fn allocation_failure_has_nothing_to_roll_back() {
        let su = FakeSu::new();
        su.fail_on("mkdir '/");
        let roms = SuRomStore::new(
            Arc::new(su.clone()),
            "/data/media/0/multirom",
            Duration::from_secs(5),
        );
        let config = InstallerConfig::default();
        let (listener, rx) = channel();
        let stager = Stager {
            su: &su,
            roms: &roms,
            listener: &listener,
            config: &config,
            su_source_dir: Path::new("/data/media/0/Download/UbuntuTouch"),
            local_dir: Path::new("/sdcard/Download/UbuntuTouch"),
        };

        let err = stager.stage(&info()).unwrap_err();
        drop(stager);
        drop(listener);

        assert!(matches!(err, InstallError::RomAllocation(_)));
        assert!(!su.scripts().iter().any(|s| s.starts_with("rm ")));
        let events: Vec<_> = rx.iter().collect();
        assert!(events.contains(&InstallEvent::Log("Failed to create ROM folder".into())));
    }

    #[test]
    fn staged_names_include_signatures() {
        assert_eq!(
            staged_file_names(&info()),
            vec!["k.tar.gz", "k.tar.gz.asc", "a.img", "b.img", "b.img.asc"]
        );
    }
}
