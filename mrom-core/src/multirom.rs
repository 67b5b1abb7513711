//! ROM bookkeeping.
//!
//! Secondary ROMs live in `<multirom>/roms/<name>`. The installer only needs a
//! handful of operations from the bookkeeping side; [`RomStore`] names them and
//! [`SuRomStore`] implements them on the device through su.

use crate::{InstallError, Result};
use mrom_hal::{ShellCommand, ShellScript, SuOps};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// MultiROM's limit on ROM folder names.
pub const MAX_ROM_NAME: usize = 26;
pub const ROMS_DIR: &str = "roms";
pub const ICON_DATA_FILE: &str = ".icon_data";
const MAX_NAME_ATTEMPTS: usize = 100;

/// Role of a ROM in MultiROM. The installer only ever creates secondary ROMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomKind {
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    pub name: String,
    pub kind: RomKind,
}

impl Rom {
    pub fn secondary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RomKind::Secondary,
        }
    }
}

pub trait RomStore: Send + Sync {
    /// Create an empty, uniquely named ROM folder and return its path.
    fn new_rom_folder(&self, name_hint: &str) -> Result<PathBuf>;
    /// Create the directory layout an Ubuntu Touch ROM boots from.
    fn init_ubuntu_dir(&self, path: &Path) -> Result<()>;
    fn set_rom_icon(&self, rom: &Rom, path: &Path, icon: &str) -> Result<()>;
    fn rom_exists(&self, path: &Path) -> bool;
}

/// Replace characters MultiROM cannot show and cut to [`MAX_ROM_NAME`].
pub fn sanitize_rom_name(hint: &str) -> String {
    let name: String = hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_ROM_NAME)
        .collect();
    if name.is_empty() {
        "rom".to_string()
    } else {
        name
    }
}

/// First name derived from `base` that is not in `taken`.
pub fn unique_rom_name(base: &str, taken: &[String]) -> Option<String> {
    if !taken.iter().any(|t| t == base) {
        return Some(base.to_string());
    }
    (1..=MAX_NAME_ATTEMPTS).find_map(|i| {
        let suffix = format!("_{}", i);
        let keep = MAX_ROM_NAME.saturating_sub(suffix.len());
        let candidate: String = base.chars().take(keep).chain(suffix.chars()).collect();
        (!taken.contains(&candidate)).then_some(candidate)
    })
}

#[derive(Clone)]
pub struct SuRomStore {
    su: Arc<dyn SuOps>,
    multirom_dir: PathBuf,
    timeout: Duration,
}

impl SuRomStore {
    pub fn new(su: Arc<dyn SuOps>, multirom_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            su,
            multirom_dir: multirom_dir.into(),
            timeout,
        }
    }

    pub fn roms_dir(&self) -> PathBuf {
        self.multirom_dir.join(ROMS_DIR)
    }

    fn existing_names(&self) -> Result<Vec<String>> {
        let roms = self.roms_dir();
        let script = ShellScript::single(ShellCommand::make_dirs(&roms))
            .then(ShellCommand::new("ls").arg("-1").path_arg(&roms));
        let lines = self.su.run(&script, self.timeout)?;
        Ok(lines.into_iter().filter(|l| !l.is_empty()).collect())
    }
}

impl RomStore for SuRomStore {
    fn new_rom_folder(&self, name_hint: &str) -> Result<PathBuf> {
        let base = sanitize_rom_name(name_hint);
        let taken = self.existing_names()?;
        let name = unique_rom_name(&base, &taken)
            .ok_or_else(|| InstallError::RomAllocation(name_hint.to_string()))?;
        let path = self.roms_dir().join(&name);

        // Plain mkdir: fails instead of reusing a folder that appeared meanwhile.
        let script = ShellScript::single(ShellCommand::new("mkdir").path_arg(&path));
        self.su
            .run_confirmed(&script, self.timeout)
            .map_err(|err| {
                log::warn!("mkdir {} failed: {}", path.display(), err);
                InstallError::RomAllocation(name_hint.to_string())
            })?;
        log::info!("Allocated ROM folder {}", path.display());
        Ok(path)
    }

    fn init_ubuntu_dir(&self, path: &Path) -> Result<()> {
        let script = ShellScript::single(ShellCommand::make_dirs(&path.join("cache/recovery")))
            .then(ShellCommand::make_dirs(&path.join("system")))
            .then(ShellCommand::make_dirs(&path.join("data")))
            .then(ShellCommand::new("chmod").arg("-R").arg("0755").path_arg(path));
        self.su.run_confirmed(&script, self.timeout).map_err(|err| {
            log::warn!("init of {} failed: {}", path.display(), err);
            InstallError::RomInit(path.to_path_buf())
        })
    }

    fn set_rom_icon(&self, rom: &Rom, path: &Path, icon: &str) -> Result<()> {
        let data = path.join(ICON_DATA_FILE);
        let script = ShellScript::single(ShellCommand::print_line("predef_set").write_to(&data))
            .then(ShellCommand::print_line(icon).append_to(&data));
        self.su.run_confirmed(&script, self.timeout)?;
        log::debug!("icon of {} set to {}", rom.name, icon);
        Ok(())
    }

    fn rom_exists(&self, path: &Path) -> bool {
        self.su
            .check(&ShellCommand::dir_exists(path).into(), self.timeout)
    }
}
