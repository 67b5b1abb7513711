//! Locating the download directory from root's point of view.
//!
//! The app writes downloads through a public path such as
//! `/sdcard/Download/UbuntuTouch`, but root usually sees the same files under
//! `/data/media/0/...`. Copies into the ROM folder run as root, so the install
//! needs root's path. It is found by dropping a marker file into the public
//! directory and asking su which candidate path contains it.

use crate::config::PathRewrite;
use crate::{InstallError, Result};
use mrom_hal::{ShellCommand, SuOps};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SU_PROBE_FILE: &str = "ut_test_file";

/// The public path itself first, then each rewrite that applies.
pub fn candidate_dirs(local_dir: &Path, rewrites: &[PathRewrite]) -> Vec<PathBuf> {
    let mut candidates = vec![local_dir.to_path_buf()];
    for rewrite in rewrites {
        if let Some(path) = rewrite.apply(local_dir) {
            if !candidates.contains(&path) {
                candidates.push(path);
            }
        }
    }
    candidates
}

/// Return root's path for `local_dir`, or [`InstallError::SuDirNotFound`]
/// when su cannot see the marker anywhere (usually: su does not work).
pub fn resolve_su_dir(
    su: &dyn SuOps,
    local_dir: &Path,
    rewrites: &[PathRewrite],
    timeout: Duration,
) -> Result<PathBuf> {
    let marker = local_dir.join(SU_PROBE_FILE);
    File::create(&marker)?;

    let found = candidate_dirs(local_dir, rewrites).into_iter().find(|dir| {
        let probe = ShellCommand::file_exists(&dir.join(SU_PROBE_FILE));
        su.check(&probe.into(), timeout)
    });

    if let Err(err) = fs::remove_file(&marker) {
        log::debug!("could not remove {}: {}", marker.display(), err);
    }

    match found {
        Some(dir) => {
            log::info!("su sees {} as {}", local_dir.display(), dir.display());
            Ok(dir)
        }
        None => Err(InstallError::SuDirNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrom_hal::FakeSu;
    use tempfile::tempdir;

    const T: Duration = Duration::from_secs(10);

    #[test]
    fn candidates_follow_rewrites_without_duplicates() {
        let rewrites = vec![
            PathRewrite::new("/storage/emulated/legacy", "/data/media/0"),
            PathRewrite::new("/storage/emulated", "/data/media"),
            PathRewrite::new("/sdcard", "/data/media/0"),
        ];
        let dirs = candidate_dirs(Path::new("/storage/emulated/0/Download/UbuntuTouch"), &rewrites);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/storage/emulated/0/Download/UbuntuTouch"),
                PathBuf::from("/data/media/0/Download/UbuntuTouch"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn same_path_when_root_sees_it_directly() {
        let dir = tempdir().unwrap();
        let su = FakeSu::with_local_shell();
        let found = resolve_su_dir(&su, dir.path(), &[], T).unwrap();
        assert_eq!(found, dir.path());
        assert!(!dir.path().join(SU_PROBE_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn falls_back_to_rewritten_path() {
        let root = tempdir().unwrap();
        let public = root.path().join("public/UbuntuTouch");
        let private = root.path().join("private/UbuntuTouch");
        fs::create_dir_all(&public).unwrap();
        fs::create_dir_all(&private).unwrap();
        // What root would see through the bind mount.
        File::create(private.join(SU_PROBE_FILE)).unwrap();

        let su = FakeSu::with_local_shell();
        su.fail_on("/public/");
        let rewrites = vec![PathRewrite::new(
            root.path().join("public").to_string_lossy(),
            root.path().join("private").to_string_lossy(),
        )];

        let found = resolve_su_dir(&su, &public, &rewrites, T).unwrap();
        assert_eq!(found, private);
    }

    #[test]
    fn broken_su_is_reported() {
        let dir = tempdir().unwrap();
        let su = FakeSu::new();
        su.fail_on("test");
        let err = resolve_su_dir(&su, dir.path(), &[], T).unwrap_err();
        assert!(matches!(err, InstallError::SuDirNotFound));
    }
}
