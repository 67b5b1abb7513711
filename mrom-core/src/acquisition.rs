//! Download and verification of every file of an install, keyrings first.

use crate::cancel::CancelToken;
use crate::checksum::{self, Verification};
use crate::downloader::{format_bytes, join_url, DownloadProgress, Fetch};
use crate::listener::{shorten, InstallListener};
use crate::manifest::{DownloadList, UbuntuFile};
use crate::{InstallError, Result};
use log::{debug, info};
use std::cell::Cell;
use std::fs;
use std::path::Path;

const LABEL_WIDTH: usize = 40;

/// What to do with a payload given the local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPlan {
    Fresh,
    Resume(u64),
    /// Hash the local file; skip the download if it matches.
    VerifyExisting,
}

/// `local_len` is the size of the file already on disk, if any. Signatures
/// (`file == None`) are always fetched from scratch.
pub fn plan_download(local_len: Option<u64>, file: Option<&UbuntuFile>) -> DownloadPlan {
    match (local_len, file) {
        (Some(len), Some(file)) if len < file.size() => DownloadPlan::Resume(len),
        (Some(_), Some(file)) if file.checksum().is_some() => DownloadPlan::VerifyExisting,
        _ => DownloadPlan::Fresh,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Skipped,
    Downloaded,
    Resumed { from: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionReport {
    files: Vec<(String, FileOutcome)>,
}

impl AcquisitionReport {
    fn record(&mut self, name: &str, outcome: FileOutcome) {
        self.files.push((name.to_string(), outcome));
    }

    pub fn files(&self) -> &[(String, FileOutcome)] {
        &self.files
    }

    pub fn outcome(&self, name: &str) -> Option<FileOutcome> {
        self.files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, outcome)| *outcome)
    }

    pub fn skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|(_, o)| *o == FileOutcome::Skipped)
            .count()
    }
}

pub struct Acquisition<'a> {
    pub fetcher: &'a dyn Fetch,
    pub listener: &'a dyn InstallListener,
    pub cancel: &'a CancelToken,
    pub base_url: &'a str,
    pub dest_dir: &'a Path,
    /// Receives the latest progress snapshot of the file in flight.
    pub progress: Option<&'a Cell<Option<DownloadProgress>>>,
}

impl Acquisition<'_> {
    pub fn run(&self, list: DownloadList<'_>) -> Result<AcquisitionReport> {
        let mut report = AcquisitionReport::default();
        for (role, file) in list.iter() {
            debug!("acquiring {:?} {}", role, file.path());
            let name = file.filename()?;
            let outcome = self.acquire(file.path(), name, Some(file))?;
            report.record(name, outcome);

            if let (Some(sig_path), Some(sig_name)) = (file.signature(), file.signature_filename()?)
            {
                let outcome = self.acquire(sig_path, sig_name, None)?;
                report.record(sig_name, outcome);
            }
        }
        info!(
            "Acquired {} files ({} already present)",
            report.files.len(),
            report.skipped()
        );
        Ok(report)
    }

    fn log(&self, line: &str) {
        self.listener.on_install_log(line);
    }

    fn acquire(
        &self,
        remote_path: &str,
        name: &str,
        file: Option<&UbuntuFile>,
    ) -> Result<FileOutcome> {
        let dest = self.dest_dir.join(name);
        let local_len = fs::metadata(&dest).ok().map(|m| m.len());
        let short = shorten(name, LABEL_WIDTH);

        let offset = match plan_download(local_len, file) {
            DownloadPlan::Resume(from) => from,
            DownloadPlan::Fresh => 0,
            DownloadPlan::VerifyExisting => {
                let expected = file.and_then(UbuntuFile::checksum).unwrap_or_default();
                self.log(&format!("Checking file {}", short));
                if checksum::matches(&dest, expected) {
                    self.log("OK, skipping");
                    return Ok(FileOutcome::Skipped);
                }
                self.log("Checksum does not match, downloading again");
                0
            }
        };

        let url = join_url(self.base_url, remote_path);
        if offset > 0 {
            info!("Resuming {} at {}", name, format_bytes(offset));
        }
        let mut report = |p: DownloadProgress| self.report_progress(&short, p);
        let fetched = self
            .fetcher
            .fetch(&url, &dest, offset, self.cancel, &mut report)
            .inspect_err(|err| {
                if !err.is_cancelled() {
                    self.log(&format!("Failed to download {}", short));
                }
            })?;

        if let Some(expected) = file.and_then(UbuntuFile::checksum) {
            self.log(&format!("Checking file {}", short));
            match checksum::verify(&dest, expected) {
                Verification::Match => self.log("OK"),
                other => {
                    self.log("Failed");
                    return Err(InstallError::ChecksumMismatch {
                        file: name.to_string(),
                        expected: expected.to_string(),
                        actual: other.actual().to_string(),
                    });
                }
            }
        }

        Ok(if fetched.start_offset > 0 {
            FileOutcome::Resumed {
                from: fetched.start_offset,
            }
        } else {
            FileOutcome::Downloaded
        })
    }

    fn report_progress(&self, name: &str, progress: DownloadProgress) {
        if let Some(slot) = self.progress {
            slot.set(Some(progress));
        }
        let speed = format_bytes(progress.speed_bytes_per_sec);
        let label = format!("Downloading {} ({}/s)", name, speed);
        match progress.total {
            Some(total) => {
                self.listener
                    .on_progress_update(progress.downloaded, total, false, &label)
            }
            None => self.listener.on_progress_update(0, 0, true, &label),
        }
    }
}
