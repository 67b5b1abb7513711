//! Resumable HTTP downloads.

use crate::cancel::CancelToken;
use crate::{InstallError, Result};
use log::{debug, info, warn};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use url::Url;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes present in the destination file, resume offset included.
    pub downloaded: u64,
    pub total: Option<u64>,
    pub speed_bytes_per_sec: u64,
}

/// Last non-empty path segment of `url`, ignoring query and fragment.
pub fn filename_from_url(url: &str) -> Option<&str> {
    let end = url.find(|c| c == '?' || c == '#').unwrap_or(url.len());
    let name = url[..end].rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Append a manifest path to the server base URL.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Format bytes into human readable string (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Outcome of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetched {
    /// Byte the body was written from. Zero when the server ignored a range
    /// request and the file was restarted.
    pub start_offset: u64,
    /// Final size of the local file.
    pub size: u64,
}

/// Fetches one remote file into a local path.
pub trait Fetch: Send + Sync {
    /// Download `url` into `dest`, asking to continue after `start_offset`
    /// bytes when it is non-zero.
    ///
    /// On cancellation the partial file is kept and
    /// [`InstallError::Cancelled`] is returned.
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        start_offset: u64,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<Fetched>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mrom-installer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| InstallError::Download {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", err),
            })?;
        Ok(Self { client })
    }
}

fn download_err(url: &str, reason: impl ToString) -> InstallError {
    InstallError::Download {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// First byte and total length from a `Content-Range: bytes a-b/total` header.
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (first, _last) = range.split_once('-')?;
    let first = first.trim().parse().ok()?;
    let total = total.trim().parse().ok();
    Some((first, total))
}

/// Open `dest` positioned at `offset` for a resumed transfer.
fn open_for_resume(dest: &Path, offset: u64) -> std::io::Result<File> {
    let mut file = OpenOptions::new().write(true).open(dest)?;
    let len = file.metadata()?.len();
    if len < offset {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("local file has {} bytes, cannot resume at {}", len, offset),
        ));
    }
    file.set_len(offset)?;
    file.seek(SeekFrom::End(0))?;
    Ok(file)
}

/// Decide how the response body lands on disk. Returns the open file, the byte
/// offset the body starts at and the expected final size.
fn prepare_destination(
    url: &str,
    response: &Response,
    dest: &Path,
    start_offset: u64,
) -> Result<(File, u64, Option<u64>)> {
    let status = response.status();
    if start_offset > 0 && status == StatusCode::PARTIAL_CONTENT {
        let header = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| download_err(url, "206 response without Content-Range"))?;
        let (first, total) = parse_content_range(header)
            .ok_or_else(|| download_err(url, format!("bad Content-Range: {}", header)))?;
        if first != start_offset {
            return Err(download_err(
                url,
                format!("asked to resume at {} but server sent {}", start_offset, header),
            ));
        }
        let total = total.or_else(|| response.content_length().map(|len| len + start_offset));
        let file = open_for_resume(dest, start_offset)?;
        info!("Resuming {} at {}", url, format_bytes(start_offset));
        return Ok((file, start_offset, total));
    }

    if status == StatusCode::RANGE_NOT_SATISFIABLE {
        return Err(download_err(
            url,
            format!("server refused to resume at byte {}", start_offset),
        ));
    }
    if !status.is_success() {
        return Err(download_err(url, format!("server returned {}", status)));
    }
    if start_offset > 0 {
        warn!(
            "{} ignored the range request ({}); restarting from byte 0",
            url, status
        );
    }
    Ok((File::create(dest)?, 0, response.content_length()))
}

impl Fetch for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        start_offset: u64,
        cancel: &CancelToken,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<Fetched> {
        let parsed =
            Url::parse(url).map_err(|e| InstallError::InvalidUrl(format!("{}: {}", url, e)))?;
        if filename_from_url(parsed.path()).is_none() {
            return Err(InstallError::InvalidUrl(url.to_string()));
        }
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        debug!("GET {} (offset {})", url, start_offset);
        let mut request = self.client.get(parsed);
        if start_offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", start_offset));
        }
        let mut response = request.send().map_err(|e| download_err(url, e))?;
        let (mut dest_file, offset, total) =
            prepare_destination(url, &response, dest, start_offset)?;

        let mut downloaded = offset;
        let mut buffer = [0u8; CHUNK_SIZE];
        let start_time = Instant::now();
        let mut last_emit: Option<Instant> = None;
        let snapshot = |downloaded: u64| {
            let elapsed = start_time.elapsed().as_secs_f64();
            let speed = if elapsed > 0.0 {
                (downloaded - offset) as f64 / elapsed
            } else {
                0.0
            };
            DownloadProgress {
                downloaded,
                total,
                speed_bytes_per_sec: speed as u64,
            }
        };

        loop {
            if cancel.is_cancelled() {
                dest_file.flush()?;
                info!("Download of {} cancelled at {}", url, format_bytes(downloaded));
                return Err(InstallError::Cancelled);
            }
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| download_err(url, e))?;
            if bytes_read == 0 {
                break;
            }
            dest_file.write_all(&buffer[..bytes_read])?;
            downloaded += bytes_read as u64;

            if last_emit.map_or(true, |t| t.elapsed() >= PROGRESS_INTERVAL) {
                progress(snapshot(downloaded));
                last_emit = Some(Instant::now());
            }
        }
        dest_file.flush()?;
        progress(snapshot(downloaded));

        if let Some(total) = total {
            if downloaded < total {
                return Err(download_err(
                    url,
                    format!("connection closed after {} of {} bytes", downloaded, total),
                ));
            }
        }
        Ok(Fetched {
            start_offset: offset,
            size: downloaded,
        })
    }
}
