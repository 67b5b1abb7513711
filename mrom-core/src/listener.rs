//! Install progress reporting.
//!
//! The pipeline reports through [`InstallListener`]. The listener is the only
//! object shared between the install thread and observers, so implementations
//! must be `Send + Sync`.

use std::sync::mpsc::{self, Receiver, Sender};

pub trait InstallListener: Send + Sync {
    fn on_progress_update(&self, current: u64, total: u64, indeterminate: bool, label: &str);
    fn on_install_log(&self, line: &str);
    /// Called exactly once per run, unless the run was cancelled.
    fn on_install_complete(&self, success: bool);
    fn enable_cancel(&self, enabled: bool);
    /// Ask for the next reboot to go into recovery.
    fn request_recovery(&self, enabled: bool);
}

/// Shorten `text` to at most `max` characters for one-line log output,
/// keeping both ends.
pub fn shorten(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max || max < 5 {
        return text.to_string();
    }
    let keep = max - 3;
    let head: String = text.chars().take(keep / 2).collect();
    let tail: String = text.chars().skip(count - (keep - keep / 2)).collect();
    format!("{}...{}", head, tail)
}

/// Listener calls as values, for crossing thread boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    Progress {
        current: u64,
        total: u64,
        indeterminate: bool,
        label: String,
    },
    Log(String),
    Complete(bool),
    CancelEnabled(bool),
    RecoveryRequested(bool),
}

impl InstallEvent {
    /// Replay this event as the listener call it was recorded from.
    pub fn forward_to(&self, listener: &dyn InstallListener) {
        match self {
            InstallEvent::Progress {
                current,
                total,
                indeterminate,
                label,
            } => listener.on_progress_update(*current, *total, *indeterminate, label),
            InstallEvent::Log(line) => listener.on_install_log(line),
            InstallEvent::Complete(success) => listener.on_install_complete(*success),
            InstallEvent::CancelEnabled(enabled) => listener.enable_cancel(*enabled),
            InstallEvent::RecoveryRequested(enabled) => listener.request_recovery(*enabled),
        }
    }
}

/// Forwards every call as an [`InstallEvent`] over an mpsc channel.
///
/// Send errors (receiver gone) are ignored: nobody is watching any more.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: Sender<InstallEvent>,
}

impl ChannelListener {
    pub fn new(tx: Sender<InstallEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: InstallEvent) {
        let _ = self.tx.send(event);
    }
}

/// Create a listener and the receiving end of its events.
pub fn channel() -> (ChannelListener, Receiver<InstallEvent>) {
    let (tx, rx) = mpsc::channel();
    (ChannelListener::new(tx), rx)
}

impl InstallListener for ChannelListener {
    fn on_progress_update(&self, current: u64, total: u64, indeterminate: bool, label: &str) {
        self.send(InstallEvent::Progress {
            current,
            total,
            indeterminate,
            label: label.to_string(),
        });
    }

    fn on_install_log(&self, line: &str) {
        self.send(InstallEvent::Log(line.to_string()));
    }

    fn on_install_complete(&self, success: bool) {
        self.send(InstallEvent::Complete(success));
    }

    fn enable_cancel(&self, enabled: bool) {
        self.send(InstallEvent::CancelEnabled(enabled));
    }

    fn request_recovery(&self, enabled: bool) {
        self.send(InstallEvent::RecoveryRequested(enabled));
    }
}

/// Writes everything to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl InstallListener for LogListener {
    fn on_progress_update(&self, current: u64, total: u64, indeterminate: bool, label: &str) {
        if indeterminate {
            log::debug!("{}", label);
        } else {
            log::debug!("{} ({}/{})", label, current, total);
        }
    }

    fn on_install_log(&self, line: &str) {
        log::info!("{}", line);
    }

    fn on_install_complete(&self, success: bool) {
        if success {
            log::info!("Installation complete");
        } else {
            log::error!("Installation failed");
        }
    }

    fn enable_cancel(&self, enabled: bool) {
        log::debug!("cancel enabled: {}", enabled);
    }

    fn request_recovery(&self, enabled: bool) {
        log::info!("reboot to recovery requested: {}", enabled);
    }
}
