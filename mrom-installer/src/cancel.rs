//! Ctrl+C cancellation handling.

use mrom_core::cancel::CancelToken;
use std::sync::OnceLock;

static HANDLER_SET: OnceLock<()> = OnceLock::new();

/// Route Ctrl+C to `token`. Requests that arrive once staging has locked the
/// token are refused and only logged.
pub fn install_ctrlc_handler(token: CancelToken) -> anyhow::Result<()> {
    if HANDLER_SET.get().is_some() {
        return Ok(());
    }

    ctrlc::set_handler(move || {
        if token.cancel() {
            log::info!("Cancellation requested (Ctrl+C).");
        } else {
            log::warn!("Installation is writing the ROM and can no longer be cancelled.");
        }
    })?;

    let _ = HANDLER_SET.set(());
    Ok(())
}
