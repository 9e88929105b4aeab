use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

/// A token that is cancelled when the process receives SIGINT or SIGTERM.
///
/// Requests in flight are abandoned and pending retries are not attempted.
pub fn set_up_process_interrupt_handler() -> Result<CancellationToken> {
    let cancel = CancellationToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted");
        handler_cancel.cancel();
    })
    .context("Error setting interrupt handler")?;
    Ok(cancel)
}
