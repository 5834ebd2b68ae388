//! Ctrl+C (SIGINT) handling.
//!
//! An interrupt anywhere outside raw-mode passphrase entry terminates the
//! whole run cleanly: the staging directory is removed so no plaintext key
//! material survives a cancelled run, and the process exits 0. During
//! passphrase entry the terminal is in raw mode, so Ctrl-C arrives as a key
//! event instead and surfaces as [`crate::error::BootstrapError::Cancelled`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{BootstrapError, Result};

/// Staging directory to drop on interrupt, registered once it exists.
static STAGING_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Install the SIGINT handler. Call once, before the pipeline starts.
pub fn init() -> Result<()> {
    ctrlc::set_handler(|| {
        println!();
        tracing::info!("Interrupted by user, exiting...");
        remove_staging();
        std::process::exit(0);
    })
    .map_err(|err| BootstrapError::system(format!("failed to set Ctrl-C handler: {err}")))?;
    tracing::debug!("SIGINT handler initialised");
    Ok(())
}

/// Register the staging directory for removal on interrupt.
pub fn register_staging(path: &Path) {
    if let Ok(mut guard) = STAGING_DIR.lock() {
        *guard = Some(path.to_path_buf());
    }
}

/// Remove the registered staging directory, if any. Also used by the main
/// error path when a prompt reports cancellation.
pub fn remove_staging() {
    if let Ok(mut guard) = STAGING_DIR.lock()
        && let Some(path) = guard.take()
    {
        let _ = fs::remove_dir_all(path);
    }
}
