//! Interactive prompt seam.
//!
//! The pipeline never talks to the terminal directly; it goes through the
//! narrow [`Prompt`] capability set so tests can script answers and count
//! passphrase requests.

use std::io;

use colored::Colorize as _;
use dialoguer::Confirm;

use crate::error::{BootstrapError, Result};
use crate::passphrase::read_passphrase;

/// Capabilities the pipeline needs from an interactive user.
pub trait Prompt {
    /// Yes/no confirmation. Declining is an answer, not an error.
    fn confirm(&mut self, message: &str) -> Result<bool>;

    /// A fresh passphrase for one master-key decryption attempt.
    fn passphrase(&mut self, attempt: u32, total: u32) -> Result<String>;
}

/// Production prompt backed by the controlling terminal.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        match Confirm::new().with_prompt(message).default(false).interact() {
            Ok(answer) => Ok(answer),
            Err(err) => Err(from_prompt_err(err)),
        }
    }

    fn passphrase(&mut self, attempt: u32, total: u32) -> Result<String> {
        let prompt = format!(
            "{} ({}: {attempt}/{total}): ",
            "Password".blue().underline(),
            "Attempt".red().bold()
        );
        read_passphrase(&prompt)
    }
}

/// Map a dialoguer error; Ctrl-C surfaces as clean cancellation.
pub(crate) fn from_prompt_err(err: dialoguer::Error) -> BootstrapError {
    match err {
        dialoguer::Error::IO(io_err) if io_err.kind() == io::ErrorKind::Interrupted => {
            BootstrapError::Cancelled
        }
        dialoguer::Error::IO(io_err) => BootstrapError::Io(io_err),
    }
}
