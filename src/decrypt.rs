//! The two-tier decryption model.
//!
//! Tier one: a per-principal master key, GPG-encrypted at rest behind a human
//! passphrase. Tier two: derived secrets (LUKS passphrases, secure-boot key
//! components), sops-encrypted at rest behind a master key.
//!
//! The retry policy is asymmetric on purpose. A wrong passphrase is a human
//! mistake and gets [`MASTER_KEY_ATTEMPTS`] tries; failing to decrypt a
//! derived secret means the key material itself is wrong and retrying cannot
//! help, so it is fatal on the first attempt with its own exit status.

use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::error::{BootstrapError, Result};
use crate::prompt::Prompt;

/// Total passphrase attempts before a master-key decryption fails closed.
pub const MASTER_KEY_ATTEMPTS: u32 = 3;

/// A single failed cipher operation, as reported by the backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CipherError(pub String);

/// Cipher operations the pipeline needs.
///
/// The production backend shells out; tests substitute deterministic
/// implementations to exercise the retry and failure policies.
pub trait CipherBackend {
    /// Decrypt a passphrase-protected master key file into `output`.
    ///
    /// `output` is created fresh; a partial write from an earlier failed
    /// attempt is overwritten on retry.
    fn decrypt_master_key(
        &self,
        input: &Path,
        output: &Path,
        passphrase: &str,
    ) -> std::result::Result<(), CipherError>;

    /// Decrypt a sops-managed secret into `output`, keyed by the master key
    /// material in `key_file`. No prompt, no retry. The payload may be
    /// binary; the backend must write exactly the decrypted bytes.
    fn decrypt_with_key(
        &self,
        input: &Path,
        output: &Path,
        key_file: &Path,
    ) -> std::result::Result<(), CipherError>;
}

/// Production backend: `gpg` for master keys, `sops` for derived secrets.
///
/// The key-file location reaches sops as an environment override scoped to
/// that single child process; the parent environment is never mutated.
pub struct SopsGpgBackend;

impl CipherBackend for SopsGpgBackend {
    fn decrypt_master_key(
        &self,
        input: &Path,
        output: &Path,
        passphrase: &str,
    ) -> std::result::Result<(), CipherError> {
        let mut child = Command::new("gpg")
            .args(["--batch", "--yes", "--pinentry-mode", "loopback"])
            .args(["--passphrase-fd", "0"])
            .arg("--output")
            .arg(output)
            .arg("--decrypt")
            .arg(input)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| CipherError(format!("failed to launch gpg: {err}")))?;

        {
            let mut stdin = child.stdin.take().expect("gpg stdin is piped");
            stdin
                .write_all(passphrase.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"))
                .map_err(|err| CipherError(format!("failed to send passphrase: {err}")))?;
        }

        let out = child
            .wait_with_output()
            .map_err(|err| CipherError(format!("failed waiting for gpg: {err}")))?;
        if out.status.success() {
            Ok(())
        } else {
            Err(CipherError(stderr_summary(&out.stderr, "gpg", out.status.code())))
        }
    }

    fn decrypt_with_key(
        &self,
        input: &Path,
        output: &Path,
        key_file: &Path,
    ) -> std::result::Result<(), CipherError> {
        let out = Command::new("sops")
            .arg("--output")
            .arg(output)
            .arg("--decrypt")
            .arg(input)
            .env("SOPS_AGE_KEY_FILE", key_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| CipherError(format!("failed to launch sops: {err}")))?;
        if out.status.success() {
            Ok(())
        } else {
            Err(CipherError(stderr_summary(&out.stderr, "sops", out.status.code())))
        }
    }
}

fn stderr_summary(stderr: &[u8], tool: &str, code: Option<i32>) -> String {
    let message = String::from_utf8_lossy(stderr);
    let message = message.trim();
    if message.is_empty() {
        format!("{tool} exited with code {}", code.unwrap_or(-1))
    } else {
        message.to_string()
    }
}

/// Decrypt one master key, prompting for the passphrase on every attempt.
///
/// The passphrase is requested fresh per attempt, never cached. After
/// [`MASTER_KEY_ATTEMPTS`] failures the run fails closed; cancellation during
/// entry propagates unchanged so the process can exit clean.
pub fn decrypt_master_key(
    backend: &dyn CipherBackend,
    prompt: &mut dyn Prompt,
    input: &Path,
    output: &Path,
) -> Result<()> {
    tracing::info!("Decrypting: {}...", input.display());
    let mut attempts = 0;
    while attempts < MASTER_KEY_ATTEMPTS {
        let passphrase = prompt.passphrase(attempts + 1, MASTER_KEY_ATTEMPTS)?;
        match backend.decrypt_master_key(input, output, &passphrase) {
            Ok(()) => {
                tracing::info!(
                    "Successfully decrypted: {} -> {}",
                    input.display(),
                    output.display()
                );
                return Ok(());
            }
            Err(err) => {
                attempts += 1;
                tracing::error!(
                    "Wrong password or decryption error (attempt {attempts}/{MASTER_KEY_ATTEMPTS}) for {}: {err}",
                    input.display()
                );
            }
        }
    }
    Err(BootstrapError::MasterKeyDecrypt {
        path: input.to_path_buf(),
        attempts,
    })
}

/// Decrypt one derived secret with a previously staged master key.
pub fn decrypt_secret(
    backend: &dyn CipherBackend,
    input: &Path,
    output: &Path,
    key_file: &Path,
) -> Result<()> {
    tracing::info!("Decrypting: {}", input.display());
    backend
        .decrypt_with_key(input, output, key_file)
        .map_err(|err| BootstrapError::SecretDecrypt {
            path: input.to_path_buf(),
            reason: err.to_string(),
        })?;
    tracing::info!(
        "Successfully decrypted: {} -> {}",
        input.display(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::PathBuf;

    /// Backend that fails a scripted number of times, then succeeds.
    struct FlakyBackend {
        failures_left: Cell<u32>,
        master_calls: Cell<u32>,
        secret_calls: Cell<u32>,
    }

    impl FlakyBackend {
        fn failing(n: u32) -> Self {
            Self {
                failures_left: Cell::new(n),
                master_calls: Cell::new(0),
                secret_calls: Cell::new(0),
            }
        }
    }

    impl CipherBackend for FlakyBackend {
        fn decrypt_master_key(
            &self,
            _input: &Path,
            _output: &Path,
            _passphrase: &str,
        ) -> std::result::Result<(), CipherError> {
            self.master_calls.set(self.master_calls.get() + 1);
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(CipherError("bad passphrase".into()));
            }
            Ok(())
        }

        fn decrypt_with_key(
            &self,
            _input: &Path,
            _output: &Path,
            _key_file: &Path,
        ) -> std::result::Result<(), CipherError> {
            self.secret_calls.set(self.secret_calls.get() + 1);
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(CipherError("mac mismatch".into()));
            }
            Ok(())
        }
    }

    /// Prompt returning a canned passphrase, optionally cancelling at a
    /// given invocation.
    struct CountingPrompt {
        calls: u32,
        cancel_at: Option<u32>,
    }

    impl CountingPrompt {
        fn new() -> Self {
            Self {
                calls: 0,
                cancel_at: None,
            }
        }
    }

    impl Prompt for CountingPrompt {
        fn confirm(&mut self, _message: &str) -> Result<bool> {
            Ok(true)
        }

        fn passphrase(&mut self, _attempt: u32, _total: u32) -> Result<String> {
            self.calls += 1;
            if self.cancel_at == Some(self.calls) {
                return Err(BootstrapError::Cancelled);
            }
            Ok("hunter2".into())
        }
    }

    fn paths() -> (PathBuf, PathBuf) {
        (PathBuf::from("/in/masterKey.gpg"), PathBuf::from("/out/key.txt"))
    }

    #[test]
    fn test_master_key_succeeds_first_try() {
        let backend = FlakyBackend::failing(0);
        let mut prompt = CountingPrompt::new();
        let (input, output) = paths();

        decrypt_master_key(&backend, &mut prompt, &input, &output).unwrap();
        assert_eq!(prompt.calls, 1);
        assert_eq!(backend.master_calls.get(), 1);
    }

    #[test]
    fn test_master_key_retries_then_succeeds() {
        // Fails twice: succeeds on the third and final attempt.
        let backend = FlakyBackend::failing(2);
        let mut prompt = CountingPrompt::new();
        let (input, output) = paths();

        decrypt_master_key(&backend, &mut prompt, &input, &output).unwrap();
        assert_eq!(prompt.calls, 3);
        assert_eq!(backend.master_calls.get(), 3);
    }

    #[test]
    fn test_master_key_fails_closed_after_three() {
        let backend = FlakyBackend::failing(u32::MAX);
        let mut prompt = CountingPrompt::new();
        let (input, output) = paths();

        let err = decrypt_master_key(&backend, &mut prompt, &input, &output).unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::MasterKeyDecrypt { attempts: 3, .. }
        ));
        assert!(!err.is_cancelled());
        assert_eq!(err.exit_code(), 1);
        // The passphrase callback ran once per attempt, no caching.
        assert_eq!(prompt.calls, 3);
        assert_eq!(backend.master_calls.get(), 3);
    }

    #[test]
    fn test_master_key_cancel_propagates() {
        let backend = FlakyBackend::failing(u32::MAX);
        let mut prompt = CountingPrompt::new();
        prompt.cancel_at = Some(2);
        let (input, output) = paths();

        let err = decrypt_master_key(&backend, &mut prompt, &input, &output).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), 0);
        // One failed decryption, then cancelled during re-entry.
        assert_eq!(backend.master_calls.get(), 1);
    }

    #[test]
    fn test_secret_fails_without_retry() {
        let backend = FlakyBackend::failing(u32::MAX);
        let err = decrypt_secret(
            &backend,
            Path::new("/in/GUID.age"),
            Path::new("/out/GUID"),
            Path::new("/out/host.masterKey.txt"),
        )
        .unwrap_err();

        assert!(matches!(err, BootstrapError::SecretDecrypt { .. }));
        assert_eq!(err.exit_code(), 128);
        assert_eq!(backend.secret_calls.get(), 1);
    }
}
