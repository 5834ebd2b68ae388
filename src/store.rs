//! Secret store layout and resolution.
//!
//! The store is a read-only directory tree rooted at `<flake>/secrets`:
//!
//! ```text
//! secrets/
//!   hosts/<host>/masterKey.gpg
//!   hosts/<host>/luksKeys/<name>            (optional)
//!   hosts/<host>/secureBootKeys/...         (optional)
//!   users/<user>/masterKey.gpg
//! ```
//!
//! Every path handed out by this module is a *contract*: the pipeline checks
//! existence where the layout is optional and fails loudly where it is not.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BootstrapError, Result};

/// Encrypted master key file name inside a host/user subtree.
pub const MASTER_KEY_FILE: &str = "masterKey.gpg";

/// The read-only tree of encrypted inputs, rooted at `<flake>/secrets`.
#[derive(Debug, Clone)]
pub struct SecretStore {
    flake: PathBuf,
    root: PathBuf,
}

impl SecretStore {
    /// Open the store under an already-known flake root.
    pub fn at(flake: impl Into<PathBuf>) -> Self {
        let flake = flake.into();
        let root = flake.join("secrets");
        Self { flake, root }
    }

    /// Resolve the flake root and open its secret store.
    ///
    /// Resolution order: explicit argument, then the `SELF` environment
    /// variable, then an upward search from the current directory for a
    /// `flake.nix`.
    pub fn resolve(flake: Option<PathBuf>) -> Result<Self> {
        let flake = match flake {
            Some(path) => path,
            None => match env::var_os("SELF") {
                Some(path) => PathBuf::from(path),
                None => {
                    tracing::warn!("SELF is not set, searching upward from $PWD for flake.nix...");
                    find_flake_root(&env::current_dir()?)?
                }
            },
        };
        Ok(Self::at(flake))
    }

    /// The flake root the store was resolved from.
    pub fn flake_root(&self) -> &Path {
        &self.flake
    }

    /// The `secrets` directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn host_dir(&self, host: &str) -> PathBuf {
        self.root.join("hosts").join(host)
    }

    pub fn user_dir(&self, user: &str) -> PathBuf {
        self.root.join("users").join(user)
    }

    /// True iff a configuration subtree exists for this host.
    pub fn has_host(&self, host: &str) -> bool {
        self.host_dir(host).exists()
    }

    /// True iff a configuration subtree exists for this user.
    pub fn has_user(&self, user: &str) -> bool {
        self.user_dir(user).exists()
    }

    pub fn host_master_key(&self, host: &str) -> PathBuf {
        self.host_dir(host).join(MASTER_KEY_FILE)
    }

    pub fn user_master_key(&self, user: &str) -> PathBuf {
        self.user_dir(user).join(MASTER_KEY_FILE)
    }

    /// Optional subtree of LUKS passphrase files for a host.
    pub fn luks_keys_dir(&self, host: &str) -> PathBuf {
        self.host_dir(host).join("luksKeys")
    }

    /// Optional subtree of secure-boot key material for a host.
    pub fn secure_boot_dir(&self, host: &str) -> PathBuf {
        self.host_dir(host).join("secureBootKeys")
    }

    /// Declarative disk layout consumed by the partitioner.
    pub fn hardware_disks_config(&self, host: &str) -> PathBuf {
        self.root
            .join("configurations")
            .join("hosts")
            .join(host)
            .join("hardware")
            .join("disks.nix")
    }

    /// Encrypted LUKS key files for a host, sorted by file name.
    ///
    /// Sorted so staging output is deterministic regardless of readdir order.
    /// Returns an empty list when the subtree is absent.
    pub fn luks_keys(&self, host: &str) -> Result<Vec<(String, PathBuf)>> {
        let dir = self.luks_keys_dir(host);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                keys.push((name, entry.path()));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Walk upward from `start` until a directory containing `flake.nix` is found.
fn find_flake_root(start: &Path) -> Result<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join("flake.nix").exists() {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(BootstrapError::store(format!(
                "no flake.nix found in {} or any parent directory",
                start.display()
            )));
        }
    }
}
