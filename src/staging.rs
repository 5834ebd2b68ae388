//! Staging directory lifecycle and naming contract.
//!
//! All plaintext produced during one run lands in a uniquely-named directory
//! under the system temp root. The directory deliberately outlives the
//! process: the installer consumes it from a later process context. It is
//! removed only when the user interrupts the run (see [`crate::sigint`]).
//!
//! The file names below are a contract consumed byte-for-byte by the
//! downstream tools; do not change them without changing the tools.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Permissions forced onto the staging directory. Downstream privileged
/// tools are trusted to read it; no other local user may.
const STAGING_MODE: u32 = 0o700;

/// A staging directory holding the decrypted artifacts of one run.
#[derive(Debug, Clone)]
pub struct Staging {
    path: PathBuf,
}

impl Staging {
    /// Create a fresh, uniquely-named staging directory under the system
    /// temp root, owner-only access.
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("secrets.").tempdir()?;
        // Persist past this process: later stages read the staged files.
        let path = dir.keep();
        fs::set_permissions(&path, fs::Permissions::from_mode(STAGING_MODE))?;
        Ok(Self { path })
    }

    /// Wrap an existing directory as a staging area.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decrypted host master key.
    pub fn host_master_key(&self) -> PathBuf {
        self.path.join("host.masterKey.txt")
    }

    /// Decrypted master key for one user.
    pub fn user_master_key(&self, user: &str) -> PathBuf {
        self.path.join(format!("users.{user}.masterKey.txt"))
    }

    /// Decrypted LUKS passphrase file; `name` is the store file name.
    pub fn luks_key(&self, name: &str) -> PathBuf {
        self.path.join(format!("host.luksKeys.{name}.txt"))
    }

    /// Root of the staged secure-boot tree.
    pub fn secure_boot_dir(&self) -> PathBuf {
        self.path.join("secureBoot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_owner_only_and_unique() {
        let a = Staging::create().unwrap();
        let b = Staging::create().unwrap();

        assert!(a.path().is_dir());
        assert_ne!(a.path(), b.path());
        assert!(
            a.path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("secrets.")
        );

        let mode = fs::metadata(a.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, STAGING_MODE);

        fs::remove_dir_all(a.path()).unwrap();
        fs::remove_dir_all(b.path()).unwrap();
    }

    #[test]
    fn test_naming_contract() {
        let staging = Staging::at("/stage");
        assert_eq!(
            staging.host_master_key(),
            Path::new("/stage/host.masterKey.txt")
        );
        assert_eq!(
            staging.user_master_key("alice"),
            Path::new("/stage/users.alice.masterKey.txt")
        );
        assert_eq!(
            staging.luks_key("root.age"),
            Path::new("/stage/host.luksKeys.root.age.txt")
        );
        assert_eq!(staging.secure_boot_dir(), Path::new("/stage/secureBoot"));
    }
}
