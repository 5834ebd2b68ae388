//! Secure-boot key staging and installation.
//!
//! When a host carries a `secureBootKeys/` subtree, its GUID and the three
//! key pairs are decrypted into a fixed sub-layout under staging:
//!
//! ```text
//! secureBoot/
//!   GUID
//!   keys/KEK/KEK.{pem,key}
//!   keys/db/db.{pem,key}
//!   keys/PK/PK.{pem,key}
//! ```
//!
//! That tree is then installed into the mounted target and the live root,
//! replacing whatever is there. Installation copies; staging keeps its own
//! copy for the tools that read it later.

use std::fs;
use std::path::{Path, PathBuf};

use crate::decrypt::{CipherBackend, decrypt_secret};
use crate::error::{BootstrapError, Result};
use crate::staging::Staging;

/// The three enrollable key types, in staging order.
pub const KEY_TYPES: [&str; 3] = ["KEK", "db", "PK"];

/// Both halves of each key pair.
pub const KEY_EXTS: [&str; 2] = ["pem", "key"];

/// Enrollment tool state directory on the mounted target.
pub const TARGET_KEYS_DIR: &str = "/mnt/var/lib/sbctl";

/// Key directory read by the enrollment tool on the live system.
pub const LIVE_KEYS_DIR: &str = "/tmp/pki";

/// Decrypt the full secure-boot subtree into staging.
///
/// Exactly 1 + 3x2 = 7 decryptions, each keyed by the staged host master
/// key and each fatal on failure. Returns the staged `secureBoot` root.
pub fn stage_keys(
    backend: &dyn CipherBackend,
    sb_in: &Path,
    staging: &Staging,
) -> Result<PathBuf> {
    let sb_out = staging.secure_boot_dir();
    let keys_dir = sb_out.join("keys");
    fs::create_dir(&sb_out)?;
    fs::create_dir(&keys_dir)?;

    let key_file = staging.host_master_key();
    decrypt_secret(backend, &sb_in.join("GUID.age"), &sb_out.join("GUID"), &key_file)?;

    for kind in KEY_TYPES {
        let type_dir = keys_dir.join(kind);
        fs::create_dir(&type_dir)?;
        for ext in KEY_EXTS {
            decrypt_secret(
                backend,
                &sb_in.join(kind).join(format!("{ext}.age")),
                &type_dir.join(format!("{kind}.{ext}")),
                &key_file,
            )?;
        }
    }
    Ok(sb_out)
}

/// Install the staged tree into each destination.
///
/// Each install removes the destination's existing contents, then copies the
/// staged tree in. Any filesystem error is fatal.
pub fn install_keys(staged: &Path, destinations: &[PathBuf]) -> Result<()> {
    for dest in destinations {
        if dest.exists() {
            fs::remove_dir_all(dest).map_err(|err| {
                BootstrapError::filesystem(format!(
                    "failed to clear {}: {err}",
                    dest.display()
                ))
            })?;
        }
        copy_tree(staged, dest).map_err(|err| {
            BootstrapError::filesystem(format!(
                "failed to copy {} to {}: {err}",
                staged.display(),
                dest.display()
            ))
        })?;
        tracing::info!("Installed secure-boot keys into {}", dest.display());
    }
    Ok(())
}

/// Recursively copy a directory. Follows no special cases; the staged tree
/// contains only directories and regular files.
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
