//! The bootstrap pipeline.
//!
//! One orchestrator, strictly sequential, parameterized by its two optional
//! branches (partitioning, secure boot). The host master key always lands
//! first: nothing downstream runs until it is staged, because every derived
//! secret is keyed by it.

use std::path::PathBuf;

use colored::Colorize as _;

use crate::config::InstallConfig;
use crate::decrypt::{CipherBackend, decrypt_master_key, decrypt_secret};
use crate::error::Result;
use crate::prompt::Prompt;
use crate::secureboot;
use crate::staging::Staging;
use crate::store::SecretStore;
use crate::tools::{DiskoArgs, NixosInstallArgs, SbctlEnrollArgs, ToolRunner};

/// Sequences decryption, confirmation gating, and tool invocations for one
/// run. Collaborators are injected so tests can script every interaction.
pub struct Pipeline<'a> {
    store: &'a SecretStore,
    staging: &'a Staging,
    backend: &'a dyn CipherBackend,
    prompt: &'a mut dyn Prompt,
    tools: &'a mut dyn ToolRunner,
    secure_boot_destinations: Vec<PathBuf>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a SecretStore,
        staging: &'a Staging,
        backend: &'a dyn CipherBackend,
        prompt: &'a mut dyn Prompt,
        tools: &'a mut dyn ToolRunner,
    ) -> Self {
        Self {
            store,
            staging,
            backend,
            prompt,
            tools,
            secure_boot_destinations: vec![
                PathBuf::from(secureboot::TARGET_KEYS_DIR),
                PathBuf::from(secureboot::LIVE_KEYS_DIR),
            ],
        }
    }

    /// Override the secure-boot install destinations.
    pub fn with_secure_boot_destinations(mut self, destinations: Vec<PathBuf>) -> Self {
        self.secure_boot_destinations = destinations;
        self
    }

    /// Run the whole pipeline for a validated configuration.
    pub fn run(&mut self, config: &InstallConfig) -> Result<()> {
        self.stage_master_keys(&config.host, &config.users)?;
        if config.partition {
            self.partition_branch(&config.host)?;
        }
        self.secure_boot_branch(&config.host)?;
        self.install(&config.host)
    }

    /// Host master key first, then each user's, in input order. Any failure
    /// aborts the run; keys staged before it stay staged.
    fn stage_master_keys(&mut self, host: &str, users: &[String]) -> Result<()> {
        tracing::info!("Decrypting master keys...");
        decrypt_master_key(
            self.backend,
            &mut *self.prompt,
            &self.store.host_master_key(host),
            &self.staging.host_master_key(),
        )?;
        for user in users {
            decrypt_master_key(
                self.backend,
                &mut *self.prompt,
                &self.store.user_master_key(user),
                &self.staging.user_master_key(user),
            )?;
        }
        Ok(())
    }

    /// Two confirmations guard the partition-table overwrite. Declining
    /// either skips the branch; the run continues to installation.
    fn partition_branch(&mut self, host: &str) -> Result<()> {
        if !self.prompt.confirm("Launch disk partitioning?")? {
            return Ok(());
        }
        let warning = format!(
            "{}: This will completely overwrite the current partition table! Continue?",
            "WARNING".yellow().bold()
        );
        if !self.prompt.confirm(&warning)? {
            return Ok(());
        }

        tracing::info!("Launching disk partitioning...");
        let luks_keys = self.store.luks_keys(host)?;
        if !luks_keys.is_empty() {
            tracing::info!("Found disk secrets, decrypting...");
            for (name, path) in &luks_keys {
                decrypt_secret(
                    self.backend,
                    path,
                    &self.staging.luks_key(name),
                    &self.staging.host_master_key(),
                )?;
            }
        }

        let status = self.tools.run(&DiskoArgs {
            secrets_dir: self.staging.path().to_path_buf(),
            disks_config: self.store.hardware_disks_config(host),
        })?;
        status.ensure_success("disko")
    }

    /// Triggered purely by subtree existence, never user-gated.
    fn secure_boot_branch(&mut self, host: &str) -> Result<()> {
        let sb_in = self.store.secure_boot_dir(host);
        if !sb_in.exists() {
            return Ok(());
        }
        tracing::info!("Found secure-boot keys, decrypting...");
        let staged = secureboot::stage_keys(self.backend, &sb_in, self.staging)?;

        tracing::info!("Moving secure-boot keys...");
        secureboot::install_keys(&staged, &self.secure_boot_destinations)?;

        let status = self.tools.run(&SbctlEnrollArgs { microsoft: true })?;
        status.ensure_success("sbctl")
    }

    /// Terminal step. A failed installer is reported but does not fail the
    /// run; there is nothing left to recover.
    fn install(&mut self, host: &str) -> Result<()> {
        tracing::info!("Running installation...");
        let status = self.tools.run(&NixosInstallArgs {
            store_path: self.store.root().to_path_buf(),
            host: host.to_string(),
        })?;
        if !status.success {
            tracing::error!(
                "nixos-install failed with exit code {}",
                status.exit_code.unwrap_or(-1)
            );
        }
        Ok(())
    }
}
