//! Run configuration: which host, which users, whether to partition.
//!
//! Loadable from a JSON answers file for unattended runs; otherwise
//! assembled from CLI flags and interactive prompts. Always validated
//! against the secret store before the pipeline starts.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};
use crate::store::SecretStore;

/// Validated inputs for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallConfig {
    /// Target host; must have a subtree in the secret store.
    pub host: String,
    /// Users whose master keys are staged, in input order.
    pub users: Vec<String>,
    /// Launch declarative disk partitioning before installation.
    #[serde(default)]
    pub partition: bool,
}

impl InstallConfig {
    /// Load an answers file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Check every referenced principal against the store.
    pub fn validate(&self, store: &SecretStore) -> Result<()> {
        if self.host.is_empty() {
            return Err(BootstrapError::store("no hostname given"));
        }
        if !store.has_host(&self.host) {
            return Err(BootstrapError::store(format!(
                "host folder {} not found",
                store.host_dir(&self.host).display()
            )));
        }
        if self.users.is_empty() {
            return Err(BootstrapError::store("no users given"));
        }
        for user in &self.users {
            if !store.has_user(user) {
                return Err(BootstrapError::store(format!(
                    "user folder {} not found",
                    store.user_dir(user).display()
                )));
            }
        }
        Ok(())
    }
}
