//! nixstrap library
//!
//! Decrypts a flake-managed secret store into an ephemeral staging
//! directory, then drives the privileged tools that consume it: the
//! declarative partitioner, secure-boot key enrollment, and the OS
//! installer.

pub mod cli;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod passphrase;
pub mod pipeline;
pub mod prompt;
pub mod secureboot;
pub mod sigint;
pub mod staging;
pub mod store;
pub mod tools;

// Re-export main types for convenience
pub use cli::Cli;
pub use config::InstallConfig;
pub use decrypt::{
    CipherBackend, CipherError, MASTER_KEY_ATTEMPTS, SopsGpgBackend, decrypt_master_key,
    decrypt_secret,
};
pub use error::{BootstrapError, Result};
pub use passphrase::read_passphrase;
pub use pipeline::Pipeline;
pub use prompt::{Prompt, TerminalPrompt};
pub use staging::Staging;
pub use store::SecretStore;
pub use tools::{
    DiskoArgs, NixosInstallArgs, SbctlEnrollArgs, SystemToolRunner, ToolArgs, ToolRunner,
    ToolStatus,
};
