//! Command-line and interactive input layer.
//!
//! Produces one validated [`InstallConfig`] from, in order of precedence:
//! CLI flags, an optional JSON answers file, and interactive prompts that
//! loop until the entered host/users exist in the secret store.

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize as _;
use dialoguer::Input;

use crate::config::InstallConfig;
use crate::error::Result;
use crate::prompt::from_prompt_err;
use crate::store::SecretStore;

/// nixstrap - decrypt flake secrets and bootstrap a NixOS installation
#[derive(Parser, Debug)]
#[command(name = "nixstrap")]
#[command(about = "Decrypts flake secrets into a staging area and drives the NixOS installation")]
#[command(version)]
pub struct Cli {
    /// Path to the flake root (defaults to $SELF, then an upward search
    /// for flake.nix)
    #[arg(long)]
    pub flake: Option<PathBuf>,

    /// Target host; prompted for interactively when omitted
    #[arg(long)]
    pub host: Option<String>,

    /// Users whose master keys should be staged; prompted for when omitted
    #[arg(long, num_args = 1..)]
    pub users: Vec<String>,

    /// Launch declarative disk partitioning before installation
    #[arg(long)]
    pub partition: bool,

    /// JSON answers file providing host/users/partition; CLI flags win
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Assemble and validate the run configuration.
    ///
    /// Anything not supplied by flags or the answers file is prompted for
    /// interactively, re-asking until the input names existing store
    /// subtrees. Flag- and file-supplied values are validated the same way
    /// but fail instead of re-asking.
    pub fn resolve_config(&self, store: &SecretStore) -> Result<InstallConfig> {
        let file = self
            .config
            .as_deref()
            .map(InstallConfig::load_from_file)
            .transpose()?;
        let (host, users, partition) = merge(self, file);

        let config = InstallConfig {
            host: match host {
                Some(host) => host,
                None => prompt_host(store)?,
            },
            users: match users {
                Some(users) => users,
                None => prompt_users(store)?,
            },
            partition,
        };
        config.validate(store)?;
        Ok(config)
    }
}

/// Merge flag and answers-file inputs; flags take precedence, the partition
/// switch is sticky from either source.
fn merge(
    cli: &Cli,
    file: Option<InstallConfig>,
) -> (Option<String>, Option<Vec<String>>, bool) {
    let host = cli
        .host
        .clone()
        .or_else(|| file.as_ref().map(|config| config.host.clone()));
    let users = if cli.users.is_empty() {
        file.as_ref().map(|config| config.users.clone())
    } else {
        Some(cli.users.clone())
    };
    let partition = cli.partition || file.as_ref().is_some_and(|config| config.partition);
    (host, users, partition)
}

/// Ask for a hostname until it names an existing host subtree.
fn prompt_host(store: &SecretStore) -> Result<String> {
    loop {
        let input: String = read_line(&"Host".blue().bold().underline().to_string())?;
        if input.is_empty() {
            tracing::error!("No hostname entered");
            continue;
        }
        tracing::info!("Checking if host configuration exists...");
        if store.has_host(&input) {
            return Ok(input);
        }
        tracing::error!(
            "Folder {} not found!",
            store.host_dir(&input).display()
        );
        println!(
            "Hostname {} is {}! Try again.",
            input.red().underline(),
            "invalid".red().bold()
        );
    }
}

/// Ask for a space-separated user list until every entry exists.
fn prompt_users(store: &SecretStore) -> Result<Vec<String>> {
    loop {
        let input = read_line(&"Users".blue().bold().underline().to_string())?;
        let users: Vec<String> = input.split_whitespace().map(String::from).collect();
        if users.is_empty() {
            tracing::error!("No usernames entered");
            continue;
        }
        tracing::info!("Checking if all user configurations exist...");
        let invalid: Vec<&String> = users.iter().filter(|user| !store.has_user(user)).collect();
        if invalid.is_empty() {
            return Ok(users);
        }
        for user in &invalid {
            tracing::error!("Folder {} not found!", store.user_dir(user).display());
        }
        println!(
            "Users [{}] are {}! Try again.",
            invalid
                .iter()
                .map(|user| user.red().underline().to_string())
                .collect::<Vec<String>>()
                .join(", "),
            "invalid".red().bold()
        );
    }
}

fn read_line(prompt: &str) -> Result<String> {
    Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()
        .map_err(from_prompt_err)
}
