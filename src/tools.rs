//! Type-safe external tool invocation.
//!
//! The three privileged tools the pipeline drives — the declarative
//! partitioner, the secure-boot enrollment tool, and the OS installer — are
//! opaque subprocesses whose exit status is the only consumed signal. Their
//! argument vectors are contracts, so each tool gets a typed args struct and
//! all execution goes through one sanctioned runner.

use std::path::PathBuf;
use std::process::Command;

use crate::error::{BootstrapError, Result};

/// Trait for typed tool arguments.
///
/// Implementors define the mapping between Rust struct fields and the tool's
/// flags/environment. The compiler catches flag mismatches; the runner never
/// sees a raw string vector built ad hoc.
pub trait ToolArgs {
    /// Convert struct fields to CLI arguments, exactly as the tool expects.
    fn to_cli_args(&self) -> Vec<String>;

    /// Environment variables for this invocation, injected into the child
    /// process only.
    fn get_env_vars(&self) -> Vec<(String, String)>;

    /// The executable name; resolved through `PATH` at execution time.
    fn tool_name(&self) -> &'static str;

    /// True when the invocation irreversibly modifies the machine.
    fn is_destructive(&self) -> bool;
}

/// Exit status of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStatus {
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the tool exited with code 0.
    pub success: bool,
}

impl ToolStatus {
    /// Check that the tool succeeded and return an error if not.
    pub fn ensure_success(&self, tool: &'static str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(BootstrapError::Tool {
                tool,
                code: self.exit_code,
            })
        }
    }
}

/// Execution seam for tool invocations.
pub trait ToolRunner {
    fn run(&mut self, args: &dyn ToolArgs) -> Result<ToolStatus>;
}

/// Production runner: spawns the tool with inherited stdio and waits.
///
/// Stdio is inherited because all three tools are interactive or verbose and
/// own the terminal while they run; an interrupt reaches the child through
/// the shared process group.
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn run(&mut self, args: &dyn ToolArgs) -> Result<ToolStatus> {
        let tool = args.tool_name();
        let cli_args = args.to_cli_args();
        let env_vars = args.get_env_vars();

        tracing::info!("run_tool: {tool} args={cli_args:?} env={env_vars:?}");
        if args.is_destructive() {
            tracing::warn!("{tool} is about to perform a destructive operation");
        }

        let mut cmd = Command::new(tool);
        cmd.args(&cli_args);
        for (key, value) in &env_vars {
            cmd.env(key, value);
        }

        let status = cmd
            .status()
            .map_err(|err| BootstrapError::system(format!("failed to launch {tool}: {err}")))?;
        Ok(ToolStatus {
            exit_code: status.code(),
            success: status.success(),
        })
    }
}

// ============================================================================
// DiskoArgs
// ============================================================================

/// Arguments for the declarative partitioner.
///
/// Destroys and rewrites the partition table described by `disks_config`,
/// reading LUKS passphrases from the staging directory.
///
/// | Rust Field     | CLI Flag             |
/// |----------------|----------------------|
/// | (fixed)        | `-m destroy,format,mount --yes-wipe-all-disks` |
/// | `secrets_dir`  | `--arg secretsDir`   |
/// | `disks_config` | positional           |
#[derive(Debug, Clone)]
pub struct DiskoArgs {
    /// Staging directory holding decrypted LUKS passphrase files.
    pub secrets_dir: PathBuf,
    /// Declarative disk layout for the target host.
    pub disks_config: PathBuf,
}

impl ToolArgs for DiskoArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            "destroy,format,mount".to_string(),
            "--yes-wipe-all-disks".to_string(),
            "--arg".to_string(),
            "secretsDir".to_string(),
            self.secrets_dir.display().to_string(),
            self.disks_config.display().to_string(),
        ]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }

    fn tool_name(&self) -> &'static str {
        "disko"
    }

    /// Full partition-table overwrite.
    fn is_destructive(&self) -> bool {
        true
    }
}

// ============================================================================
// SbctlEnrollArgs
// ============================================================================

/// Arguments for secure-boot key enrollment.
#[derive(Debug, Clone)]
pub struct SbctlEnrollArgs {
    /// Also enroll Microsoft's vendor certificates alongside our own.
    pub microsoft: bool,
}

impl ToolArgs for SbctlEnrollArgs {
    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["enroll-keys".to_string()];
        if self.microsoft {
            args.push("--microsoft".to_string());
        }
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }

    fn tool_name(&self) -> &'static str {
        "sbctl"
    }

    /// Writes to EFI firmware variables.
    fn is_destructive(&self) -> bool {
        true
    }
}

// ============================================================================
// NixosInstallArgs
// ============================================================================

/// Arguments for the OS installer.
#[derive(Debug, Clone)]
pub struct NixosInstallArgs {
    /// Secret store path; combined with the host into a flake reference.
    pub store_path: PathBuf,
    /// Target host identifier.
    pub host: String,
}

impl ToolArgs for NixosInstallArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "--flake".to_string(),
            format!("{}#{}", self.store_path.display(), self.host),
        ]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }

    fn tool_name(&self) -> &'static str {
        "nixos-install"
    }

    /// Installs onto already-prepared mounts; the destructive part happened
    /// in the partitioner.
    fn is_destructive(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_disko_args() {
        let args = DiskoArgs {
            secrets_dir: PathBuf::from("/tmp/secrets.abc123"),
            disks_config: PathBuf::from(
                "/flake/secrets/configurations/hosts/server1/hardware/disks.nix",
            ),
        };

        assert_eq!(
            args.to_cli_args(),
            vec![
                "-m",
                "destroy,format,mount",
                "--yes-wipe-all-disks",
                "--arg",
                "secretsDir",
                "/tmp/secrets.abc123",
                "/flake/secrets/configurations/hosts/server1/hardware/disks.nix",
            ]
        );
        assert!(args.get_env_vars().is_empty());
        assert_eq!(args.tool_name(), "disko");
        assert!(args.is_destructive());
    }

    #[test]
    fn test_sbctl_enroll_args() {
        let args = SbctlEnrollArgs { microsoft: true };
        assert_eq!(args.to_cli_args(), vec!["enroll-keys", "--microsoft"]);
        assert_eq!(args.tool_name(), "sbctl");
        assert!(args.is_destructive());

        let args = SbctlEnrollArgs { microsoft: false };
        assert_eq!(args.to_cli_args(), vec!["enroll-keys"]);
    }

    #[test]
    fn test_nixos_install_args() {
        let args = NixosInstallArgs {
            store_path: Path::new("/flake/secrets").to_path_buf(),
            host: "server1".to_string(),
        };
        assert_eq!(
            args.to_cli_args(),
            vec!["--flake", "/flake/secrets#server1"]
        );
        assert_eq!(args.tool_name(), "nixos-install");
        assert!(!args.is_destructive());
    }

    #[test]
    fn test_tool_status_ensure_success() {
        let ok = ToolStatus {
            exit_code: Some(0),
            success: true,
        };
        assert!(ok.ensure_success("disko").is_ok());

        let failed = ToolStatus {
            exit_code: Some(2),
            success: false,
        };
        let err = failed.ensure_success("disko").unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::Tool {
                tool: "disko",
                code: Some(2)
            }
        ));
    }
}
