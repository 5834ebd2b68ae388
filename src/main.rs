//! nixstrap - main entry point
//!
//! Resolves the secret store, creates the staging directory, gathers and
//! validates run inputs, then hands off to the pipeline. Exit codes:
//! 0 for success or user cancellation, 128 for derived-secret decryption
//! failure, 1 for everything else.

use tracing_subscriber::EnvFilter;

use nixstrap::cli::Cli;
use nixstrap::error::{BootstrapError, Result};
use nixstrap::pipeline::Pipeline;
use nixstrap::prompt::TerminalPrompt;
use nixstrap::staging::Staging;
use nixstrap::store::SecretStore;
use nixstrap::tools::SystemToolRunner;
use nixstrap::{SopsGpgBackend, sigint};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse_args();

    let code = match try_run(&cli) {
        Ok(()) => 0,
        Err(BootstrapError::Cancelled) => {
            tracing::info!("Interrupted by user, exiting...");
            sigint::remove_staging();
            0
        }
        Err(err) => {
            tracing::error!("{err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn try_run(cli: &Cli) -> Result<()> {
    sigint::init()?;

    let store = SecretStore::resolve(cli.flake.clone())?;
    tracing::info!("Flake: {}", store.flake_root().display());

    let staging = Staging::create()?;
    sigint::register_staging(staging.path());
    tracing::info!("OUT: {}", staging.path().display());

    let config = cli.resolve_config(&store)?;

    let backend = SopsGpgBackend;
    let mut prompt = TerminalPrompt;
    let mut tools = SystemToolRunner;
    Pipeline::new(&store, &staging, &backend, &mut prompt, &mut tools).run(&config)
}
