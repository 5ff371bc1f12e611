// ABOUTME: Entry point for gog-lite — an agent-facing Google Workspace CLI with governance checks.
// ABOUTME: Parses CLI args, sets up stderr logging, runs the command, and prints JSON.

use clap::Parser;
use clap::error::ErrorKind;
use tracing_subscriber::EnvFilter;

use gog_lite::cli::{self, Cli};
use gog_lite::config;
use gog_lite::output::{self, CliError, ExitCode};

fn main() -> std::process::ExitCode {
    // Before parsing, so .env can supply GOG_LITE_CONFIG_DIR.
    config::load_dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::Ok.into();
        }
        Err(e) => {
            let err = CliError::new(ExitCode::Error, "invalid_arguments", e.to_string().trim());
            let _ = output::write_error(std::io::stderr().lock(), &err);
            return err.exit.into();
        }
    };

    init_tracing(cli.global.verbose);

    match cli::run(cli) {
        Ok(value) => match output::write_json(std::io::stdout().lock(), &value) {
            Ok(()) => ExitCode::Ok.into(),
            Err(e) => {
                tracing::error!(error = %e, "failed to write output");
                ExitCode::Error.into()
            }
        },
        Err(err) => {
            let _ = output::write_error(std::io::stderr().lock(), &err);
            err.exit.into()
        }
    }
}

/// Logs go to stderr so stdout stays pure JSON. `RUST_LOG` overrides the
/// default level.
fn init_tracing(verbose: bool) {
    let default = if verbose { "gog_lite=debug" } else { "error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
