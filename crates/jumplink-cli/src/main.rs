use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use jumplink_cli::{app, logging, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match app::run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "jumplink exited with an error");
            ExitCode::FAILURE
        }
    }
}
