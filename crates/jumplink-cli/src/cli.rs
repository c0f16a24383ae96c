use std::path::PathBuf;

use clap::Parser;

/// Send or receive a file across an SSH jump host, driven by a YAML
/// config file.
#[derive(Debug, Parser)]
#[command(name = "jumplink", version, about)]
pub struct Cli {
    /// Path to the YAML config file.
    pub config: PathBuf,

    /// Enable debug-level logging.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
