//! Command-line interface of the `tdrdm` binary.

use std::path::PathBuf;

use anyhow::{self, Context};
use clap::{Parser, Subcommand};

use crate::interfaces::input::Input;
use crate::interfaces::InputHandle;
use crate::io::format::{tdrdm_error, tdrdm_output};
use crate::io::write_tdrdm_yaml;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// Logs a nicely formatted tdrdm heading to the `tdrdm-output` logger.
pub fn log_heading() {
    let version = if let Some(ver) = VERSION {
        format!("v{ver}")
    } else {
        "v unknown".to_string()
    };
    tdrdm_output!("╭─────────────────────────────────────────────────────────────────────────────────────────────────────╮");
    tdrdm_output!("│    ██████  ████▄   ████▄   ████▄   ▄▄   ▄▄                                                          │");
    tdrdm_output!("│      ██    ██  ██  ██  ██  ██  ██  ███▄███                                                          │");
    tdrdm_output!("│      ██    ██  ██  ████▀   ██  ██  ██▀█▀██                                                          │");
    tdrdm_output!("│      ██    ████▀   ██  ██  ████▀   ██   ██     Time series of one-particle reduced density matrices │");
    tdrdm_output!("│                                                                                         {version:>13} │");
    tdrdm_output!("╰─────────────────────────────────────────────────────────────────────────────────────────────────────╯");
    tdrdm_output!("");
}

/// Logs an error and its chain of causes to the `tdrdm-output` logger.
pub fn log_error(err: &anyhow::Error) {
    tdrdm_error!("{err}");
    for cause in err.chain().skip(1) {
        tdrdm_error!("  Caused by: {cause}");
    }
}

/// The command-line arguments of the `tdrdm` binary.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// The subcommands of the `tdrdm` binary.
#[derive(Subcommand)]
pub enum Command {
    /// Runs the tasks specified in a YAML configuration file.
    Run {
        /// The YAML configuration file.
        #[arg(short, long)]
        config: PathBuf,

        /// The name of the main output file, without the `.out` extension.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Writes the grid points of every task that needs tabulated AO values to `.npy` files.
    Grid {
        /// The YAML configuration file.
        #[arg(short, long)]
        config: PathBuf,

        /// The prefix of the point files, which are named `<prefix>-task<i>.npy`.
        #[arg(short, long)]
        prefix: PathBuf,
    },

    /// Writes a YAML configuration template containing every task with default parameters.
    Template {
        /// The name of the template file, without the `.yml` extension.
        #[arg(short, long)]
        name: PathBuf,
    },
}

impl Command {
    /// Executes the subcommand.
    pub fn execute(&self) -> Result<(), anyhow::Error> {
        match self {
            Command::Run { config, .. } => {
                log_heading();
                let input = Input::from_file(config)?;
                input.handle()
            }
            Command::Grid { config, prefix } => {
                let input = Input::from_file(config)?;
                input.export_grid_points(prefix).map(|_| ())
            }
            Command::Template { name } => write_tdrdm_yaml(name, &Input::template())
                .with_context(|| {
                    format!("Unable to write configuration template `{}`", name.display())
                }),
        }
    }
}
