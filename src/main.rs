use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{self, format_err};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use tdrdm::interfaces::cli::{log_error, Cli, Command};

const OUTPUT_TARGET: &str = "tdrdm-output";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Sets up the loggers. The main output stream is echoed to the console and, if an output name
/// is given, also written to `<output>.out`, with everything else logged to `<output>.log`.
fn configure_logging(output: Option<&Path>) -> Result<log4rs::Handle, anyhow::Error> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build();
    let mut config =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut output_logger = Logger::builder().appender("console").additive(false);
    let root = if let Some(output) = output {
        let out_file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{m}{n}")))
            .append(false)
            .build(with_suffix(output, ".out"))?;
        let log_file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {l:<5} {t} - {m}{n}",
            )))
            .append(false)
            .build(with_suffix(output, ".log"))?;
        config = config
            .appender(Appender::builder().build("out-file", Box::new(out_file)))
            .appender(Appender::builder().build("log-file", Box::new(log_file)));
        output_logger = output_logger.appender("out-file");
        Root::builder().appender("log-file").build(LevelFilter::Debug)
    } else {
        Root::builder().appender("console").build(LevelFilter::Warn)
    };
    let config = config
        .logger(output_logger.build(OUTPUT_TARGET, LevelFilter::Info))
        .build(root)?;
    log4rs::init_config(config).map_err(|err| format_err!(err))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = match &cli.command {
        Command::Run { output, .. } => Some(output.as_path()),
        Command::Grid { .. } | Command::Template { .. } => None,
    };
    if let Err(err) = configure_logging(output) {
        eprintln!("Unable to set up logging: {err}");
        return ExitCode::FAILURE;
    }
    match cli.command.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log_error(&err);
            ExitCode::FAILURE
        }
    }
}
