use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use bindle::{
    Bundler, Config, LogReporter,
    config::{ConfigLayer, PythonVersion},
};
use clap::Parser;
use log::{LevelFilter, error};

/// Bundle a multi-file Python project into a single self-contained .py file
#[derive(Parser, Debug)]
#[command(name = "bindle", version, about)]
struct Cli {
    /// Project root directory
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// Entry file, relative to the project root
    #[arg(short, long)]
    file: PathBuf,

    /// Where to write the bundle
    #[arg(short, long)]
    output: PathBuf,

    /// Configuration file, applied over the user and project configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    jobs: Option<u16>,

    /// Python 3 minor version used to classify standard-library imports
    #[arg(long, value_name = "MINOR")]
    python_version: Option<u8>,

    /// Keep unreferenced top-level functions
    #[arg(long)]
    no_dead_code: bool,

    /// Do not fold constant expressions
    #[arg(long)]
    no_fold: bool,

    /// Keep `if` statements whose condition is a literal
    #[arg(long)]
    no_prune: bool,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Command-line overrides, the highest-precedence configuration layer
    fn config_layer(&self) -> ConfigLayer {
        ConfigLayer {
            python_version: self.python_version.map(PythonVersion::Minor),
            jobs: self.jobs.map(usize::from),
            dead_code_elimination: self.no_dead_code.then_some(false),
            constant_folding: self.no_fold.then_some(false),
            constant_condition_pruning: self.no_prune.then_some(false),
            ..ConfigLayer::default()
        }
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.path, self.config.as_deref())?;
        config
            .merge(self.config_layer())
            .context("invalid command-line option")?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_env("RUST_LOG")
        .format_timestamp(None)
        .init();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };

    let bundler = Bundler::new(config);
    match bundler.bundle(&cli.path, &cli.file, &cli.output, &LogReporter) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", anyhow::Error::from(e));
            ExitCode::from(1)
        }
    }
}
