//! fstab-writer - converts a YAML-like mount description into an fstab.
//!
//! Reads the description, prints or writes the generated fstab and, when the
//! live `/etc/fstab` is replaced, validates it with `mount -a` and restores the
//! previous version on failure.

mod logging;

use std::error::Error as _;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use fstab_writer_core::mount::SystemMounter;
use fstab_writer_core::{Config, Error, Outcome, Pipeline, Request, Validation};
use log::{error, info, warn};

/// Process YAML to generate an fstab file.
#[derive(Parser)]
#[command(name = "fstab-writer")]
#[command(about = "Process YAML to generate /etc/fstab file", long_about = None)]
struct Cli {
    /// Path to the YAML mount description [default: ./fstab.yaml]
    #[arg(long, alias = "yaml_file")]
    yaml_file: Option<PathBuf>,

    /// Path to the fstab file to write [default: /etc/fstab]
    #[arg(long, alias = "fstab_file")]
    fstab_file: Option<PathBuf>,

    /// Print generated fstab entries without changing any file.
    #[arg(long, alias = "dry_run")]
    dry_run: bool,

    /// Apply root reserve settings for partitions that declare one.
    #[arg(long, alias = "root_reserve")]
    root_reserve: bool,

    /// JSON file overriding patterns, type whitelist and default paths.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::setup_logging(logging::level_from_verbosity(cli.verbose)) {
        eprintln!("failed to initialize logging: {}", e);
    }

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            report(&e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Error> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let defaults = Request::with_defaults(&config);
    let request = Request {
        source: cli.yaml_file.unwrap_or(defaults.source),
        destination: cli.fstab_file.unwrap_or(defaults.destination),
        dry_run: cli.dry_run,
        root_reserve: cli.root_reserve,
    };

    if !request.dry_run
        && config.is_system_fstab(&request.destination)
        && !nix::unistd::geteuid().is_root()
    {
        warn!("not running as root; writing {} will likely fail", request.destination.display());
    }

    let pipeline = Pipeline::new(&config, SystemMounter::new(&config))?;
    let outcome = pipeline.run(&request, &mut std::io::stdout())?;

    if let Outcome::Written {
        validation: Validation::RolledBack { backup, reason },
        ..
    } = &outcome
    {
        error!("validation of changes failed: {}", reason);
        info!("changes rolled back from {}", backup.display());
    }

    Ok(outcome.exit_code())
}

fn report(e: &Error) {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    error!("{} failed: {}", e.stage(), message);

    if e.is_permission_denied() {
        error!("insufficient permissions; run as root to modify system files");
    }
}
