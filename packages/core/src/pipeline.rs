//! Parse, generate and commit, in that order.
//!
//! Each stage either hands its result to the next one or stops the run. The
//! only recovery path is a single rollback after a failed post-write
//! validation of the live fstab.

use std::io::Write;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::backup::{self, BackupOutcome};
use crate::config::Config;
use crate::error::Result;
use crate::fstab::{self, WriteOutcome};
use crate::mount::MountValidator;
use crate::table::Parser;

/// Exit code for a run whose changes were rolled back.
pub const EXIT_ROLLED_BACK: i32 = 2;

/// Caller-supplied arguments for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Mount description to read.
    pub source: PathBuf,
    /// Fstab to write.
    pub destination: PathBuf,
    /// Print the generated lines instead of writing them.
    pub dry_run: bool,
    /// Announce `root-reserve` sizes for devices that declare one.
    pub root_reserve: bool,
}

impl Request {
    /// A request using the configured default source and live fstab.
    pub fn with_defaults(config: &Config) -> Self {
        Self {
            source: config.default_source.clone(),
            destination: config.system_fstab.clone(),
            dry_run: false,
            root_reserve: false,
        }
    }
}

/// What happened after the live fstab was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Destination was not the live fstab.
    Skipped,
    Passed,
    /// `reason` is the validation failure; `backup` was restored over the live file.
    RolledBack { backup: PathBuf, reason: String },
}

/// Final state of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Previewed { lines: usize },
    Written { path: PathBuf, validation: Validation },
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Written {
                validation: Validation::RolledBack { .. },
                ..
            } => EXIT_ROLLED_BACK,
            _ => 0,
        }
    }
}

/// Sequences parser, generator, backup, writer and validator.
pub struct Pipeline<'a, V> {
    config: &'a Config,
    parser: Parser,
    validator: V,
}

impl<'a, V: MountValidator> Pipeline<'a, V> {
    pub fn new(config: &'a Config, validator: V) -> Result<Self> {
        Ok(Self {
            config,
            parser: Parser::new(config)?,
            validator,
        })
    }

    /// Runs every stage for `request`, sending preview output to `out`.
    pub fn run(&self, request: &Request, out: &mut dyn Write) -> Result<Outcome> {
        let table = self.parser.parse_file(&request.source)?;
        debug!("parsed: {} device(s)", table.len());

        let lines = fstab::generate(&table, self.config, request.dry_run, request.root_reserve)?.lines;
        debug!("generated: {} line(s)", lines.len());

        let backup = backup::backup_fstab(self.config, request.dry_run)?;
        debug!("backed up: {backup:?}");

        let path = match fstab::write_fstab(&lines, &request.destination, request.dry_run, out)? {
            WriteOutcome::Previewed => return Ok(Outcome::Previewed { lines: lines.len() }),
            WriteOutcome::Written(path) => path,
        };
        info!("fstab written successfully to {}", path.display());

        let validation = match backup {
            BackupOutcome::Created(record) if self.config.is_system_fstab(&path) => {
                match self.validator.mount_all() {
                    Ok(()) => {
                        info!("fstab update validated successfully");
                        Validation::Passed
                    }
                    Err(e) => {
                        warn!("validation of changes failed: {e}; rolling back");
                        backup::restore_backup(&record, &path)?;
                        Validation::RolledBack {
                            backup: record.path,
                            reason: e.to_string(),
                        }
                    }
                }
            }
            _ => Validation::Skipped,
        };

        Ok(Outcome::Written { path, validation })
    }
}
