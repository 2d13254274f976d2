//! fstab-writer-core: converts a declarative mount description into `/etc/fstab`.
//!
//! The library parses a restricted YAML-like mount description, renders each
//! device into a canonical fstab line, backs up the live fstab, writes the new
//! one and, for the live file, validates it with `mount -a` and rolls back on
//! failure.
//!
//! # Modules
//!
//! - [`config`]: Patterns, type whitelist and default paths
//! - [`table`]: Mount description parsing
//! - [`fstab`]: Entry rendering, generation and writing
//! - [`backup`]: Timestamped backups and restore
//! - [`mount`]: Post-write validation with `mount -a`
//! - [`pipeline`]: Stage sequencing and rollback
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use fstab_writer_core::{Config, Pipeline, Request, mount::SystemMounter};
//!
//! let config = Config::default();
//! let pipeline = Pipeline::new(&config, SystemMounter::new(&config)).unwrap();
//!
//! let request = Request {
//!     source: PathBuf::from("./fstab.yaml"),
//!     dry_run: true,
//!     ..Request::with_defaults(&config)
//! };
//! let outcome = pipeline.run(&request, &mut std::io::stdout()).unwrap();
//! std::process::exit(outcome.exit_code());
//! ```

pub mod backup;
pub mod config;
pub mod error;
pub mod fstab;
pub mod mount;
pub mod pipeline;
pub mod table;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result, Stage};
pub use fstab::{FsType, FstabEntry, Generated, RootReserve};
pub use pipeline::{Outcome, Pipeline, Request, Validation};
pub use table::{DeviceAttrs, DeviceKey, MountTable};
