//! Unified error types for the fstab-writer-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different pipeline
//! stages.

use snafu::{ResultExt, Snafu};
use std::io::ErrorKind;
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Parse,
    Generation,
    Backup,
    Write,
    Validation,
    Rollback,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Config => "configuration",
            Stage::Parse => "parse",
            Stage::Generation => "generation",
            Stage::Backup => "backup",
            Stage::Write => "write",
            Stage::Validation => "validation",
            Stage::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Configuration file cannot be read.
    #[snafu(display("failed to read configuration at {}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for [`crate::config::Config`].
    #[snafu(display("failed to parse configuration at {}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// One of the configured line patterns does not compile.
    #[snafu(display("invalid {name} pattern"))]
    InvalidPattern {
        name: &'static str,
        source: regex::Error,
    },

    /// A configured pattern compiles but captures too few groups.
    #[snafu(display("{name} pattern must capture {expected} groups"))]
    MissingCaptureGroups {
        name: &'static str,
        expected: usize,
    },

    /// Home directory not found while resolving the backup directory.
    #[snafu(display("could not determine home directory"))]
    HomeDirNotFound,

    /// Mount description cannot be opened or read.
    #[snafu(display("failed to read mount description at {}", path.display()))]
    InputRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An option item appeared before any `options:` line for the device.
    #[snafu(display("line {line}: options list not initialized for {device}"))]
    OptionsNotInitialized { device: String, line: usize },

    /// Device block has no mount point.
    #[snafu(display("cannot generate fstab line for {device}: missing mount point"))]
    MissingMountPoint { device: String },

    /// Device block has no type, or a type outside the whitelist.
    #[snafu(display(
        "cannot generate fstab line for {device}: missing or unsupported type '{fs_type}'"
    ))]
    UnsupportedType { device: String, fs_type: String },

    /// NFS device block has no export path.
    #[snafu(display("cannot generate fstab line for {device}: nfs mount is missing export"))]
    MissingExport { device: String },

    /// `dump` or `pass` is not a digit string.
    #[snafu(display("cannot generate fstab line for {device}: invalid {field} value '{value}'"))]
    InvalidNumber {
        device: String,
        field: &'static str,
        value: String,
    },

    /// Backup directory could not be created.
    #[snafu(display("failed to create backup directory at {}", path.display()))]
    BackupDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to create backup.
    #[snafu(display("failed to create backup at {}", path.display()))]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write fstab file.
    #[snafu(display("failed to write fstab at {}", path.display()))]
    FstabWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to execute a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// Command executed but returned non-zero exit code.
    #[snafu(display("command '{command}' exited with code {code}: {stderr}"))]
    CommandExit {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Restoring the backup over the live file failed.
    #[snafu(display("failed to restore {} from backup {}", path.display(), backup.display()))]
    Rollback {
        backup: PathBuf,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    /// Returns the pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Error::ConfigRead { .. }
            | Error::ConfigParse { .. }
            | Error::InvalidPattern { .. }
            | Error::MissingCaptureGroups { .. }
            | Error::HomeDirNotFound => Stage::Config,
            Error::InputRead { .. } | Error::OptionsNotInitialized { .. } => Stage::Parse,
            Error::MissingMountPoint { .. }
            | Error::UnsupportedType { .. }
            | Error::MissingExport { .. }
            | Error::InvalidNumber { .. } => Stage::Generation,
            Error::BackupDir { .. } | Error::Backup { .. } => Stage::Backup,
            Error::FstabWrite { .. } => Stage::Write,
            Error::CommandExecution { .. } | Error::CommandExit { .. } => Stage::Validation,
            Error::Rollback { .. } => Stage::Rollback,
        }
    }

    /// Whether the underlying I/O failure was a permission error.
    pub fn is_permission_denied(&self) -> bool {
        let source = match self {
            Error::ConfigRead { source, .. }
            | Error::InputRead { source, .. }
            | Error::BackupDir { source, .. }
            | Error::Backup { source, .. }
            | Error::FstabWrite { source, .. }
            | Error::CommandExecution { source, .. }
            | Error::Rollback { source, .. } => source,
            _ => return false,
        };
        source.kind() == ErrorKind::PermissionDenied
    }
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for mount description read errors.
    fn input_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for fstab write errors.
    fn fstab_write_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for backup errors.
    fn backup_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for backup directory creation errors.
    fn backup_dir_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for restore errors.
    fn rollback_context(self, backup: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn input_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(InputReadSnafu { path: path.into() })
    }

    fn fstab_write_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(FstabWriteSnafu { path: path.into() })
    }

    fn backup_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(BackupSnafu { path: path.into() })
    }

    fn backup_dir_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(BackupDirSnafu { path: path.into() })
    }

    fn rollback_context(self, backup: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Result<T> {
        self.context(RollbackSnafu {
            backup: backup.into(),
            path: path.into(),
        })
    }
}
