//! Timestamped fstab backups.
//!
//! Backups are verbatim copies of the live fstab named
//! `fstab_<YYYYMMDD_HHMMSS>.bak`. They are created once and only read back
//! when a rollback restores them.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use log::info;

use crate::config::Config;
use crate::error::{IoResultExt, Result};

/// Timestamp layout embedded in backup file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A backup created on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub created: NaiveDateTime,
}

impl BackupRecord {
    /// Builds the record for a backup taken at `created` inside `dir`.
    pub fn at(dir: &Path, created: NaiveDateTime) -> Self {
        let name = format!("fstab_{}.bak", created.format(TIMESTAMP_FORMAT));
        Self {
            path: dir.join(name),
            created,
        }
    }
}

/// Result of the backup stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Preview run; nothing was copied.
    Skipped,
    Created(BackupRecord),
}

/// Copies the live fstab into the backup directory unless this is a preview run.
///
/// The directory is created if needed. Any failure here must stop the
/// pipeline before the live file is touched.
pub fn backup_fstab(config: &Config, dry_run: bool) -> Result<BackupOutcome> {
    if dry_run {
        return Ok(BackupOutcome::Skipped);
    }

    let live = config.system_fstab.as_path();
    let dir = config.backup_dir()?;
    let dir = dir.as_path();

    if !dir.exists() {
        fs::create_dir_all(dir).backup_dir_context(dir)?;
    }

    let record = BackupRecord::at(dir, Local::now().naive_local());
    fs::copy(live, &record.path).backup_context(&record.path)?;
    info!("backup of {} created: {}", live.display(), record.path.display());

    Ok(BackupOutcome::Created(record))
}

/// Copies `record` back over `live`.
pub fn restore_backup(record: &BackupRecord, live: &Path) -> Result<()> {
    fs::copy(&record.path, live).rollback_context(&record.path, live)?;
    info!("fstab backup {} has been restored", record.path.display());
    Ok(())
}
