//! Converter configuration.
//!
//! A [`Config`] is built once at start-up, either from the built-in defaults or
//! from a JSON override file, and handed by reference to every component.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::ResultExt;

use crate::error::{ConfigParseSnafu, ConfigReadSnafu, Error, Result};
use crate::fstab::FsType;

/// Block devices and paths (`/dev/sda1`) or dotted-quad hosts for NFS.
pub const DEVICE_PATTERN: &str = r"^(/[^:]+|((25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])):?$";

/// `LABEL=`, `UUID=`, `PARTUUID=` and `PARTLABEL=` identifiers.
pub const IDENTIFIER_PATTERN: &str = r"^(LABEL|UUID|PARTUUID|PARTLABEL)=[\w-]+:?$";

/// `key: value` lines inside a device block.
pub const KEY_VALUE_PATTERN: &str = r"^([\w-]+):\s*(.*)$";

/// Default fstab path.
pub const FSTAB_PATH: &str = "/etc/fstab";

/// Default mount description read when no source is given.
pub const DEFAULT_SOURCE: &str = "./fstab.yaml";

/// Backup directory relative to the user's home directory.
const DEFAULT_BACKUP_SUBDIR: &str = "backups/fstab";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Regex recognising path and host device headers.
    pub device_pattern: String,
    /// Regex recognising identifier device headers.
    pub identifier_pattern: String,
    /// Regex splitting attribute lines into key and value.
    pub key_value_pattern: String,
    /// Filesystem types accepted by the generator.
    pub supported_types: Vec<FsType>,
    /// Where backups go. `None` means `~/backups/fstab`.
    pub backup_dir: Option<PathBuf>,
    /// The live fstab. Writes to this path are validated and rolled back.
    pub system_fstab: PathBuf,
    /// Mount description used when the caller does not name one.
    pub default_source: PathBuf,
    /// Program and arguments that mount everything listed in the live fstab.
    pub mount_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_pattern: DEVICE_PATTERN.to_string(),
            identifier_pattern: IDENTIFIER_PATTERN.to_string(),
            key_value_pattern: KEY_VALUE_PATTERN.to_string(),
            supported_types: FsType::ALL.to_vec(),
            backup_dir: None,
            system_fstab: PathBuf::from(FSTAB_PATH),
            default_source: PathBuf::from(DEFAULT_SOURCE),
            mount_command: vec!["mount".to_string(), "-a".to_string()],
        }
    }
}

impl Config {
    /// Loads a configuration override from a JSON file.
    ///
    /// Fields missing from the file keep their default values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context(ConfigReadSnafu { path })?;
        Self::from_json(&content).context(ConfigParseSnafu { path })
    }

    fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Returns true when `fs_type` is on the whitelist.
    pub fn supports(&self, fs_type: FsType) -> bool {
        self.supported_types.contains(&fs_type)
    }

    /// Resolves the backup directory, expanding a leading `~`.
    ///
    /// # Errors
    /// Returns an error if the home directory is needed but cannot be determined.
    pub fn backup_dir(&self) -> Result<PathBuf> {
        match &self.backup_dir {
            Some(dir) => expand_home(dir),
            None => {
                let home = dirs::home_dir().ok_or(Error::HomeDirNotFound)?;
                Ok(home.join(DEFAULT_BACKUP_SUBDIR))
            }
        }
    }

    /// Whether `path` is the live fstab.
    pub fn is_system_fstab(&self, path: &Path) -> bool {
        path == self.system_fstab
    }
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().ok_or(Error::HomeDirNotFound)?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
