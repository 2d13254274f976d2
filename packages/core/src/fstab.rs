//! Fstab rendering and writing module.
//!
//! This module turns a parsed [`MountTable`] into canonical six-field fstab
//! lines and persists them, either to disk or (in preview mode) to an output
//! stream.

use std::fmt;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info, warn};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};
use crate::table::{DeviceAttrs, DeviceKey, MountTable};

/// Mode given to a freshly created fstab.
const DEFAULT_FSTAB_MODE: u32 = 0o644;

macro_rules! fs_types {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Filesystem types the generator knows about.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
        pub enum FsType {
            $(#[serde(rename = $name)] $variant,)+
        }

        impl FsType {
            /// Every known type, in whitelist order.
            pub const ALL: &'static [FsType] = &[$(FsType::$variant,)+];

            /// Kernel name as written in fstab.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(FsType::$variant => $name,)+
                }
            }
        }

        impl FromStr for FsType {
            type Err = ();

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($name => Ok(FsType::$variant),)+
                    _ => Err(()),
                }
            }
        }
    };
}

fs_types! {
    Sysfs => "sysfs",
    Tmpfs => "tmpfs",
    Bdev => "bdev",
    Proc => "proc",
    Cgroup => "cgroup",
    Cgroup2 => "cgroup2",
    Cpuset => "cpuset",
    Devtmpfs => "devtmpfs",
    Configfs => "configfs",
    Debugfs => "debugfs",
    Tracefs => "tracefs",
    Securityfs => "securityfs",
    Sockfs => "sockfs",
    Bpf => "bpf",
    Pipefs => "pipefs",
    Ramfs => "ramfs",
    Hugetlbfs => "hugetlbfs",
    Devpts => "devpts",
    Ext3 => "ext3",
    Ext2 => "ext2",
    Ext4 => "ext4",
    Squashfs => "squashfs",
    Vfat => "vfat",
    Ecryptfs => "ecryptfs",
    Fuseblk => "fuseblk",
    Fuse => "fuse",
    Fusectl => "fusectl",
    Efivarfs => "efivarfs",
    Mqueue => "mqueue",
    Pstore => "pstore",
    Autofs => "autofs",
    BinfmtMisc => "binfmt_misc",
    Vboxsf => "vboxsf",
    Overlay => "overlay",
    None => "none",
    Xfs => "xfs",
    Nfs => "nfs",
    Swap => "swap",
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a single fstab entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// The device field, `host:/export` for NFS.
    pub fs_spec: String,
    /// Mount point, or `none` for swap.
    pub mount_point: String,
    pub fs_type: FsType,
    /// Mount options, joined with commas on output.
    pub mount_options: Vec<String>,
    /// This field is used by dump(8) to determine which filesystems need to be dumped.
    pub dump: String,
    /// This field is used by fsck(8) to determine the order in which filesystem checks are done at boot time.
    pub pass: String,
}

impl FstabEntry {
    /// Validates one device block and builds its entry.
    pub fn from_attrs(device: &DeviceKey, attrs: &DeviceAttrs, config: &Config) -> Result<Self> {
        let mount_point = non_empty(&attrs.mount).ok_or_else(|| Error::MissingMountPoint {
            device: device.to_string(),
        })?;

        let raw_type = non_empty(&attrs.fs_type).unwrap_or_default();
        let fs_type = FsType::from_str(raw_type)
            .ok()
            .filter(|t| config.supports(*t))
            .ok_or_else(|| Error::UnsupportedType {
                device: device.to_string(),
                fs_type: raw_type.to_string(),
            })?;

        let fs_spec = if fs_type == FsType::Nfs {
            let export = non_empty(&attrs.export).ok_or_else(|| Error::MissingExport {
                device: device.to_string(),
            })?;
            format!("{device}:{export}")
        } else {
            device.to_string()
        };

        let mount_options = match &attrs.options {
            Some(options) if !options.is_empty() => options.clone(),
            _ => vec!["defaults".to_string()],
        };

        Ok(Self {
            fs_spec,
            mount_point: mount_point.to_string(),
            fs_type,
            mount_options,
            dump: digits_or_zero(device, "dump", attrs.dump.as_deref())?,
            pass: digits_or_zero(device, "pass", attrs.pass.as_deref())?,
        })
    }

    /// Formats the entry as an fstab line.
    ///
    /// Fields are not escaped; embedded whitespace ends up in the output as-is.
    pub fn to_fstab_line(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.fs_spec,
            self.mount_point,
            self.fs_type,
            self.mount_options.join(","),
            self.dump,
            self.pass
        )
    }

    fn has_embedded_whitespace(&self) -> bool {
        let fields = [self.fs_spec.as_str(), self.mount_point.as_str()];
        fields
            .into_iter()
            .chain(self.mount_options.iter().map(String::as_str))
            .any(|field| field.chars().any(char::is_whitespace))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Passes a digit string through unchanged, defaulting to `0`.
fn digits_or_zero(device: &DeviceKey, field: &'static str, value: Option<&str>) -> Result<String> {
    match value {
        None => Ok("0".to_string()),
        Some(v) if !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()) => Ok(v.to_string()),
        Some(v) => Err(Error::InvalidNumber {
            device: device.to_string(),
            field,
            value: v.to_string(),
        }),
    }
}

/// A `root-reserve` request announced during generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReserve {
    /// Device field of the rendered entry.
    pub device: String,
    /// Size as written in the description.
    pub size: String,
}

/// Output of [`generate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    /// Fstab lines in table order.
    pub lines: Vec<String>,
    /// Reserves announced for this run. Nothing is resized.
    pub root_reserves: Vec<RootReserve>,
}

/// Renders every device in table order.
///
/// Stops at the first invalid device; no lines are returned in that case.
/// `apply_root_reserve` only has an effect outside preview runs, and then only
/// announces the requested reserve.
pub fn generate(
    table: &MountTable,
    config: &Config,
    dry_run: bool,
    apply_root_reserve: bool,
) -> Result<Generated> {
    let mut lines = Vec::with_capacity(table.len());
    let mut root_reserves = Vec::new();

    for (device, attrs) in table.iter() {
        let entry = FstabEntry::from_attrs(device, attrs, config)?;
        if entry.has_embedded_whitespace() {
            warn!("{device}: field contains whitespace and will not be escaped");
        }
        lines.push(entry.to_fstab_line());

        if let Some(reserve) = non_empty(&attrs.root_reserve)
            && apply_root_reserve
            && !dry_run
        {
            info!("apply root reserve of {reserve} on {} partition", entry.fs_spec);
            root_reserves.push(RootReserve {
                device: entry.fs_spec.clone(),
                size: reserve.to_string(),
            });
        }
    }

    debug!("generated {} fstab line(s)", lines.len());
    Ok(Generated {
        lines,
        root_reserves,
    })
}

/// Result of handing generated lines to the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Lines went to the output stream only.
    Previewed,
    /// Lines replaced the file at this path.
    Written(PathBuf),
}

/// Writes generated lines to `path`, or prints them to `out` in preview mode.
pub fn write_fstab(
    lines: &[String],
    path: &Path,
    dry_run: bool,
    out: &mut dyn Write,
) -> Result<WriteOutcome> {
    if dry_run {
        for line in lines {
            writeln!(out, "{line}").fstab_write_context("<preview>")?;
        }
        return Ok(WriteOutcome::Previewed);
    }

    info!("writing fstab to {}", path.display());
    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    replace_file(path, content.as_bytes()).fstab_write_context(path)?;

    Ok(WriteOutcome::Written(path.to_path_buf()))
}

/// Replaces `path` with `content` through a temporary file in the same
/// directory, keeping the previous file's permissions.
fn replace_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mode = match fs::metadata(path) {
        Ok(meta) => meta.permissions().mode(),
        Err(_) => DEFAULT_FSTAB_MODE,
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    fs::set_permissions(temp.path(), fs::Permissions::from_mode(mode))?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Parser;
    use tempfile::tempdir;

    fn table(input: &str) -> MountTable {
        Parser::new(&Config::default())
            .unwrap()
            .parse_str(input)
            .unwrap()
    }

    #[test]
    fn test_fs_type_names() {
        assert_eq!(FsType::from_str("binfmt_misc"), Ok(FsType::BinfmtMisc));
        assert_eq!(FsType::from_str("cgroup2"), Ok(FsType::Cgroup2));
        assert_eq!(FsType::from_str("none"), Ok(FsType::None));
        assert!(FsType::from_str("EXT4").is_err());
        assert!(FsType::from_str("zfs").is_err());
        assert_eq!(FsType::ALL.len(), 38);
        assert_eq!(FsType::Vfat.to_string(), "vfat");
    }

    #[test]
    fn test_generate_lines() {
        let input = "/dev/sda1:\n  mount: /data\n  type: ext4\n  options:\n    - rw\n    - noatime\n  dump: 0\n  pass: 2\nLABEL=swap:\n  type: swap\n  mount: none\n";
        let lines = generate(&table(input), &Config::default(), true, false)
            .unwrap()
            .lines;
        assert_eq!(
            lines,
            vec![
                "/dev/sda1 /data ext4 rw,noatime 0 2",
                "LABEL=swap none swap defaults 0 0",
            ]
        );
    }

    #[test]
    fn test_nfs_device_field() {
        let input = "192.168.1.10:\n  type: nfs\n  export: /x\n  mount: /y\n";
        let lines = generate(&table(input), &Config::default(), true, false)
            .unwrap()
            .lines;
        assert_eq!(lines, vec!["192.168.1.10:/x /y nfs defaults 0 0"]);
    }

    #[test]
    fn test_nfs_without_export_fails() {
        let input = "192.168.1.10:\n  type: nfs\n  mount: /y\n";
        let err = generate(&table(input), &Config::default(), true, false).unwrap_err();
        assert!(matches!(err, Error::MissingExport { device } if device == "192.168.1.10"));

        let input = "192.168.1.10:\n  type: nfs\n  export:\n  mount: /y\n";
        let err = generate(&table(input), &Config::default(), true, false).unwrap_err();
        assert!(matches!(err, Error::MissingExport { .. }));
    }

    #[test]
    fn test_missing_mount_aborts_everything() {
        let input = "/dev/sda1:\n  mount: /data\n  type: ext4\n/dev/sdb1:\n  type: ext4\n";
        let err = generate(&table(input), &Config::default(), true, false).unwrap_err();
        assert!(matches!(err, Error::MissingMountPoint { device } if device == "/dev/sdb1"));

        let input = "/dev/sdb1:\n  mount:\n  type: ext4\n";
        let err = generate(&table(input), &Config::default(), true, false).unwrap_err();
        assert!(matches!(err, Error::MissingMountPoint { .. }));
    }

    #[test]
    fn test_type_validation() {
        let missing = "/dev/sda1:\n  mount: /data\n";
        let err = generate(&table(missing), &Config::default(), true, false).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { ref fs_type, .. } if fs_type.is_empty()));

        let unknown = "/dev/sda1:\n  mount: /data\n  type: zfs\n";
        let err = generate(&table(unknown), &Config::default(), true, false).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { ref fs_type, .. } if fs_type == "zfs"));

        let config = Config {
            supported_types: vec![FsType::Ext4],
            ..Config::default()
        };
        let narrowed = "/dev/sda1:\n  mount: /data\n  type: xfs\n";
        assert!(generate(&table(narrowed), &config, true, false).is_err());
    }

    #[test]
    fn test_invalid_pass_value() {
        let input = "/dev/sda1:\n  mount: /data\n  type: ext4\n  pass: two\n";
        let err = generate(&table(input), &Config::default(), true, false).unwrap_err();
        assert!(matches!(err, Error::InvalidNumber { field: "pass", .. }));
    }

    #[test]
    fn test_dump_and_pass_pass_through() {
        let input = "/dev/sda1:\n  mount: /data\n  type: ext4\n  dump: 300\n  pass: 02\n";
        let lines = generate(&table(input), &Config::default(), true, false)
            .unwrap()
            .lines;
        assert_eq!(lines, vec!["/dev/sda1 /data ext4 defaults 300 02"]);

        let input = "/dev/sda1:\n  mount: /data\n  type: ext4\n  dump:\n";
        let err = generate(&table(input), &Config::default(), true, false).unwrap_err();
        assert!(matches!(err, Error::InvalidNumber { field: "dump", .. }));

        let input = "/dev/sda1:\n  mount: /data\n  type: ext4\n  pass: -1\n";
        let err = generate(&table(input), &Config::default(), true, false).unwrap_err();
        assert!(matches!(err, Error::InvalidNumber { field: "pass", .. }));
    }

    #[test]
    fn test_root_reserve_announced_only_for_live_runs() {
        let input = "/dev/sda1:\n  mount: /data\n  type: ext4\n  root-reserve: 5%\n/dev/sdb1:\n  mount: /b\n  type: xfs\n  root-reserve:\n";
        let table = table(input);
        let config = Config::default();

        let generated = generate(&table, &config, false, true).unwrap();
        assert_eq!(
            generated.root_reserves,
            vec![RootReserve {
                device: "/dev/sda1".to_string(),
                size: "5%".to_string(),
            }]
        );
        assert_eq!(generated.lines.len(), 2);

        // Flag off.
        assert!(generate(&table, &config, false, false).unwrap().root_reserves.is_empty());
        // Preview run.
        assert!(generate(&table, &config, true, true).unwrap().root_reserves.is_empty());
    }

    #[test]
    fn test_empty_options_list() {
        let input = "/dev/sda1:\n  mount: /data\n  type: ext4\n  options:\n";
        let lines = generate(&table(input), &Config::default(), true, false)
            .unwrap()
            .lines;
        assert_eq!(lines, vec!["/dev/sda1 /data ext4 defaults 0 0"]);
    }

    #[test]
    fn test_write_preview_does_not_touch_disk() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("fstab");
        let lines = vec!["/dev/sda1 /data ext4 defaults 0 0".to_string()];
        let mut out = Vec::new();

        let outcome = write_fstab(&lines, &target, true, &mut out).unwrap();

        assert_eq!(outcome, WriteOutcome::Previewed);
        assert_eq!(String::from_utf8(out).unwrap(), "/dev/sda1 /data ext4 defaults 0 0\n");
        assert!(!target.exists());
    }

    #[test]
    fn test_write_replaces_file_and_keeps_mode() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("fstab");
        fs::write(&target, "old\n").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o640)).unwrap();

        let lines = vec!["a".to_string(), "b".to_string()];
        let outcome = write_fstab(&lines, &target, false, &mut std::io::sink()).unwrap();

        assert_eq!(outcome, WriteOutcome::Written(target.clone()));
        assert_eq!(fs::read_to_string(&target).unwrap(), "a\nb\n");
        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("missing").join("fstab");
        let err = write_fstab(&["x".to_string()], &target, false, &mut std::io::sink()).unwrap_err();
        assert!(matches!(err, Error::FstabWrite { .. }));
    }
}
