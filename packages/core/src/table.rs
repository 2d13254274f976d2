//! Mount description parsing.
//!
//! The input is a restricted two-level, YAML-like layout: a device header on a
//! line of its own, followed by `key: value` attribute lines and `- item`
//! option lines. Parsing is line-local and never looks ahead.
//!
//! ```text
//! /dev/sda1:
//!   mount: /data
//!   type: ext4
//!   options:
//!     - rw
//!     - noatime
//! ```

use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, trace};
use regex::Regex;
use snafu::ResultExt;

use crate::config::Config;
use crate::error::{Error, InvalidPatternSnafu, IoResultExt, Result};

/// Symbolic identifier prefixes accepted as device headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Label,
    Uuid,
    PartUuid,
    PartLabel,
}

/// What a [`DeviceKey`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Absolute path such as `/dev/sda1`.
    Path,
    /// Dotted-quad host, used for NFS servers.
    Host,
    /// `LABEL=`, `UUID=`, `PARTUUID=` or `PARTLABEL=`.
    Tag(TagKind),
}

/// Device header with its trailing colon removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> DeviceKind {
        if self.0.starts_with('/') {
            return DeviceKind::Path;
        }
        match self.0.split_once('=') {
            Some(("LABEL", _)) => DeviceKind::Tag(TagKind::Label),
            Some(("UUID", _)) => DeviceKind::Tag(TagKind::Uuid),
            Some(("PARTUUID", _)) => DeviceKind::Tag(TagKind::PartUuid),
            Some(("PARTLABEL", _)) => DeviceKind::Tag(TagKind::PartLabel),
            _ => DeviceKind::Host,
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attributes collected for one device block.
///
/// Values are kept as written; the generator validates them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceAttrs {
    pub mount: Option<String>,
    pub fs_type: Option<String>,
    pub export: Option<String>,
    /// `None` until an `options:` line is seen.
    pub options: Option<Vec<String>>,
    pub dump: Option<String>,
    pub pass: Option<String>,
    pub root_reserve: Option<String>,
    /// Unrecognised keys, stored in input order and never emitted.
    pub extra: Vec<(String, String)>,
}

impl DeviceAttrs {
    fn set(&mut self, key: &str, value: String) {
        match key {
            "mount" => self.mount = Some(value),
            "type" => self.fs_type = Some(value),
            "export" => self.export = Some(value),
            "dump" => self.dump = Some(value),
            "pass" => self.pass = Some(value),
            "root-reserve" => self.root_reserve = Some(value),
            _ => match self.extra.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value,
                None => self.extra.push((key.to_string(), value)),
            },
        }
    }
}

/// Insertion-ordered map from device to attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    entries: Vec<(DeviceKey, DeviceAttrs)>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh attribute set for `key`.
    ///
    /// A key that already exists keeps its position but loses its previous
    /// attributes. Returns the index of the entry.
    pub fn open(&mut self, key: DeviceKey) -> usize {
        if let Some(index) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries[index].1 = DeviceAttrs::default();
            index
        } else {
            self.entries.push((key, DeviceAttrs::default()));
            self.entries.len() - 1
        }
    }

    pub fn get(&self, key: &str) -> Option<&DeviceAttrs> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, attrs)| attrs)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceKey, &DeviceAttrs)> {
        self.entries.iter().map(|(k, attrs)| (k, attrs))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Line classifier built from the configured patterns.
#[derive(Debug, Clone)]
pub struct Parser {
    device: Regex,
    identifier: Regex,
    key_value: Regex,
}

impl Parser {
    /// Compiles the header and attribute patterns from `config`.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            device: Regex::new(&config.device_pattern)
                .context(InvalidPatternSnafu { name: "device" })?,
            identifier: Regex::new(&config.identifier_pattern)
                .context(InvalidPatternSnafu { name: "identifier" })?,
            key_value: key_value_regex(&config.key_value_pattern)?,
        })
    }

    /// Parses a mount description file.
    pub fn parse_file(&self, path: &Path) -> Result<MountTable> {
        let file = fs::File::open(path).input_read_context(path)?;
        let reader = BufReader::new(file);

        let mut state = ParseState::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line.input_read_context(path)?;
            self.feed(&mut state, index + 1, &line)?;
        }

        debug!(
            "parsed {} device(s) from {}",
            state.table.len(),
            path.display()
        );
        Ok(state.table)
    }

    /// Parses a mount description held in memory.
    pub fn parse_str(&self, content: &str) -> Result<MountTable> {
        let mut state = ParseState::default();
        for (index, line) in content.lines().enumerate() {
            self.feed(&mut state, index + 1, line)?;
        }
        Ok(state.table)
    }

    fn is_header(&self, line: &str) -> bool {
        self.device.is_match(line) || self.identifier.is_match(line)
    }

    fn feed(&self, state: &mut ParseState, number: usize, raw: &str) -> Result<()> {
        let line = raw.trim();

        if self.is_header(line) {
            let key = line.strip_suffix(':').unwrap_or(line).trim();
            let key = DeviceKey::new(key);
            trace!("line {number}: {:?} device header {key}", key.kind());
            state.current = Some(state.table.open(key));
            return Ok(());
        }

        let Some(index) = state.current else {
            return Ok(());
        };
        let (device, attrs) = &mut state.table.entries[index];

        if let Some(caps) = self.key_value.captures(line)
            && let Some(key) = caps.get(1).map(|m| m.as_str())
        {
            if key == "options" {
                attrs.options = Some(Vec::new());
            } else {
                let value = caps.get(2).map_or("", |m| m.as_str()).trim();
                attrs.set(key, value.to_string());
            }
        } else if let Some(item) = line.strip_prefix('-') {
            match attrs.options.as_mut() {
                Some(options) => options.push(item.trim().to_string()),
                None => {
                    return Err(Error::OptionsNotInitialized {
                        device: device.to_string(),
                        line: number,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Compiles the attribute pattern, which must capture a key and a value.
fn key_value_regex(pattern: &str) -> Result<Regex> {
    let regex = Regex::new(pattern).context(InvalidPatternSnafu { name: "key-value" })?;
    // Group 0 is the whole match.
    if regex.captures_len() < 3 {
        return Err(Error::MissingCaptureGroups {
            name: "key-value",
            expected: 2,
        });
    }
    Ok(regex)
}

#[derive(Debug, Default)]
struct ParseState {
    table: MountTable,
    current: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"# mounts managed by fstab-writer
/dev/sda1:
  mount: /data
  type: ext4
  options:
    - rw
    - noatime
  dump: 0
  pass: 2
LABEL=swap:
  type: swap
  mount: none
192.168.1.10:
  type: nfs
  export: /srv/share
  mount: /mnt/nfs
  comment: media share
"#;

    fn parser() -> Parser {
        Parser::new(&Config::default()).unwrap()
    }

    #[test]
    fn test_parse_sample() {
        let table = parser().parse_str(SAMPLE).unwrap();

        let keys: Vec<&str> = table.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["/dev/sda1", "LABEL=swap", "192.168.1.10"]);

        let sda1 = table.get("/dev/sda1").unwrap();
        assert_eq!(sda1.mount.as_deref(), Some("/data"));
        assert_eq!(sda1.fs_type.as_deref(), Some("ext4"));
        assert_eq!(
            sda1.options.as_deref(),
            Some(&["rw".to_string(), "noatime".to_string()][..])
        );
        assert_eq!(sda1.pass.as_deref(), Some("2"));

        let nfs = table.get("192.168.1.10").unwrap();
        assert_eq!(nfs.export.as_deref(), Some("/srv/share"));
        assert_eq!(
            nfs.extra,
            vec![("comment".to_string(), "media share".to_string())]
        );
    }

    #[test]
    fn test_header_colon_is_optional() {
        let with_colon = parser().parse_str("UUID=abc-123:\n  mount: /a\n").unwrap();
        let without = parser().parse_str("UUID=abc-123\n  mount: /a\n").unwrap();
        assert_eq!(with_colon, without);
        assert!(with_colon.get("UUID=abc-123").is_some());

        let path = parser().parse_str("/dev/sdb1\n  mount: /b\n").unwrap();
        assert!(path.get("/dev/sdb1").is_some());
    }

    #[test]
    fn test_inline_options_value_is_discarded() {
        let table = parser()
            .parse_str("/dev/sda1:\n  options: ro\n  - noatime\n")
            .unwrap();
        assert_eq!(
            table.get("/dev/sda1").unwrap().options,
            Some(vec!["noatime".to_string()])
        );
    }

    #[test]
    fn test_option_without_header_fails() {
        let err = parser()
            .parse_str("/dev/sda1:\n  mount: /data\n  - rw\n")
            .unwrap_err();
        match err {
            Error::OptionsNotInitialized { device, line } => {
                assert_eq!(device, "/dev/sda1");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_header_overwrites_in_place() {
        let input = "/dev/sda1:\n  mount: /old\n  dump: 1\n/dev/sdb1:\n  mount: /b\n/dev/sda1:\n  mount: /new\n";
        let table = parser().parse_str(input).unwrap();

        let keys: Vec<&str> = table.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["/dev/sda1", "/dev/sdb1"]);

        let sda1 = table.get("/dev/sda1").unwrap();
        assert_eq!(sda1.mount.as_deref(), Some("/new"));
        assert_eq!(sda1.dump, None);
    }

    #[test]
    fn test_lines_before_first_header_are_ignored() {
        let table = parser()
            .parse_str("mount: /nowhere\n- rw\n\nnot a header\n")
            .unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_invalid_ip_is_not_a_header() {
        let table = parser().parse_str("300.1.1.1:\n  mount: /x\n").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_device_kind() {
        assert_eq!(DeviceKey::new("/dev/sda1").kind(), DeviceKind::Path);
        assert_eq!(DeviceKey::new("10.0.0.2").kind(), DeviceKind::Host);
        assert_eq!(
            DeviceKey::new("PARTUUID=1234").kind(),
            DeviceKind::Tag(TagKind::PartUuid)
        );
        assert_eq!(
            DeviceKey::new("LABEL=swap").kind(),
            DeviceKind::Tag(TagKind::Label)
        );
    }

    #[test]
    fn test_parse_file_and_missing_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        assert_eq!(parser().parse_file(file.path()).unwrap().len(), 3);

        let err = parser()
            .parse_file(Path::new("/nonexistent/fstab.yaml"))
            .unwrap_err();
        assert!(matches!(err, Error::InputRead { .. }));
    }

    #[test]
    fn test_invalid_pattern() {
        let config = Config {
            key_value_pattern: "([".to_string(),
            ..Config::default()
        };
        let err = Parser::new(&config).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { name: "key-value", .. }));
    }

    #[test]
    fn test_key_value_pattern_without_groups() {
        let config = Config {
            key_value_pattern: r"^[\w-]+:.*$".to_string(),
            ..Config::default()
        };
        let err = Parser::new(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingCaptureGroups {
                name: "key-value",
                expected: 2
            }
        ));
        assert_eq!(err.stage(), crate::Stage::Config);

        let config = Config {
            key_value_pattern: r"^([\w-]+):.*$".to_string(),
            ..Config::default()
        };
        assert!(Parser::new(&config).is_err());
    }
}
