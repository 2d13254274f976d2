//! Post-write validation.
//!
//! After the live fstab is replaced, every configured filesystem is mounted
//! with `mount -a`. A failure here is the signal to roll back.

use std::process::Command;

use log::debug;

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};

/// Mounts everything listed in the live fstab.
pub trait MountValidator {
    /// Returns `Ok(())` if every entry mounted.
    fn mount_all(&self) -> Result<()>;
}

impl<F> MountValidator for F
where
    F: Fn() -> Result<()>,
{
    fn mount_all(&self) -> Result<()> {
        self()
    }
}

/// Runs the configured mount command (`mount -a` by default).
#[derive(Debug, Clone)]
pub struct SystemMounter {
    program: String,
    args: Vec<String>,
}

impl SystemMounter {
    pub fn new(config: &Config) -> Self {
        let mut parts = config.mount_command.iter().cloned();
        let program = parts.next().unwrap_or_else(|| "mount".to_string());
        Self {
            program,
            args: parts.collect(),
        }
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl MountValidator for SystemMounter {
    fn mount_all(&self) -> Result<()> {
        let command = self.command_line();
        debug!("running '{command}'");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .command_context(&command)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::CommandExit {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(())
    }
}
