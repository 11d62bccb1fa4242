//! Radio control by shelling out to `ip` and `iw`. Every failure is logged and returned; callers
//! treat them as non-fatal.

use std::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("could not run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Channel control used by the hop worker and the channel lock.
pub trait Radio: Send + Sync {
    fn set_channel(&self, channel: u8) -> Result<(), RadioError>;
}

/// Radio driven through the `iw` and `ip` command-line tools.
pub struct IwRadio {
    interface: String,
}

impl IwRadio {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    /// Alternative monitor mode for drivers that can't switch while the interface is up:
    /// bring it down, set monitor mode, bring it back up.
    pub fn alt_monitor(&self) {
        tracing::info!("using alternative monitor mode");
        tracing::info!(interface = %self.interface, "bringing interface down");
        let _ = run("ip", &["link", "set", self.interface.as_str(), "down"]);
        tracing::info!("setting monitor mode");
        let _ = run("iw", &[self.interface.as_str(), "set", "monitor", "none"]);
        tracing::info!(interface = %self.interface, "bringing interface up");
        let _ = run("ip", &["link", "set", self.interface.as_str(), "up"]);
    }
}

impl Radio for IwRadio {
    fn set_channel(&self, channel: u8) -> Result<(), RadioError> {
        run(
            "iw",
            &[self.interface.as_str(), "set", "channel", channel.to_string().as_str()],
        )
    }
}

fn run(program: &str, args: &[&str]) -> Result<(), RadioError> {
    let command = format!("{} {}", program, args.join(" "));
    tracing::debug!(%command, "running");
    let result = match Command::new(program).args(args).output() {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => Err(RadioError::Failed {
            command,
            status: out.status,
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        }),
        Err(source) => Err(RadioError::Spawn { command, source }),
    };
    if let Err(e) = &result {
        tracing::error!(error = %e, "radio command failed");
    }
    result
}
