//! Session configuration: TOML file with defaults, overridden by CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{DriverError, Result};
use crate::evm::{BAUD_RATE, DEFAULT_TIMEOUT};
use crate::profile::Profile;
use crate::stream::FrameErrorPolicy;

/// Operating mode: which profile is applied and how many channels are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Channel 0 live, channel 1 as a dummy (still logged).
    #[default]
    Single,
    /// Channels 0-1 live.
    Dual,
    /// Channels 0-3 live.
    Quad,
}

impl Mode {
    /// Channels decoded from each frame and written to storage.
    pub fn stream_channels(self) -> usize {
        match self {
            Mode::Single | Mode::Dual => 2,
            Mode::Quad => 4,
        }
    }

    /// Channels that are calibrated and published.
    pub fn live_channels(self) -> usize {
        match self {
            Mode::Single => 1,
            Mode::Dual => 2,
            Mode::Quad => 4,
        }
    }

    pub fn profile(self) -> Result<Profile> {
        match self {
            Mode::Single => Ok(Profile::single_channel()),
            Mode::Dual | Mode::Quad => Profile::multi_channel(self.stream_channels()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Lines buffered per listener before the oldest are dropped.
    pub capacity: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 5555,
            capacity: 64,
        }
    }
}

impl PublishConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings for one logging session. Every field has a default, so an empty
/// file (or no file) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Serial device path; discovered by USB id when absent.
    pub serial: Option<String>,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub mode: Mode,
    pub output: PathBuf,
    pub frame_errors: FrameErrorPolicy,
    pub publish: PublishConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            serial: None,
            baud_rate: BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            mode: Mode::default(),
            output: PathBuf::from("data.csv"),
            frame_errors: FrameErrorPolicy::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
            .map_err(|e| DriverError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
