use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::command::CommandTimings;
use crate::models::{EndpointTiming, TrackingPolicy, Zone};
use crate::sensor::RangeLimit;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PresenceConfig {
    pub link: LinkConfig,
    pub http: HttpConf,
    pub tracking: TrackingPolicy,
    /// Initial zones, at most 5.
    pub zones: Vec<Zone>,
    /// Debounce timing per endpoint: global first, then zones 1..=5.
    pub endpoints: Vec<EndpointTiming>,
    pub command: CommandConf,
    pub sensor: SensorConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device node, e.g. `/dev/ttyUSB0`.
    pub device: Option<PathBuf>,
    /// `host:port` of a TCP serial bridge.
    pub tcp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CommandConf {
    pub ack_timeout_ms: u64,
    pub step_delay_ms: u64,
    pub pause_timeout_ms: u64,
}

impl Default for CommandConf {
    fn default() -> Self {
        let t = CommandTimings::default();
        Self {
            ack_timeout_ms: t.ack_timeout.as_millis() as u64,
            step_delay_ms: t.step_delay.as_millis() as u64,
            pause_timeout_ms: t.pause_timeout.as_millis() as u64,
        }
    }
}

impl From<CommandConf> for CommandTimings {
    fn from(c: CommandConf) -> Self {
        Self {
            ack_timeout: Duration::from_millis(c.ack_timeout_ms),
            step_delay: Duration::from_millis(c.step_delay_ms),
            pause_timeout: Duration::from_millis(c.pause_timeout_ms),
        }
    }
}

/// Hardware settings pushed to the sensor at startup.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SensorConf {
    pub apply_on_start: bool,
    /// Delay before the first command, lets the sensor finish booting.
    pub boot_delay_ms: u64,
    pub bluetooth: bool,
    pub range: RangeLimit,
}

impl Default for SensorConf {
    fn default() -> Self {
        Self {
            apply_on_start: true,
            boot_delay_ms: 200,
            bluetooth: false,
            range: RangeLimit::default(),
        }
    }
}

pub fn config_path() -> PathBuf {
    std::env::var("PRESENCE_CONFIG")
        .unwrap_or_else(|_| "presence.yaml".into())
        .into()
}

pub async fn load_config() -> PresenceConfig {
    load_config_from(&config_path()).await
}

/// Reads `path`; a missing, empty or invalid file yields the defaults.
pub async fn load_config_from(path: &Path) -> PresenceConfig {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no config file, using defaults");
        return PresenceConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return PresenceConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
        PresenceConfig::default()
    })
}
