//! Typed hardware configuration commands.
//!
//! Each call is one full enter/command/exit exchange on the command channel.

use serde::{Deserialize, Serialize};

use crate::command::{Ack, CommandChannel, CommandError};
use crate::models::TrackingMode;

pub const CMD_SINGLE_TARGET: u8 = 0x80;
pub const CMD_MULTI_TARGET: u8 = 0x90;
pub const CMD_FACTORY_RESET: u8 = 0xA2;
pub const CMD_RESTART: u8 = 0xA3;
pub const CMD_BLUETOOTH: u8 = 0xA4;
pub const CMD_SET_REGION: u8 = 0xC2;

/// Sensor range limits.
pub const MAX_RANGE_MM: u16 = 6000;
pub const MAX_ANGLE_DEG: u8 = 90;
const REGION_PAYLOAD_LEN: usize = 26;

/// Hardware region filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum RegionKind {
    Disabled = 0,
    DetectInside = 1,
    ExcludeInside = 2,
}

/// Axis-aligned rectangle applied by the sensor itself, before any frame
/// reaches the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub kind: RegionKind,
    pub x1: i16,
    pub y1: i16,
    pub x2: i16,
    pub y2: i16,
}

impl Region {
    pub const DISABLED: Region = Region {
        kind: RegionKind::Disabled,
        x1: 0,
        y1: 0,
        x2: 0,
        y2: 0,
    };

    /// Kind, then rectangle 1. Rectangles 2 and 3 stay zero.
    pub fn payload(&self) -> [u8; REGION_PAYLOAD_LEN] {
        let mut p = [0u8; REGION_PAYLOAD_LEN];
        p[0..2].copy_from_slice(&(self.kind as u16).to_le_bytes());
        p[2..4].copy_from_slice(&self.x1.to_le_bytes());
        p[4..6].copy_from_slice(&self.y1.to_le_bytes());
        p[6..8].copy_from_slice(&self.x2.to_le_bytes());
        p[8..10].copy_from_slice(&self.y2.to_le_bytes());
        p
    }
}

/// Detection cone: maximum distance and opening angle on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeLimit {
    pub max_distance_mm: u16,
    pub angle_left_deg: u8,
    pub angle_right_deg: u8,
}

impl Default for RangeLimit {
    fn default() -> Self {
        Self {
            max_distance_mm: MAX_RANGE_MM,
            angle_left_deg: 60,
            angle_right_deg: 60,
        }
    }
}

impl RangeLimit {
    /// Region approximating the cone. Unlimited range and angles disable the
    /// filter; otherwise the box spans the cone's width at full distance.
    pub fn region(&self) -> Region {
        let max = self.max_distance_mm.min(MAX_RANGE_MM);
        let left = self.angle_left_deg.min(MAX_ANGLE_DEG);
        let right = self.angle_right_deg.min(MAX_ANGLE_DEG);

        if max >= MAX_RANGE_MM && left >= MAX_ANGLE_DEG && right >= MAX_ANGLE_DEG {
            return Region::DISABLED;
        }

        let limit = f64::from(MAX_RANGE_MM);
        let half_width = |deg: u8| f64::from(max) * f64::from(deg).to_radians().tan();
        let x_left = (-half_width(left)).max(-limit) as i16;
        let x_right = half_width(right).min(limit) as i16;

        Region {
            kind: RegionKind::DetectInside,
            x1: x_left,
            y1: 0,
            x2: x_right,
            y2: max as i16,
        }
    }
}

impl CommandChannel {
    pub async fn set_tracking_mode(&self, mode: TrackingMode) -> Result<Ack, CommandError> {
        let id = match mode {
            TrackingMode::Single => CMD_SINGLE_TARGET,
            TrackingMode::Multi => CMD_MULTI_TARGET,
        };
        let res = self.send_command(id, &[]).await;
        tracing::info!(?mode, ok = res.is_ok(), "set sensor tracking mode");
        res
    }

    pub async fn set_bluetooth(&self, enabled: bool) -> Result<Ack, CommandError> {
        let res = self.send_command(CMD_BLUETOOTH, &[u8::from(enabled), 0x00]).await;
        tracing::info!(enabled, ok = res.is_ok(), "set sensor bluetooth");
        res
    }

    pub async fn restart(&self) -> Result<Ack, CommandError> {
        let res = self.send_command(CMD_RESTART, &[]).await;
        tracing::info!(ok = res.is_ok(), "sensor restart");
        res
    }

    pub async fn factory_reset(&self) -> Result<Ack, CommandError> {
        let res = self.send_command(CMD_FACTORY_RESET, &[]).await;
        tracing::info!(ok = res.is_ok(), "sensor factory reset");
        res
    }

    pub async fn set_region(&self, region: Region) -> Result<Ack, CommandError> {
        let res = self.send_command(CMD_SET_REGION, &region.payload()).await;
        tracing::info!(?region, ok = res.is_ok(), "set sensor region");
        res
    }

    pub async fn clear_region(&self) -> Result<Ack, CommandError> {
        self.set_region(Region::DISABLED).await
    }

    /// Pushes a distance/angle limit down to the sensor as a region filter.
    pub async fn apply_distance_angle(&self, limit: RangeLimit) -> Result<Ack, CommandError> {
        self.set_region(limit.region()).await
    }
}
