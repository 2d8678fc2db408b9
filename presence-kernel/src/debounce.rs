use serde::Serialize;
use tokio::time::Instant;

use crate::models::EndpointTiming;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    pub target_state: bool,
    pub started_at: Instant,
}

/// Hysteresis for one endpoint.
///
/// A raw change arms a timer toward the new value; `delay` guards the move to
/// occupied and `cooldown` the move to clear. A raw value equal to the stable
/// one cancels any armed timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointOccupancy {
    pub stable: bool,
    pub pending: Option<Pending>,
}

/// Observable phase of an endpoint, for snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Clear,
    PendingOccupied,
    Occupied,
    PendingClear,
}

impl EndpointOccupancy {
    /// Feeds one raw sample. Returns the new stable value when a transition
    /// is confirmed by this call.
    pub fn update(&mut self, raw: bool, now: Instant, timing: &EndpointTiming) -> Option<bool> {
        if raw == self.stable {
            self.pending = None;
            return None;
        }

        let started_at = match self.pending {
            Some(p) if p.target_state == raw => p.started_at,
            _ => {
                self.pending = Some(Pending { target_state: raw, started_at: now });
                now
            }
        };

        let hold = if raw { timing.delay } else { timing.cooldown };
        if now.saturating_duration_since(started_at) >= hold {
            self.stable = raw;
            self.pending = None;
            return Some(raw);
        }
        None
    }

    pub fn phase(&self) -> Phase {
        match (self.stable, self.pending.is_some()) {
            (false, false) => Phase::Clear,
            (false, true) => Phase::PendingOccupied,
            (true, false) => Phase::Occupied,
            (true, true) => Phase::PendingClear,
        }
    }
}
