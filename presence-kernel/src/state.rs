/**
 * SENSOR STATE - Live pipeline state shared with the outside world
 *
 * ROLE:
 * Holds the latest report, the per-endpoint debouncers and the user
 * configuration (zones, tracking policy, timings). The ingestion loop is the
 * only writer of report/occupancy; everything else copies data out through
 * snapshot accessors or in through validated mutators.
 *
 * LOCKING: `Shared<T>` is a parking_lot mutex. Callers hold it for one short
 * copy or one pipeline step, never across an await.
 */

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::time::Instant;

use crate::debounce::{EndpointOccupancy, Phase};
use crate::models::{
    Endpoint, EndpointTiming, Point, Report, Selection, SensorEvent, TrackingMode, TrackingPolicy,
    Zone, ENDPOINT_COUNT, MAX_ZONES, ZONE_COORD_LIMIT_MM,
};
use crate::{tracking, zone};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("zone index {0} out of range (0..{max})", max = MAX_ZONES)]
    ZoneIndex(usize),
    #[error("{0} zones given, at most {max} supported", max = MAX_ZONES)]
    TooManyZones(usize),
    #[error("zone {zone} vertex {vertex} outside ±{limit} mm", limit = ZONE_COORD_LIMIT_MM)]
    VertexOutOfRange { zone: usize, vertex: usize },
    #[error("zone {0} is enabled but has no geometry")]
    EmptyZone(usize),
    #[error("endpoint index {0} out of range (0..{max})", max = ENDPOINT_COUNT)]
    EndpointIndex(usize),
}

fn validate_zone(index: usize, zone: &Zone) -> Result<(), ConfigError> {
    if index >= MAX_ZONES {
        return Err(ConfigError::ZoneIndex(index));
    }
    let in_range = |v: i16| (-ZONE_COORD_LIMIT_MM..=ZONE_COORD_LIMIT_MM).contains(&v);
    if let Some(vertex) = zone
        .vertices
        .iter()
        .position(|p| !in_range(p.x_mm) || !in_range(p.y_mm))
    {
        return Err(ConfigError::VertexOutOfRange { zone: index, vertex });
    }
    if zone.enabled && zone.is_all_zero() {
        return Err(ConfigError::EmptyZone(index));
    }
    Ok(())
}

/// Stable state of one endpoint as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndpointView {
    pub endpoint: Endpoint,
    pub occupied: bool,
    pub phase: Phase,
    pub timing: EndpointTiming,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub report: Report,
    pub selection: Selection,
    /// Bit i set when zone i is raw-occupied in the last evaluation.
    pub zone_bits: u8,
    pub endpoints: Vec<EndpointView>,
    pub zones: [Zone; MAX_ZONES],
    pub policy: TrackingPolicy,
    /// RFC3339 time of the last decoded frame.
    pub last_frame: Option<String>,
}

#[derive(Debug, Default)]
pub struct SensorState {
    report: Report,
    selection: Selection,
    zone_bits: u8,
    occupancy: [EndpointOccupancy; ENDPOINT_COUNT],
    zones: [Zone; MAX_ZONES],
    policy: TrackingPolicy,
    timings: [EndpointTiming; ENDPOINT_COUNT],
    last_frame: Option<OffsetDateTime>,
    // Change detection for count/position events.
    last_count: u8,
    last_points: Vec<Point>,
}

impl SensorState {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- snapshots -----

    pub fn report(&self) -> Report {
        self.report
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Stable occupancy per endpoint, global first.
    pub fn occupancy(&self) -> [bool; ENDPOINT_COUNT] {
        self.occupancy.map(|o| o.stable)
    }

    pub fn zones(&self) -> [Zone; MAX_ZONES] {
        self.zones
    }

    pub fn policy(&self) -> TrackingPolicy {
        self.policy
    }

    pub fn timings(&self) -> [EndpointTiming; ENDPOINT_COUNT] {
        self.timings
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let endpoints = Endpoint::all()
            .map(|endpoint| {
                let occ = &self.occupancy[endpoint.index()];
                EndpointView {
                    endpoint,
                    occupied: occ.stable,
                    phase: occ.phase(),
                    timing: self.timings[endpoint.index()],
                }
            })
            .collect();
        PipelineSnapshot {
            report: self.report,
            selection: self.selection,
            zone_bits: self.zone_bits,
            endpoints,
            zones: self.zones,
            policy: self.policy,
            last_frame: self.last_frame.and_then(|t| t.format(&Rfc3339).ok()),
        }
    }

    // ----- mutators -----

    pub fn set_zone(&mut self, index: usize, zone: Zone) -> Result<(), ConfigError> {
        validate_zone(index, &zone)?;
        self.zones[index] = zone;
        Ok(())
    }

    /// Replaces the whole zone set; missing trailing entries become disabled.
    /// Nothing changes if any entry is rejected.
    pub fn set_zones(&mut self, zones: &[Zone]) -> Result<(), ConfigError> {
        if zones.len() > MAX_ZONES {
            return Err(ConfigError::TooManyZones(zones.len()));
        }
        for (i, z) in zones.iter().enumerate() {
            validate_zone(i, z)?;
        }
        self.zones = [Zone::default(); MAX_ZONES];
        self.zones[..zones.len()].copy_from_slice(zones);
        Ok(())
    }

    pub fn set_tracking_mode(&mut self, mode: TrackingMode) {
        self.policy.mode = mode;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.policy.enabled = enabled;
    }

    pub fn set_publish_detail(&mut self, publish_detail: bool) {
        self.policy.publish_detail = publish_detail;
    }

    pub fn set_policy(&mut self, policy: TrackingPolicy) {
        self.policy = policy;
    }

    pub fn set_endpoint_timing(&mut self, index: usize, timing: EndpointTiming) -> Result<(), ConfigError> {
        let slot = self
            .timings
            .get_mut(index)
            .ok_or(ConfigError::EndpointIndex(index))?;
        *slot = timing;
        Ok(())
    }

    // ----- pipeline -----

    /// Runs one decoded report through selection, zones and debouncing.
    /// Returns the events to publish, in the order they became true.
    ///
    /// With tracking disabled only the raw report is recorded; occupancy
    /// holds its last stable value.
    pub fn apply_report(&mut self, report: Report, now: Instant) -> Vec<SensorEvent> {
        self.report = report;
        self.last_frame = Some(OffsetDateTime::now_utc());
        if !self.policy.enabled {
            return Vec::new();
        }

        let selection = tracking::select(&report, &self.policy);
        let points = tracking::zone_points(&report, &selection, &self.policy);
        let zone_bits = zone::evaluate(&self.zones, points.iter());
        self.selection = selection;
        self.zone_bits = zone_bits;

        let mut events = Vec::new();
        for endpoint in Endpoint::all() {
            let raw = match endpoint {
                Endpoint::Global => selection.effective_count > 0,
                Endpoint::Zone(z) => zone_bits & (1 << z) != 0,
            };
            let i = endpoint.index();
            if let Some(occupied) = self.occupancy[i].update(raw, now, &self.timings[i]) {
                events.push(SensorEvent::Occupancy { endpoint, occupied });
            }
        }

        if selection.effective_count != self.last_count {
            self.last_count = selection.effective_count;
            events.push(SensorEvent::TargetCount { count: selection.effective_count });
        }

        if self.policy.publish_detail {
            let positions: Vec<Point> = report.present_targets().map(|t| t.position()).collect();
            if positions != self.last_points {
                self.last_points = positions.clone();
                events.push(SensorEvent::Targets { points: positions });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Target;
    use std::time::Duration;

    fn square() -> Zone {
        Zone::new([
            Point::new(0, 500),
            Point::new(500, 500),
            Point::new(500, 1500),
            Point::new(0, 1500),
        ])
    }

    fn report_at(points: &[(i16, i16)]) -> Report {
        let mut r = Report::default();
        for (slot, &(x_mm, y_mm)) in points.iter().enumerate() {
            r.targets[slot] = Target { present: true, x_mm, y_mm, speed: 0 };
        }
        r.target_count = points.len() as u8;
        r.occupied = r.target_count > 0;
        r
    }

    fn instant_timing() -> EndpointTiming {
        EndpointTiming { delay: Duration::ZERO, cooldown: Duration::ZERO }
    }

    #[test]
    fn rejected_zone_leaves_state_unchanged() {
        let mut s = SensorState::new();
        s.set_zone(0, square()).unwrap();

        assert_eq!(s.set_zone(5, square()), Err(ConfigError::ZoneIndex(5)));
        assert_eq!(
            s.set_zone(0, Zone::new([Point::default(); 4])),
            Err(ConfigError::EmptyZone(0))
        );
        let mut far = square();
        far.vertices[2] = Point::new(500, 7000);
        assert_eq!(
            s.set_zone(0, far),
            Err(ConfigError::VertexOutOfRange { zone: 0, vertex: 2 })
        );
        assert_eq!(s.zones()[0], square());

        // A disabled all-zero zone is simply "no zone".
        s.set_zone(1, Zone::default()).unwrap();
    }

    #[test]
    fn set_zones_is_all_or_nothing() {
        let mut s = SensorState::new();
        s.set_zones(&[square()]).unwrap();

        let too_many = [square(); MAX_ZONES + 1];
        assert_eq!(s.set_zones(&too_many), Err(ConfigError::TooManyZones(6)));

        let bad = [square(), Zone::new([Point::default(); 4])];
        assert_eq!(s.set_zones(&bad), Err(ConfigError::EmptyZone(1)));
        assert_eq!(s.zones()[0], square());
        assert!(!s.zones()[1].enabled);
    }

    #[test]
    fn endpoint_timing_index_checked() {
        let mut s = SensorState::new();
        assert_eq!(
            s.set_endpoint_timing(6, instant_timing()),
            Err(ConfigError::EndpointIndex(6))
        );
        s.set_endpoint_timing(5, instant_timing()).unwrap();
        assert_eq!(s.timings()[5], instant_timing());
        assert_eq!(s.timings()[0], EndpointTiming::default());
    }

    #[test]
    fn pipeline_emits_zone_and_global_transitions() {
        let mut s = SensorState::new();
        s.set_zone(0, square()).unwrap();
        for i in 0..ENDPOINT_COUNT {
            s.set_endpoint_timing(i, instant_timing()).unwrap();
        }
        let t0 = Instant::now();

        let events = s.apply_report(report_at(&[(250, 1000)]), t0);
        assert_eq!(
            events,
            vec![
                SensorEvent::Occupancy { endpoint: Endpoint::Global, occupied: true },
                SensorEvent::Occupancy { endpoint: Endpoint::Zone(0), occupied: true },
                SensorEvent::TargetCount { count: 1 },
            ]
        );
        assert_eq!(s.occupancy(), [true, true, false, false, false, false]);

        // Target walks out of the zone but stays in view.
        let events = s.apply_report(report_at(&[(2000, 1000)]), t0 + Duration::from_millis(100));
        assert_eq!(
            events,
            vec![SensorEvent::Occupancy { endpoint: Endpoint::Zone(0), occupied: false }]
        );

        let events = s.apply_report(Report::default(), t0 + Duration::from_millis(200));
        assert_eq!(
            events,
            vec![
                SensorEvent::Occupancy { endpoint: Endpoint::Global, occupied: false },
                SensorEvent::TargetCount { count: 0 },
            ]
        );
    }

    #[test]
    fn single_mode_only_tests_selected_target() {
        let mut s = SensorState::new();
        s.set_zone(0, square()).unwrap();
        s.set_endpoint_timing(1, instant_timing()).unwrap();
        s.set_tracking_mode(TrackingMode::Single);

        // Nearest target is outside the zone; the one inside is ignored.
        let events = s.apply_report(report_at(&[(250, 1000), (3000, 300)]), Instant::now());
        assert!(!events.contains(&SensorEvent::Occupancy { endpoint: Endpoint::Zone(0), occupied: true }));
        assert_eq!(s.selection().effective_count, 1);
        assert_eq!(s.selection().selected.y_mm, 300);
    }

    #[test]
    fn detail_publishing_reports_positions_on_change() {
        let mut s = SensorState::new();
        s.set_publish_detail(true);
        let t0 = Instant::now();

        let events = s.apply_report(report_at(&[(10, 20)]), t0);
        assert!(events.contains(&SensorEvent::Targets { points: vec![Point::new(10, 20)] }));

        let events = s.apply_report(report_at(&[(10, 20)]), t0);
        assert!(!events.iter().any(|e| matches!(e, SensorEvent::Targets { .. })));
    }

    #[test]
    fn disabled_tracking_holds_occupancy() {
        let mut s = SensorState::new();
        s.set_endpoint_timing(0, instant_timing()).unwrap();
        let t0 = Instant::now();
        s.apply_report(report_at(&[(0, 1000)]), t0);
        assert!(s.occupancy()[0]);

        s.set_enabled(false);
        let events = s.apply_report(Report::default(), t0 + Duration::from_millis(10));
        assert!(events.is_empty());
        assert!(s.occupancy()[0]);
        assert_eq!(s.report().target_count, 0);

        let snap = s.snapshot();
        assert_eq!(snap.endpoints.len(), ENDPOINT_COUNT);
        assert!(snap.last_frame.is_some());
        assert!(!snap.policy.enabled);
    }
}
