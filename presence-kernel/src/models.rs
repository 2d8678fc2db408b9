use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of target slots in every data frame.
pub const TARGET_SLOTS: usize = 3;
/// Number of user-defined zones.
pub const MAX_ZONES: usize = 5;
/// Endpoint 0 is the global occupancy, endpoints 1..=5 map to zones 0..=4.
pub const ENDPOINT_COUNT: usize = 1 + MAX_ZONES;
/// Coordinate range accepted for zone vertices (sensor range is 6 m).
pub const ZONE_COORD_LIMIT_MM: i16 = 6000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub present: bool,
    pub x_mm: i16,
    pub y_mm: i16,
    pub speed: i16,
}

impl Target {
    pub fn position(&self) -> Point {
        Point { x_mm: self.x_mm, y_mm: self.y_mm }
    }
}

/// One decoded data frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub targets: [Target; TARGET_SLOTS],
    pub target_count: u8,
    pub occupied: bool,
}

impl Report {
    pub fn present_targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|t| t.present)
    }
}

/// Sensor plane coordinates in mm: origin at the sensor, +X right, +Y forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x_mm: i16,
    pub y_mm: i16,
}

impl Point {
    pub const fn new(x_mm: i16, y_mm: i16) -> Self {
        Self { x_mm, y_mm }
    }
}

/// Quadrilateral detection region. Vertex order is not validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub enabled: bool,
    pub vertices: [Point; 4],
}

impl Zone {
    pub fn new(vertices: [Point; 4]) -> Self {
        Self { enabled: true, vertices }
    }

    pub fn is_all_zero(&self) -> bool {
        self.vertices.iter().all(|v| v.x_mm == 0 && v.y_mm == 0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    Multi,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingPolicy {
    pub enabled: bool,
    pub mode: TrackingMode,
    /// Publish target coordinates alongside occupancy.
    pub publish_detail: bool,
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: TrackingMode::Multi,
            publish_detail: false,
        }
    }
}

/// Debounce timing of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointTiming {
    #[serde(with = "millis")]
    pub delay: Duration,
    #[serde(with = "millis")]
    pub cooldown: Duration,
}

impl Default for EndpointTiming {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(250),
            cooldown: Duration::ZERO,
        }
    }
}

/// Output of the tracking selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub selected: Target,
    pub effective_count: u8,
}

/// Identifies one of the occupancy state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum Endpoint {
    Global,
    Zone(u8),
}

impl Endpoint {
    pub fn index(self) -> usize {
        match self {
            Endpoint::Global => 0,
            Endpoint::Zone(z) => 1 + z as usize,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Endpoint::Global),
            i if i < ENDPOINT_COUNT => Some(Endpoint::Zone((i - 1) as u8)),
            _ => None,
        }
    }

    pub fn all() -> impl Iterator<Item = Endpoint> {
        (0..ENDPOINT_COUNT).filter_map(Endpoint::from_index)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Global => write!(f, "global"),
            Endpoint::Zone(z) => write!(f, "zone{}", z + 1),
        }
    }
}

/// Events handed to the reporting collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Occupancy { endpoint: Endpoint, occupied: bool },
    TargetCount { count: u8 },
    /// Positions of the reported targets; only sent when detail publishing is on.
    Targets { points: Vec<Point> },
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
