//! Presence kernel: turns the byte stream of a 24GHz multi-target radar into
//! debounced per-zone occupancy, and reconfigures the sensor over the same
//! link.
//!
//! Data path: [`frame::FrameDecoder`] -> [`tracking::select`] ->
//! [`zone::evaluate`] -> [`debounce::EndpointOccupancy`], driven by
//! [`ingest::Ingestion`]. Commands go through [`command::CommandChannel`].

pub mod buffer;
pub mod codec;
pub mod command;
pub mod config;
pub mod debounce;
pub mod frame;
pub mod handoff;
pub mod health;
pub mod http;
pub mod ingest;
pub mod link;
pub mod models;
pub mod sensor;
pub mod state;
pub mod tracking;
pub mod zone;

pub use command::{Ack, CommandChannel, CommandError, CommandTimings};
pub use handoff::Handoff;
pub use health::HealthTracker;
pub use ingest::Ingestion;
pub use models::{Endpoint, Point, Report, SensorEvent, Target, TrackingMode, TrackingPolicy, Zone};
pub use state::{new_state, ConfigError, SensorState, Shared};
