/*!
# Presence DevKit - simulated radar and wire helpers for tests

- Simulated sensor on an in-memory duplex link (acks, failure injection,
  data frame streaming)
- Data/ack/command frame builders
- Harness with assertions on the command sequence the host sent
*/

pub mod frames;
pub mod mock_sensor;
pub mod test_utils;

pub use frames::{ack_frame, command_frame, corrupt_footer, data_frame, ParsedCommand, SimTarget};
pub use mock_sensor::{MockSensor, Reply};
pub use test_utils::SensorHarness;
