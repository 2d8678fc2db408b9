/*!
Test harness for code talking to the radar

Creates the in-memory link, starts the simulated sensor on its far end and
offers a few assertions on what the host sent.
*/

use anyhow::Result;
use std::time::Duration;
use tokio::io::DuplexStream;

use crate::frames::{ParsedCommand, ENTER_CONFIG, EXIT_CONFIG};
use crate::mock_sensor::MockSensor;

const LINK_BUFFER: usize = 4096;

pub struct SensorHarness {
    pub sensor: MockSensor,
}

impl SensorHarness {
    /// Returns the harness and the host end of the link.
    pub fn new() -> (Self, DuplexStream) {
        env_logger::builder().is_test(true).try_init().ok();

        let (host, far) = tokio::io::duplex(LINK_BUFFER);
        let sensor = MockSensor::spawn(far);
        (Self { sensor }, host)
    }

    /// Polls `cond` every 10 ms until it holds or `timeout` passes.
    pub async fn wait_until<F: Fn() -> bool>(&self, cond: F, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    /// Commands between each enter/exit pair, in order.
    pub fn wrapped_commands(&self) -> Vec<ParsedCommand> {
        self.sensor
            .commands()
            .into_iter()
            .filter(|c| c.id != ENTER_CONFIG && c.id != EXIT_CONFIG)
            .collect()
    }

    /// Fails unless the sensor saw exactly `ids`, in order.
    pub fn expect_command_ids(&self, ids: &[u8]) -> Result<()> {
        let got = self.sensor.command_ids();
        if got != ids {
            anyhow::bail!("expected commands {:02x?}, sensor saw {:02x?}", ids, got);
        }
        log::info!("[harness] command sequence verified ({} frames)", got.len());
        Ok(())
    }

    /// Fails if the sensor was left in configuration mode.
    pub fn expect_exited_config(&self) -> Result<()> {
        if self.sensor.in_config_mode() {
            anyhow::bail!("sensor still in configuration mode");
        }
        Ok(())
    }
}
