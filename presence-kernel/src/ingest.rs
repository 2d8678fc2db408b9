/**
 * INGESTION - Background loop that owns the sensor link's read side
 *
 * LOOP:
 * - checkpoint: yield the link to the command channel when asked
 * - read up to 256 bytes, bounded by a short timeout
 * - feed the frame decoder; on a new frame run select -> zones -> debounce
 *   under one short state lock, then publish the resulting events
 *
 * Framing problems never stop the loop. Read errors back off briefly; end of
 * stream ends the loop.
 */

use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use crate::frame::FrameDecoder;
use crate::handoff::Handoff;
use crate::health::HealthTracker;
use crate::link::SharedLink;
use crate::models::SensorEvent;
use crate::state::{SensorState, Shared};

const READ_CHUNK: usize = 256;
const READ_TIMEOUT: Duration = Duration::from_millis(50);
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Handle on the running ingestion task.
pub struct Ingestion {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Ingestion {
    /// Starts the loop. Events are delivered on the returned receiver.
    pub fn spawn(
        link: SharedLink,
        handoff: Handoff,
        state: Shared<SensorState>,
        health: HealthTracker,
    ) -> (Self, mpsc::UnboundedReceiver<SensorEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        // Attached before the task runs so an early command waits for it.
        handoff.attach();
        let handle = tokio::spawn(run(link, handoff, state, health, events_tx, shutdown_rx));
        (Self { shutdown, handle }, events_rx)
    }

    /// Asks the loop to stop after its current read.
    ///
    /// The flag is checked at the top of each iteration only. A loop parked
    /// for a command exchange stops once that command resumes it, so `join`
    /// can take up to one full command sequence.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "ingestion task panicked");
        }
    }
}

async fn run(
    link: SharedLink,
    handoff: Handoff,
    state: Shared<SensorState>,
    health: HealthTracker,
    events: mpsc::UnboundedSender<SensorEvent>,
    shutdown: watch::Receiver<bool>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_CHUNK];
    health.mark_link("open");
    tracing::info!("ingestion loop started");

    loop {
        if *shutdown.borrow() {
            tracing::info!("ingestion loop stopping");
            break;
        }
        if handoff.checkpoint().await {
            // The command exchange consumed bytes mid-stream.
            decoder.reset();
            continue;
        }

        let read = {
            let mut link = link.lock().await;
            timeout(READ_TIMEOUT, link.read(&mut buf)).await
        };
        let n = match read {
            Err(_) => continue,
            Ok(Ok(0)) => {
                tracing::warn!("sensor link closed");
                health.mark_link("closed");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "sensor link read failed");
                health.increment_read_errors();
                sleep(READ_ERROR_BACKOFF).await;
                continue;
            }
        };

        let decoded = decoder.feed(&buf[..n]);
        health.record_decoder(decoder.stats());
        if !decoded {
            continue;
        }

        let report = *decoder.latest_report();
        let published = state.lock().apply_report(report, Instant::now());
        let transitions = published
            .iter()
            .filter(|e| matches!(e, SensorEvent::Occupancy { .. }))
            .count();
        health.add_transitions(transitions as u64);
        for event in published {
            tracing::debug!(?event, "sensor event");
            // A dropped receiver only means nobody is listening.
            let _ = events.send(event);
        }
    }

    handoff.detach();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DATA_FOOTER, DATA_FRAME_LEN, DATA_HEADER};
    use crate::link;
    use crate::models::{Endpoint, EndpointTiming, ENDPOINT_COUNT};
    use crate::state::new_state;
    use tokio::io::AsyncWriteExt;

    /// One present target at (x, y) in slot 0.
    fn frame(x: i16, y: i16) -> [u8; DATA_FRAME_LEN] {
        let mut f = [0u8; DATA_FRAME_LEN];
        f[..4].copy_from_slice(&DATA_HEADER);
        let raw_x = if x < 0 { 0x8000 | x.unsigned_abs() } else { x as u16 };
        let raw_y = (y as u16).wrapping_add(0x8000);
        f[4..6].copy_from_slice(&raw_x.to_le_bytes());
        f[6..8].copy_from_slice(&raw_y.to_le_bytes());
        f[28..].copy_from_slice(&DATA_FOOTER);
        f
    }

    fn empty_frame() -> [u8; DATA_FRAME_LEN] {
        let mut f = [0u8; DATA_FRAME_LEN];
        f[..4].copy_from_slice(&DATA_HEADER);
        f[28..].copy_from_slice(&DATA_FOOTER);
        f
    }

    #[tokio::test(start_paused = true)]
    async fn frames_become_events() {
        let (ours, mut sensor) = tokio::io::duplex(1024);
        let state = new_state(SensorState::new());
        for i in 0..ENDPOINT_COUNT {
            state
                .lock()
                .set_endpoint_timing(i, EndpointTiming { delay: Duration::ZERO, cooldown: Duration::ZERO })
                .unwrap();
        }
        let health = HealthTracker::new();
        let (ingestion, mut events) =
            Ingestion::spawn(link::shared(ours), Handoff::new(), state.clone(), health.clone());

        sensor.write_all(&frame(-120, 900)).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SensorEvent::Occupancy { endpoint: Endpoint::Global, occupied: true }
        );
        assert_eq!(events.recv().await.unwrap(), SensorEvent::TargetCount { count: 1 });
        let target = state.lock().report().targets[0];
        assert_eq!((target.x_mm, target.y_mm), (-120, 900));

        sensor.write_all(&empty_frame()).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            SensorEvent::Occupancy { endpoint: Endpoint::Global, occupied: false }
        );

        ingestion.shutdown();
        ingestion.join().await;
        assert_eq!(health.get_health().frames_decoded, 2);
        assert_eq!(health.get_health().transitions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_garbage_and_ends_on_eof() {
        let (ours, mut sensor) = tokio::io::duplex(1024);
        let state = new_state(SensorState::new());
        let handoff = Handoff::new();
        let (ingestion, _events) =
            Ingestion::spawn(link::shared(ours), handoff.clone(), state.clone(), HealthTracker::new());
        assert!(handoff.is_attached());

        sensor.write_all(&[0x13; 500]).await.unwrap();
        sensor.write_all(&frame(0, 1200)).await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(state.lock().report().target_count, 1);

        drop(sensor);
        ingestion.join().await;
        assert!(!handoff.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_parked_waits_for_resume() {
        let (ours, _sensor) = tokio::io::duplex(1024);
        let handoff = Handoff::new();
        let (ingestion, _events) = Ingestion::spawn(
            link::shared(ours),
            handoff.clone(),
            new_state(SensorState::new()),
            HealthTracker::new(),
        );

        handoff.request_pause();
        handoff.wait_paused(Duration::from_millis(500)).await.unwrap();
        ingestion.shutdown();
        sleep(Duration::from_millis(200)).await;
        assert!(!ingestion.is_finished());

        handoff.resume();
        ingestion.join().await;
        assert!(!handoff.is_attached());
    }
}
