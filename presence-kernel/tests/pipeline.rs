use std::time::Duration;

use presence_devkit::{corrupt_footer, data_frame, SensorHarness, SimTarget};
use presence_kernel::models::EndpointTiming;
use presence_kernel::{link, new_state, Endpoint, Handoff, HealthTracker, Ingestion, Point, SensorEvent, SensorState, Shared, Zone};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;

const FRAME_PERIOD: Duration = Duration::from_millis(50);

fn doorway() -> Zone {
    Zone::new([
        Point::new(0, 500),
        Point::new(500, 500),
        Point::new(500, 1500),
        Point::new(0, 1500),
    ])
}

struct Rig {
    harness: SensorHarness,
    state: Shared<SensorState>,
    health: HealthTracker,
    ingestion: Ingestion,
    events: UnboundedReceiver<SensorEvent>,
}

fn rig(state: SensorState) -> Rig {
    let (harness, host) = SensorHarness::new();
    let state = new_state(state);
    let health = HealthTracker::new();
    let (ingestion, events) = Ingestion::spawn(link::shared(host), Handoff::new(), state.clone(), health.clone());
    Rig { harness, state, health, ingestion, events }
}

impl Rig {
    /// One frame per period, `count` times.
    async fn stream(&self, targets: &[SimTarget], count: usize) {
        for _ in 0..count {
            self.harness.sensor.send_targets(targets);
            sleep(FRAME_PERIOD).await;
        }
    }

    fn drain(&mut self) -> Vec<SensorEvent> {
        let mut out = Vec::new();
        while let Ok(e) = self.events.try_recv() {
            out.push(e);
        }
        out
    }
}

fn occupancy(events: &[SensorEvent]) -> Vec<(Endpoint, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            SensorEvent::Occupancy { endpoint, occupied } => Some((*endpoint, *occupied)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn person_walks_in_and_out_of_a_zone() {
    let mut s = SensorState::new();
    s.set_zone(0, doorway()).unwrap();
    let mut rig = rig(s);

    let inside = [SimTarget::at(200, 1000)];
    rig.stream(&inside, 3).await;
    let early = rig.drain();
    assert_eq!(early, vec![SensorEvent::TargetCount { count: 1 }]);

    rig.stream(&inside, 5).await;
    assert_eq!(
        occupancy(&rig.drain()),
        vec![(Endpoint::Global, true), (Endpoint::Zone(0), true)]
    );
    assert_eq!(rig.state.lock().occupancy(), [true, true, false, false, false, false]);

    // Default cooldown is zero: the first empty frame clears.
    rig.stream(&[], 1).await;
    let cleared = rig.drain();
    assert_eq!(
        cleared,
        vec![
            SensorEvent::Occupancy { endpoint: Endpoint::Global, occupied: false },
            SensorEvent::Occupancy { endpoint: Endpoint::Zone(0), occupied: false },
            SensorEvent::TargetCount { count: 0 },
        ]
    );
    assert_eq!(rig.health.get_health().transitions, 4);

    rig.ingestion.shutdown();
    rig.ingestion.join().await;
}

#[tokio::test(start_paused = true)]
async fn short_pulse_is_filtered() {
    let mut rig = rig(SensorState::new());

    rig.stream(&[SimTarget::at(0, 900)], 2).await;
    rig.stream(&[], 8).await;

    let events = rig.drain();
    assert!(occupancy(&events).is_empty(), "{events:?}");
    assert_eq!(
        events,
        vec![SensorEvent::TargetCount { count: 1 }, SensorEvent::TargetCount { count: 0 }]
    );
}

#[tokio::test(start_paused = true)]
async fn cooldown_holds_occupancy_through_a_dropout() {
    let mut s = SensorState::new();
    let timing = EndpointTiming {
        delay: Duration::ZERO,
        cooldown: Duration::from_millis(300),
    };
    s.set_endpoint_timing(0, timing).unwrap();
    let mut rig = rig(s);

    let person = [SimTarget::at(-300, 2000)];
    rig.stream(&person, 1).await;
    assert_eq!(occupancy(&rig.drain()), vec![(Endpoint::Global, true)]);

    // 150 ms without a target, then back.
    rig.stream(&[], 3).await;
    rig.stream(&person, 2).await;
    assert!(occupancy(&rig.drain()).is_empty());

    rig.stream(&[], 8).await;
    assert_eq!(occupancy(&rig.drain()), vec![(Endpoint::Global, false)]);
}

#[tokio::test(start_paused = true)]
async fn garbage_on_the_line_does_not_stop_ingestion() {
    let rig = rig(SensorState::new());

    rig.harness.sensor.stream_bytes(vec![0x13; 50]);
    rig.harness
        .sensor
        .stream_bytes(corrupt_footer(data_frame(&[SimTarget::at(0, 700)])));
    rig.stream(&[SimTarget::at(100, 700), SimTarget::at(-100, 1400)], 1).await;

    let report = rig.state.lock().report();
    assert_eq!(report.target_count, 2);
    assert_eq!(report.targets[1].x_mm, -100);

    let health = rig.health.get_health();
    assert_eq!(health.frames_decoded, 1);
    assert!(health.bad_footers >= 1);
    assert!(health.bytes_discarded >= 50);
}

#[tokio::test(start_paused = true)]
async fn disabled_tracking_holds_last_occupancy() {
    let mut s = SensorState::new();
    s.set_endpoint_timing(
        0,
        EndpointTiming { delay: Duration::ZERO, cooldown: Duration::ZERO },
    )
    .unwrap();
    let mut rig = rig(s);

    rig.stream(&[SimTarget::at(0, 1000)], 1).await;
    assert_eq!(occupancy(&rig.drain()), vec![(Endpoint::Global, true)]);

    rig.state.lock().set_enabled(false);
    rig.stream(&[], 4).await;
    assert!(rig.drain().is_empty());
    assert!(rig.state.lock().occupancy()[0]);
    // The raw report still follows the sensor.
    assert_eq!(rig.state.lock().report().target_count, 0);
}

#[tokio::test(start_paused = true)]
async fn detail_publishing_reports_positions() {
    let mut s = SensorState::new();
    s.set_publish_detail(true);
    let mut rig = rig(s);

    rig.stream(&[SimTarget::at(120, 800)], 2).await;
    let targets: Vec<_> = rig
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SensorEvent::Targets { .. }))
        .collect();
    assert_eq!(
        targets,
        vec![SensorEvent::Targets { points: vec![Point::new(120, 800)] }]
    );
}

#[tokio::test(start_paused = true)]
async fn closed_link_ends_the_loop() {
    let rig = rig(SensorState::new());
    rig.harness.sensor.shutdown();

    assert!(
        rig.harness
            .wait_until(|| rig.ingestion.is_finished(), Duration::from_secs(1))
            .await
    );
    assert_eq!(rig.health.get_health().link_status, "closed");
}
