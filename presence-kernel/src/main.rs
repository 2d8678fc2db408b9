/**
 * PRESENCE KERNEL - Daemon entry point
 *
 * ROLE: wire everything together. Load config, open the sensor link, start
 * the ingestion loop, push the hardware settings, log every occupancy event
 * and serve the HTTP API.
 *
 * ENV:
 * - PRESENCE_CONFIG   config file path (default presence.yaml)
 * - PRESENCE_API_KEY  enables the x-api-key guard
 * - RUST_LOG          log filter (default presence_kernel=info)
 */

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use presence_kernel::config::{self, PresenceConfig, SensorConf};
use presence_kernel::http::{self, AppState};
use presence_kernel::models::SensorEvent;
use presence_kernel::{link, new_state, CommandChannel, Handoff, HealthTracker, Ingestion, SensorState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("presence_kernel=info")),
        )
        .init();

    let cfg = config::load_config().await;
    let sensor = new_state(seed_state(&cfg));
    let health = HealthTracker::new();

    let link = link::open(&cfg.link).await.context("opening sensor link")?;
    let handoff = Handoff::new();
    let (ingestion, events) = Ingestion::spawn(link.clone(), handoff.clone(), sensor.clone(), health.clone());
    tokio::spawn(report_events(events));

    let commands = Arc::new(CommandChannel::new(
        link,
        handoff,
        cfg.command.into(),
        health.clone(),
    ));
    if cfg.sensor.apply_on_start {
        tokio::spawn(apply_sensor_config(commands.clone(), cfg.sensor));
    }

    let app_state = AppState {
        sensor,
        commands,
        health_tracker: health,
        api_key: std::env::var("PRESENCE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Arc::from),
    };
    if app_state.api_key.is_none() {
        warn!("PRESENCE_API_KEY not set, HTTP API is open");
    }

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("binding {}", cfg.http.bind))?;
    info!("listening on http://{}", cfg.http.bind);

    axum::serve(listener, http::build_router(app_state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http server")?;

    ingestion.shutdown();
    ingestion.join().await;
    Ok(())
}

/// Initial zones, policy and timings. Invalid entries are skipped.
fn seed_state(cfg: &PresenceConfig) -> SensorState {
    let mut state = SensorState::new();
    state.set_policy(cfg.tracking);

    if let Err(e) = state.set_zones(&cfg.zones) {
        warn!(error = %e, "zone set rejected, loading zones one by one");
        for (i, zone) in cfg.zones.iter().enumerate() {
            if let Err(e) = state.set_zone(i, *zone) {
                warn!(index = i, error = %e, "skipping zone");
            }
        }
    }
    for (i, timing) in cfg.endpoints.iter().enumerate() {
        if let Err(e) = state.set_endpoint_timing(i, *timing) {
            warn!(error = %e, "skipping endpoint timing");
        }
    }
    info!(
        zones = state.zones().iter().filter(|z| z.enabled).count(),
        mode = ?state.policy().mode,
        "initial state loaded"
    );
    state
}

async fn apply_sensor_config(commands: Arc<CommandChannel>, sensor: SensorConf) {
    tokio::time::sleep(Duration::from_millis(sensor.boot_delay_ms)).await;
    // Bluetooth is on after a factory reset; only switching it off is needed.
    if !sensor.bluetooth {
        if let Err(e) = commands.set_bluetooth(false).await {
            warn!(error = %e, "startup: could not switch sensor bluetooth off");
        }
    }
    match commands.apply_distance_angle(sensor.range).await {
        Ok(_) => info!(range = ?sensor.range, "startup: sensor range applied"),
        Err(e) => warn!(error = %e, "startup: could not apply sensor range"),
    }
}

/// Logs each event with a timestamp. Stands in for an external reporter.
async fn report_events(mut events: mpsc::UnboundedReceiver<SensorEvent>) {
    while let Some(event) = events.recv().await {
        let at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        match &event {
            SensorEvent::Occupancy { endpoint, occupied } => {
                info!(%at, endpoint = %endpoint, occupied, "occupancy");
            }
            SensorEvent::TargetCount { count } => info!(%at, count, "target count"),
            SensorEvent::Targets { points } => {
                let coords = points
                    .iter()
                    .map(|p| format!("{},{}", p.x_mm, p.y_mm))
                    .collect::<Vec<_>>()
                    .join(";");
                info!(%at, %coords, "targets");
            }
        }
    }
}
