//! Runs a two-stop patrol on the simulated camera and prints where it is.
//!
//! `RUST_LOG=ptz_tour_rs=debug cargo run --example tour_patrol`

use ptz_tour_rs::{
    DeviceSessionKey, Motion, NewTour, PresetTours, Presets, SimulatedConnector, TourConfig,
    TourOrchestrator, TourStep,
};
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("ptz_tour_rs=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub).expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = TourConfig::from_json(r#"{ "stop_join_timeout_ms": 2000 }"#)?;
    let orch = TourOrchestrator::new(Arc::new(SimulatedConnector)).with_config(config);
    let key = DeviceSessionKey::new("sim://lobby", "demo");

    for preset in orch.get_presets(&key, None).await? {
        info!("Preset {} '{}' at {:?}", preset.token, preset.name, preset.position);
    }

    let token = orch
        .create_tour(
            &key,
            NewTour {
                name: Some("Lobby patrol".into()),
                steps: vec![
                    TourStep::new("preset_2", 0.5, 2),
                    TourStep::new("preset_3", 0.8, 2),
                ],
                ..Default::default()
            },
        )
        .await?;

    let reply = orch.operate_tour(&key, &token, "start").await?;
    info!("{}", reply.message);

    for _ in 0..20 {
        sleep(Duration::from_millis(500)).await;
        let status = orch.get_status(&key, None).await?;
        info!(
            "pan={:+.2} tilt={:+.2} zoom={:.2} moving={}",
            status.position.pan, status.position.tilt, status.position.zoom, status.moving
        );
    }

    let reply = orch.operate_tour(&key, &token, "stop").await?;
    info!("{}", reply.message);
    orch.delete_tour(&key, &token).await?;
    Ok(())
}
