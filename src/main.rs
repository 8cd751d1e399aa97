//! PPE Monitor
//!
//! Main entry point for the monitor process. One process watches one zone.

use ppe_monitor::{
    alert_throttle::AlertThrottle,
    camera_registry::CameraRegistry,
    config::MonitorConfig,
    detector_client::DetectorClient,
    frame_source::{FrameSource, RtspFrameSource},
    monitor_loop::MonitorLoop,
    persistence_dispatcher::PersistenceDispatcher,
    siren::Siren,
    violation_policy::ViolationPolicy,
    voice_notifier::VoiceNotifier,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ppe_monitor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PPE Monitor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = MonitorConfig::from_env();
    config.validate()?;
    tracing::info!(
        zone = %config.zone,
        detector_url = %config.detector.base_url,
        backend_url = %config.backend.base_url,
        interval_secs = config.sample_interval.as_secs(),
        "Configuration loaded"
    );

    // Initialize components
    let frame_source: Arc<dyn FrameSource> = Arc::new(RtspFrameSource::new(&config.video));
    tracing::info!(source = %frame_source.describe(), "Frame source initialized");

    let detector = Arc::new(DetectorClient::new(
        config.detector.base_url.clone(),
        config.detector.timeout,
    ));
    let registry = Arc::new(CameraRegistry::new(config.backend.clone()));
    let dispatcher = Arc::new(PersistenceDispatcher::new(config.backend.clone()));
    tracing::info!("Backend adapters initialized (CameraRegistry, PersistenceDispatcher)");

    let throttle = Arc::new(AlertThrottle::new(config.alert_cooldown));
    let siren = Arc::new(Siren::new(config.siren_enabled));
    let notifier = Arc::new(VoiceNotifier::new(config.voice.clone()));
    tracing::info!(
        siren_enabled = siren.is_enabled(),
        voice_enabled = notifier.is_enabled(),
        cooldown_secs = config.alert_cooldown.as_secs(),
        "Alert channels initialized"
    );

    let policy = ViolationPolicy::new(
        config.classifier.confidence_threshold,
        config.classifier.rules.clone(),
    );

    let monitor = MonitorLoop::new(
        config,
        policy,
        frame_source,
        detector,
        registry,
        dispatcher,
        throttle,
        siren,
        notifier,
    );
    monitor.start().await?;

    // Run until interrupted, then drain the in-flight frame
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    monitor.shutdown().await;
    tracing::info!("PPE Monitor stopped");

    Ok(())
}
