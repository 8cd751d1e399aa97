//! MonitorLoop - sampling and alert orchestration
//!
//! ## Responsibilities
//!
//! - Startup validation (video source and detector must be reachable,
//!   backend connectivity only warns)
//! - Fixed-interval frame sampling, one frame fully processed at a time
//! - Per-frame pipeline: detect -> classify -> persist -> siren -> voice
//! - Graceful drain: an in-flight pass completes before the loop stops
//!
//! Per-frame failures are logged and absorbed. The loop only ever exits
//! through shutdown.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::alert_throttle::{AlertThrottle, ThrottleDecision};
use crate::camera_registry::CameraRegistry;
use crate::config::MonitorConfig;
use crate::detector_client::DetectorClient;
use crate::error::{Error, Result};
use crate::frame_source::{Frame, FrameSource};
use crate::persistence_dispatcher::PersistenceDispatcher;
use crate::siren::Siren;
use crate::violation_policy::{Severity, ViolationAssessment, ViolationPolicy};
use crate::voice_notifier::VoiceNotifier;

/// Pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, startup validation not yet passed
    Initializing,
    /// Sampling frames on the fixed interval
    Running,
    /// Shutdown requested; in-flight pass completing
    Draining,
    /// Loop exited
    Stopped,
}

/// Everything one pipeline pass needs, cloned into the sampling task
#[derive(Clone)]
struct LoopServices {
    config: MonitorConfig,
    policy: ViolationPolicy,
    frame_source: Arc<dyn FrameSource>,
    detector: Arc<DetectorClient>,
    registry: Arc<CameraRegistry>,
    dispatcher: Arc<PersistenceDispatcher>,
    throttle: Arc<AlertThrottle>,
    siren: Arc<Siren>,
    notifier: Arc<VoiceNotifier>,
}

/// Monitor loop instance
pub struct MonitorLoop {
    config: MonitorConfig,
    policy: ViolationPolicy,
    frame_source: Arc<dyn FrameSource>,
    detector: Arc<DetectorClient>,
    registry: Arc<CameraRegistry>,
    dispatcher: Arc<PersistenceDispatcher>,
    throttle: Arc<AlertThrottle>,
    siren: Arc<Siren>,
    notifier: Arc<VoiceNotifier>,
    state: Arc<RwLock<PipelineState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorLoop {
    pub fn new(
        config: MonitorConfig,
        policy: ViolationPolicy,
        frame_source: Arc<dyn FrameSource>,
        detector: Arc<DetectorClient>,
        registry: Arc<CameraRegistry>,
        dispatcher: Arc<PersistenceDispatcher>,
        throttle: Arc<AlertThrottle>,
        siren: Arc<Siren>,
        notifier: Arc<VoiceNotifier>,
    ) -> Self {
        Self {
            config,
            policy,
            frame_source,
            detector,
            registry,
            dispatcher,
            throttle,
            siren,
            notifier,
            state: Arc::new(RwLock::new(PipelineState::Initializing)),
            task: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> PipelineState {
        *self.state.read().await
    }

    /// Validate the environment and start the sampling task.
    ///
    /// Fatal when the video source or the detection service is
    /// unavailable; backend connectivity problems only warn, the pipeline
    /// degrades per frame instead.
    pub async fn start(&self) -> Result<()> {
        {
            let state = self.state.read().await;
            if *state != PipelineState::Initializing {
                tracing::warn!(state = ?*state, "Monitor loop already started");
                return Ok(());
            }
        }

        self.frame_source.probe().await?;

        if !self.detector.health_check().await? {
            return Err(Error::Config(format!(
                "Detection service not healthy at {}",
                self.config.detector.base_url
            )));
        }
        tracing::info!(url = %self.config.detector.base_url, "Detection service healthy");

        match self.registry.probe().await {
            Ok(()) => tracing::info!("Backend connectivity OK"),
            Err(e) => {
                tracing::warn!(error = %e, "Backend connectivity check failed, continuing");
            }
        }

        {
            let mut state = self.state.write().await;
            // Re-check under the write lock: a concurrent start() or
            // shutdown() may have advanced the state while the probes ran
            if *state != PipelineState::Initializing {
                tracing::warn!(state = ?*state, "Monitor loop already started");
                return Ok(());
            }
            *state = PipelineState::Running;

            let services = self.services();
            let loop_state = self.state.clone();
            let handle = tokio::spawn(async move {
                Self::run_loop(services, loop_state).await;
            });
            *self.task.lock().await = Some(handle);
        }

        tracing::info!(
            zone = %self.config.zone,
            interval_ms = self.config.sample_interval.as_millis() as u64,
            source = %self.frame_source.describe(),
            "Monitor loop running"
        );

        Ok(())
    }

    /// Request a drain and wait for the loop to stop. Idempotent.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write().await;
            match *state {
                PipelineState::Running => {
                    *state = PipelineState::Draining;
                    tracing::info!("Draining monitor loop");
                }
                PipelineState::Initializing => {
                    *state = PipelineState::Stopped;
                    return;
                }
                PipelineState::Draining | PipelineState::Stopped => {}
            }
        }

        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }

    fn services(&self) -> LoopServices {
        LoopServices {
            config: self.config.clone(),
            policy: self.policy.clone(),
            frame_source: self.frame_source.clone(),
            detector: self.detector.clone(),
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            throttle: self.throttle.clone(),
            siren: self.siren.clone(),
            notifier: self.notifier.clone(),
        }
    }

    async fn run_loop(services: LoopServices, state: Arc<RwLock<PipelineState>>) {
        let mut ticker = interval(services.config.sample_interval);
        // A slow pass delays the next sample instead of bursting to catch
        // up; no frame queue ever accumulates
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seq: u64 = 0;

        loop {
            ticker.tick().await;

            if *state.read().await != PipelineState::Running {
                break;
            }

            match services.frame_source.next_frame().await {
                Ok(Some(data)) => {
                    seq += 1;
                    let frame = Frame {
                        seq,
                        data,
                        captured_at: Utc::now(),
                    };
                    Self::process_frame(&services, frame).await;
                }
                Ok(None) => {
                    tracing::warn!("Frame acquisition failed, retrying on next tick");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Frame acquisition error, retrying on next tick");
                }
            }
        }

        *state.write().await = PipelineState::Stopped;
        tracing::info!("Monitor loop stopped");
    }

    /// Run one frame through the pipeline. Every failure past acquisition
    /// is logged and absorbed here.
    async fn process_frame(services: &LoopServices, frame: Frame) {
        let detections = match services.detector.detect(&frame).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(seq = frame.seq, error = %e, "Detection failed, skipping frame");
                return;
            }
        };

        let assessment = services.policy.assess(&detections);

        if services.config.status_log_every > 0
            && frame.seq % services.config.status_log_every == 0
        {
            tracing::debug!(
                seq = frame.seq,
                detections = ?services.policy.retained_labels(&detections),
                "Frame status"
            );
        }

        if assessment.has_violation {
            Self::handle_violation(services, &frame, &assessment).await;
        } else if let Some(ref text) = assessment.informational {
            tracing::info!(seq = frame.seq, "{}", text);
        }
    }

    async fn handle_violation(
        services: &LoopServices,
        frame: &Frame,
        assessment: &ViolationAssessment,
    ) {
        let summary = assessment.summary_text();
        let zone = services.config.zone.as_str();

        tracing::warn!(
            zone = %zone,
            seq = frame.seq,
            violations = %summary,
            "Safety violation detected"
        );

        let camera_id = match services.registry.resolve(zone).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    zone = %zone,
                    error = %e,
                    "Camera resolution failed, using zone as pseudo-id"
                );
                zone.to_string()
            }
        };

        let outcome = services
            .dispatcher
            .persist(
                &frame.data,
                &camera_id,
                &summary,
                Severity::High,
                assessment.max_confidence(),
            )
            .await;
        if outcome.stored {
            tracing::info!(
                camera_id = %camera_id,
                path = ?outcome.path,
                image_url = ?outcome.image_url,
                "Detection record stored"
            );
        } else {
            tracing::error!(
                camera_id = %camera_id,
                detail = %outcome.detail,
                "Detection record lost, both persistence paths failed"
            );
        }

        // The siren is unconditional; only the voice channel is throttled
        services.siren.sound().await;

        let number = match services.config.supervisors.get(zone) {
            Some(n) => n,
            None => {
                tracing::debug!(zone = %zone, "No supervisor number configured, skipping voice alert");
                return;
            }
        };

        match services.throttle.try_acquire(zone).await {
            ThrottleDecision::Dispatch => {
                let message = format!(
                    "Urgent safety violation detected in {}. {}. Please respond immediately.",
                    zone, summary
                );
                if services.notifier.is_enabled() {
                    match services.notifier.call(&message, number).await {
                        Ok(call_id) => {
                            tracing::info!(
                                zone = %zone,
                                call_id = %call_id,
                                "Supervisor voice alert placed"
                            );
                        }
                        Err(e) => {
                            // Cooldown stays armed; a degraded channel
                            // must not turn into an alert storm
                            tracing::warn!(zone = %zone, error = %e, "Voice alert failed");
                        }
                    }
                } else {
                    tracing::info!(
                        zone = %zone,
                        message = %message,
                        "Voice notifications disabled, supervisor call skipped"
                    );
                }
            }
            ThrottleDecision::Suppressed { remaining } => {
                tracing::debug!(
                    zone = %zone,
                    remaining_secs = remaining.as_secs(),
                    "Voice alert suppressed (cooldown active)"
                );
            }
        }
    }
}
