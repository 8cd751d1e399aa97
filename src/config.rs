//! Runtime configuration
//!
//! Everything comes from environment variables with hard defaults so the
//! monitor can boot on a bare deployment. `dotenvy` is loaded in `main`
//! before this is read.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::violation_policy::{default_rules, ViolationRule};

/// Video source settings
#[derive(Debug, Clone)]
pub struct VideoSourceConfig {
    /// RTSP stream URL (primary capture path)
    pub rtsp_url: Option<String>,
    /// HTTP snapshot URL (fallback capture path)
    pub snapshot_url: Option<String>,
    /// Per-capture timeout (ffmpeg child / snapshot GET)
    pub capture_timeout: Duration,
}

/// Detection model service settings
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Base URL of the detection service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Hosted backend settings (camera registry, storage, detection records)
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend base URL
    pub base_url: String,
    /// Anon/service key sent as `apikey` and bearer token
    pub anon_key: String,
    /// Ingest function URL (primary persistence path); absent = direct path
    pub ingest_fn_url: Option<String>,
    /// Storage bucket for detection images
    pub storage_bucket: String,
    /// Image reference used when the storage upload fails
    pub placeholder_image_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Voice provider credentials (all three must be set to enable calls)
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    /// Provider API base; overridable for tests
    pub api_base: String,
}

/// Classifier settings
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Minimum confidence for a detection to count
    pub confidence_threshold: f32,
    /// Label -> violation rule table, in evaluation order
    pub rules: Vec<ViolationRule>,
}

/// Full monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Zone this process watches (one source per process)
    pub zone: String,
    /// Fixed sampling interval
    pub sample_interval: Duration,
    /// Emit a detection status line every N frames
    pub status_log_every: u64,
    /// Per-zone voice alert cooldown window
    pub alert_cooldown: Duration,
    /// Zone -> supervisor phone number
    pub supervisors: HashMap<String, String>,
    /// Local siren on/off (headless deployments turn it off)
    pub siren_enabled: bool,
    pub video: VideoSourceConfig,
    pub detector: DetectorConfig,
    pub backend: BackendConfig,
    pub classifier: ClassifierConfig,
    pub voice: Option<VoiceConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            zone: std::env::var("CAMERA_ZONE").unwrap_or_else(|_| "Zone A".to_string()),
            sample_interval: Duration::from_secs(
                std::env::var("DETECTION_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1),
            ),
            status_log_every: std::env::var("STATUS_LOG_EVERY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            alert_cooldown: Duration::from_secs(
                std::env::var("ALERT_COOLDOWN_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            supervisors: std::env::var("SUPERVISOR_PHONES")
                .ok()
                .and_then(|raw| match serde_json::from_str(&raw) {
                    Ok(map) => Some(map),
                    Err(e) => {
                        tracing::warn!(error = %e, "Invalid SUPERVISOR_PHONES JSON, ignoring");
                        None
                    }
                })
                .unwrap_or_default(),
            siren_enabled: std::env::var("SIREN_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            video: VideoSourceConfig {
                rtsp_url: std::env::var("RTSP_URL").ok(),
                snapshot_url: std::env::var("SNAPSHOT_URL").ok(),
                capture_timeout: Duration::from_secs(
                    std::env::var("CAPTURE_TIMEOUT_SECS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(10),
                ),
            },
            detector: DetectorConfig {
                base_url: std::env::var("DETECTOR_URL")
                    .unwrap_or_else(|_| "http://localhost:9000".to_string()),
                timeout: Duration::from_secs(
                    std::env::var("DETECTOR_TIMEOUT_SECS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(30),
                ),
            },
            backend: BackendConfig {
                base_url: std::env::var("SUPABASE_URL").unwrap_or_default(),
                anon_key: std::env::var("SUPABASE_ANON_KEY").unwrap_or_default(),
                ingest_fn_url: std::env::var("SUPABASE_FN_URL").ok(),
                storage_bucket: std::env::var("STORAGE_BUCKET")
                    .unwrap_or_else(|_| "detection-images".to_string()),
                placeholder_image_url: std::env::var("PLACEHOLDER_IMAGE_URL").unwrap_or_else(
                    |_| "https://via.placeholder.com/640x480?text=Detection+Image".to_string(),
                ),
                timeout: Duration::from_secs(
                    std::env::var("SUPABASE_TIMEOUT_SECS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(15),
                ),
            },
            classifier: ClassifierConfig {
                confidence_threshold: std::env::var("MIN_CONFIDENCE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.5),
                rules: std::env::var("VIOLATION_RULES")
                    .ok()
                    .and_then(|raw| match serde_json::from_str(&raw) {
                        Ok(rules) => Some(rules),
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                "Invalid VIOLATION_RULES JSON, using built-in rule table"
                            );
                            None
                        }
                    })
                    .unwrap_or_else(default_rules),
            },
            voice: match (
                std::env::var("TWILIO_ACCOUNT_SID").ok(),
                std::env::var("TWILIO_AUTH_TOKEN").ok(),
                std::env::var("TWILIO_FROM_NUMBER").ok(),
            ) {
                (Some(account_sid), Some(auth_token), Some(from_number)) => Some(VoiceConfig {
                    account_sid,
                    auth_token,
                    from_number,
                    api_base: std::env::var("TWILIO_API_BASE")
                        .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
                }),
                _ => None,
            },
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Startup configuration check. Missing video source or detector URL is
    /// fatal; everything else degrades at runtime and only warns here.
    pub fn validate(&self) -> Result<()> {
        if self.video.rtsp_url.is_none() && self.video.snapshot_url.is_none() {
            return Err(Error::Config(
                "No video source configured (set RTSP_URL or SNAPSHOT_URL)".to_string(),
            ));
        }
        if self.detector.base_url.is_empty() {
            return Err(Error::Config("DETECTOR_URL is empty".to_string()));
        }

        if self.backend.base_url.is_empty() || self.backend.anon_key.is_empty() {
            tracing::warn!(
                "Backend URL/key not configured; detection records will not be persisted"
            );
        }
        if self.backend.ingest_fn_url.is_none() {
            tracing::info!("Ingest function not configured; using direct persistence path");
        }
        if self.voice.is_none() {
            tracing::info!("Voice provider credentials not set; voice notifications disabled");
        }
        if self.supervisors.is_empty() {
            tracing::warn!("No supervisor phone numbers configured (SUPERVISOR_PHONES)");
        } else if !self.supervisors.contains_key(&self.zone) {
            tracing::warn!(zone = %self.zone, "No supervisor phone number for this zone");
        }

        Ok(())
    }
}
