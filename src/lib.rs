//! PPE Monitor Library
//!
//! Real-time PPE violation detection and alerting for workplace CCTV.
//!
//! ## Architecture (9 Components)
//!
//! 1. FrameSource - Frame capture (RTSP primary, HTTP snapshot fallback)
//! 2. DetectorClient - Detection model service adapter
//! 3. ViolationPolicy - Detection to violation classification
//! 4. CameraRegistry - Zone to backend camera id resolution with cache
//! 5. PersistenceDispatcher - Two-path detection record persistence
//! 6. AlertThrottle - Per-zone voice alert cooldown
//! 7. Siren - Local audible alarm
//! 8. VoiceNotifier - Supervisor voice calls
//! 9. MonitorLoop - Sampling and alert orchestration
//!
//! ## Design Principles
//!
//! - One zone per process; the loop never dies over a single frame
//! - Alerting degrades channel by channel instead of failing the pipeline
//! - External services are adapters behind small structs, mocked in tests

pub mod config;
pub mod frame_source;
pub mod detector_client;
pub mod violation_policy;
pub mod camera_registry;
pub mod persistence_dispatcher;
pub mod alert_throttle;
pub mod siren;
pub mod voice_notifier;
pub mod monitor_loop;
pub mod error;

pub use error::{Error, Result};
