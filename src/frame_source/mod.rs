//! Frame source - video source adapter
//!
//! ## Responsibilities
//!
//! - Supply one JPEG frame per sampling tick (RTSP via ffmpeg, with an
//!   optional HTTP snapshot fallback)
//! - Report transient read failures as `Ok(None)` so the loop retries
//! - Startup probe (ffmpeg present, source reachable)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::process::Command;

use crate::config::VideoSourceConfig;
use crate::error::{Error, Result};

/// One sampled frame. `seq` is assigned by the monitor loop; a frame is
/// dropped after a single pipeline pass.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    /// JPEG bytes
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Video source abstraction.
///
/// `next_frame` returning `Ok(None)` means a transient read failure; the
/// source is still considered live and the caller retries on its own
/// cadence. Hard availability errors belong to `probe` at startup.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grab the next frame, `None` on a transient failure
    async fn next_frame(&self) -> Result<Option<Vec<u8>>>;

    /// Startup availability check; an error here aborts the monitor
    async fn probe(&self) -> Result<()>;

    /// Source description for logs
    fn describe(&self) -> String;
}

/// RTSP source captured one frame at a time through ffmpeg, with an
/// optional HTTP snapshot endpoint as fallback
pub struct RtspFrameSource {
    client: reqwest::Client,
    rtsp_url: Option<String>,
    snapshot_url: Option<String>,
    capture_timeout: Duration,
}

impl RtspFrameSource {
    pub fn new(config: &VideoSourceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.capture_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            rtsp_url: config.rtsp_url.clone(),
            snapshot_url: config.snapshot_url.clone(),
            capture_timeout: config.capture_timeout,
        }
    }

    /// Capture one frame from the RTSP stream using ffmpeg.
    ///
    /// kill_on_drop(true) so a fired timeout drops the Child and SIGKILLs
    /// the ffmpeg process; unresponsive cameras must not accumulate
    /// zombies.
    async fn capture_rtsp(&self, rtsp_url: &str) -> Result<Vec<u8>> {
        use std::process::Stdio;

        let child = Command::new("ffmpeg")
            .args([
                "-rtsp_transport",
                "tcp",
                "-i",
                rtsp_url,
                "-frames:v",
                "1",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-loglevel",
                "error",
                "-y",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Acquisition(format!("ffmpeg spawn failed: {}", e)))?;

        match tokio::time::timeout(self.capture_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Acquisition(format!(
                        "ffmpeg failed: {}",
                        stderr.trim()
                    )));
                }

                if output.stdout.is_empty() {
                    return Err(Error::Acquisition(
                        "ffmpeg returned empty output".to_string(),
                    ));
                }

                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::Acquisition(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    timeout_sec = self.capture_timeout.as_secs(),
                    rtsp_url = %rtsp_url,
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                Err(Error::Acquisition(format!(
                    "ffmpeg timeout ({}s)",
                    self.capture_timeout.as_secs()
                )))
            }
        }
    }

    /// Capture via HTTP snapshot endpoint (fallback)
    async fn capture_http(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Acquisition(format!(
                "Snapshot HTTP error: {}",
                resp.status()
            )));
        }

        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FrameSource for RtspFrameSource {
    async fn next_frame(&self) -> Result<Option<Vec<u8>>> {
        if let Some(ref url) = self.rtsp_url {
            match self.capture_rtsp(url).await {
                Ok(data) => return Ok(Some(data)),
                Err(e) => {
                    tracing::warn!(error = %e, "RTSP capture failed");
                }
            }
        }

        if let Some(ref url) = self.snapshot_url {
            match self.capture_http(url).await {
                Ok(data) => return Ok(Some(data)),
                Err(e) => {
                    tracing::warn!(error = %e, "HTTP snapshot capture failed");
                }
            }
        }

        Ok(None)
    }

    async fn probe(&self) -> Result<()> {
        if self.rtsp_url.is_some() {
            let version = check_ffmpeg().await?;
            tracing::info!(version = %version, "ffmpeg available");
        }

        match self.next_frame().await? {
            Some(data) => {
                tracing::info!(
                    bytes = data.len(),
                    source = %self.describe(),
                    "Video source probe OK"
                );
                Ok(())
            }
            None => Err(Error::Config(format!(
                "Video source unavailable: {}",
                self.describe()
            ))),
        }
    }

    fn describe(&self) -> String {
        match (&self.rtsp_url, &self.snapshot_url) {
            (Some(rtsp), Some(snap)) => format!("rtsp {} (snapshot fallback {})", rtsp, snap),
            (Some(rtsp), None) => format!("rtsp {}", rtsp),
            (None, Some(snap)) => format!("snapshot {}", snap),
            (None, None) => "unconfigured".to_string(),
        }
    }
}

/// Check that ffmpeg is available; returns the version line
pub async fn check_ffmpeg() -> Result<String> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
        .map_err(|e| Error::Config(format!("ffmpeg not found: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Config("ffmpeg version check failed".to_string()));
    }

    let version = String::from_utf8_lossy(&output.stdout);
    let first_line = version.lines().next().unwrap_or("unknown");
    Ok(first_line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(rtsp: Option<String>, snapshot: Option<String>) -> RtspFrameSource {
        RtspFrameSource::new(&VideoSourceConfig {
            rtsp_url: rtsp,
            snapshot_url: snapshot,
            capture_timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn test_unconfigured_source_yields_none() {
        let src = source(None, None);
        assert!(src.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_capture() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshot.jpg"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xD9]),
            )
            .mount(&server)
            .await;

        let src = source(None, Some(format!("{}/snapshot.jpg", server.uri())));
        let frame = src.next_frame().await.unwrap();
        assert_eq!(frame, Some(vec![0xFF, 0xD8, 0xFF, 0xD9]));
    }

    #[tokio::test]
    async fn test_snapshot_http_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/snapshot.jpg"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let src = source(None, Some(format!("{}/snapshot.jpg", server.uri())));
        assert!(src.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_probe_fails_when_source_unavailable() {
        // Snapshot-only source pointed at a closed port
        let src = source(None, Some("http://127.0.0.1:9/snapshot.jpg".to_string()));
        let err = src.probe().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
