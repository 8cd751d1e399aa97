//! DetectorClient - detection model service adapter
//!
//! ## Responsibilities
//!
//! - Send one inference request per sampled frame
//! - Parse the detection list
//! - Surface failures as non-fatal detection errors
//!
//! Retry policy lives with the caller and is deliberately absent here: the
//! sampling loop skips a failed frame and moves on.

use crate::error::{snippet, Error, Result};
use crate::frame_source::Frame;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Detection service client
pub struct DetectorClient {
    client: reqwest::Client,
    base_url: String,
}

/// One raw model detection. Labels pass through uninterpreted; the
/// violation policy owns the vocabulary.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
}

/// Detection service response body
#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

impl DetectorClient {
    /// Create new detector client
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Check detector health
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Run the model over one frame. One attempt, no retry.
    pub async fn detect(&self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let url = format!("{}/v1/detect", self.base_url);

        let form = Form::new()
            .part(
                "image",
                Part::bytes(frame.data.clone())
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("frame_seq", frame.seq.to_string())
            .text("captured_at", frame.captured_at.to_rfc3339());

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Detection(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Detection(format!(
                "detector returned {}: {}",
                status,
                snippet(&body)
            )));
        }

        let result: DetectResponse = resp
            .json()
            .await
            .map_err(|e| Error::Detection(format!("invalid response body: {}", e)))?;
        Ok(result.detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn frame() -> Frame {
        Frame {
            seq: 1,
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
            captured_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_detect_parses_detections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "detections": [
                    {"label": "NO-Hardhat", "confidence": 0.91},
                    {"label": "Person", "confidence": 0.88}
                ]
            })))
            .mount(&server)
            .await;

        let client = DetectorClient::new(server.uri(), Duration::from_secs(5));
        let detections = client.detect(&frame()).await.unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "NO-Hardhat");
        assert!((detections[0].confidence - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_detect_missing_detections_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = DetectorClient::new(server.uri(), Duration::from_secs(5));
        let detections = client.detect(&frame()).await.unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn test_detect_maps_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/detect"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let client = DetectorClient::new(server.uri(), Duration::from_secs(5));
        let err = client.detect(&frame()).await.unwrap_err();
        match err {
            Error::Detection(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("model crashed"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = DetectorClient::new(server.uri(), Duration::from_secs(5));
        assert!(client.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let client = DetectorClient::new("http://127.0.0.1:9".to_string(), Duration::from_secs(1));
        assert!(!client.health_check().await.unwrap());
    }
}
