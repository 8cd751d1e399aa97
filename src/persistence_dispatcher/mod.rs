//! Persistence dispatcher - dual-path detection record delivery
//!
//! ## Responsibilities
//!
//! - Primary path: hand the frame and camera id to the backend ingest
//!   function, which persists everything server-side
//! - Fallback path: upload the image to storage (placeholder reference on
//!   failure), then insert the detection record directly
//! - Report the outcome instead of raising: the caller logs a lost record,
//!   the loop never dies over persistence
//!
//! At-most-once delivery. One fallback hop, no retries, no queue.

use base64::Engine;
use serde::Serialize;

use crate::config::BackendConfig;
use crate::error::{snippet, Error, Result};
use crate::violation_policy::Severity;

/// Which path stored the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistPath {
    IngestFunction,
    DirectInsert,
}

/// Outcome of one persistence attempt. `stored == false` means the record
/// is lost; `detail` carries the diagnostic for the log line.
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub stored: bool,
    pub path: Option<PersistPath>,
    pub image_url: Option<String>,
    pub detail: String,
}

/// Review status stamped on inserted records. This process only writes
/// fresh rows; later review transitions live in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    New,
}

/// Detection record as the backend stores it
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRecord {
    pub camera_id: String,
    pub violation_type: String,
    /// Integer percentage
    pub confidence: u8,
    pub severity: Severity,
    pub status: RecordStatus,
    pub image_url: String,
}

/// Dispatcher for persisted detection records
pub struct PersistenceDispatcher {
    client: reqwest::Client,
    backend: BackendConfig,
}

impl PersistenceDispatcher {
    pub fn new(backend: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(backend.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, backend }
    }

    /// Persist one violating frame. Never returns an error; the outcome
    /// says whether the record made it and through which path.
    pub async fn persist(
        &self,
        image: &[u8],
        camera_id: &str,
        violation_type: &str,
        severity: Severity,
        confidence: f32,
    ) -> PersistOutcome {
        if let Some(fn_url) = self.backend.ingest_fn_url.clone() {
            match self.send_to_ingest_fn(&fn_url, image, camera_id).await {
                Ok(()) => {
                    return PersistOutcome {
                        stored: true,
                        path: Some(PersistPath::IngestFunction),
                        image_url: None,
                        detail: "ingest function accepted".to_string(),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Primary persistence path failed, falling back");
                }
            }
        }

        // Fallback: the image reference degrades to a placeholder rather
        // than blocking the record insert
        let image_url = match self.upload_image(image).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Image upload failed, using placeholder reference");
                self.backend.placeholder_image_url.clone()
            }
        };

        let record = DetectionRecord {
            camera_id: camera_id.to_string(),
            violation_type: violation_type.to_string(),
            confidence: (confidence * 100.0).round() as u8,
            severity,
            status: RecordStatus::New,
            image_url: image_url.clone(),
        };

        match self.insert_record(&record).await {
            Ok(Some(row_id)) => PersistOutcome {
                stored: true,
                path: Some(PersistPath::DirectInsert),
                image_url: Some(image_url),
                detail: format!("record {} created", row_id),
            },
            Ok(None) => PersistOutcome {
                stored: true,
                path: Some(PersistPath::DirectInsert),
                image_url: Some(image_url),
                detail: "record created".to_string(),
            },
            Err(e) => PersistOutcome {
                stored: false,
                path: None,
                image_url: Some(image_url),
                detail: e.to_string(),
            },
        }
    }

    async fn send_to_ingest_fn(&self, fn_url: &str, image: &[u8], camera_id: &str) -> Result<()> {
        // The ingest function expects the browser-style data URL form
        let image_base64 = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image)
        );

        let resp = self
            .client
            .post(fn_url)
            .bearer_auth(&self.backend.anon_key)
            .json(&serde_json::json!({
                "imageBase64": image_base64,
                "cameraId": camera_id,
            }))
            .send()
            .await
            .map_err(|e| Error::PersistencePrimary(format!("ingest function unreachable: {}", e)))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(Error::PersistencePrimary(format!(
                "ingest function returned {}: {}",
                status,
                snippet(&body)
            )))
        }
    }

    /// Upload the JPEG under a fresh unique name; returns the public
    /// reference
    async fn upload_image(&self, image: &[u8]) -> Result<String> {
        let object_path = format!("detections/{}.jpg", uuid::Uuid::new_v4());
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.backend.base_url, self.backend.storage_bucket, object_path
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.backend.anon_key)
            .header("Content-Type", "image/jpeg")
            .header("x-upsert", "true")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| Error::PersistenceFallback(format!("storage upload failed: {}", e)))?;

        let status = resp.status();
        if status.is_success() {
            Ok(format!(
                "{}/storage/v1/object/public/{}/{}",
                self.backend.base_url, self.backend.storage_bucket, object_path
            ))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(Error::PersistenceFallback(format!(
                "storage upload returned {}: {}",
                status,
                snippet(&body)
            )))
        }
    }

    async fn insert_record(&self, record: &DetectionRecord) -> Result<Option<String>> {
        let url = format!("{}/rest/v1/detections", self.backend.base_url);

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.backend.anon_key)
            .bearer_auth(&self.backend.anon_key)
            .header("Prefer", "return=representation")
            .json(record)
            .send()
            .await
            .map_err(|e| Error::PersistenceFallback(format!("record insert failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::PersistenceFallback(format!(
                "record insert returned {}: {}",
                status,
                snippet(&body)
            )));
        }

        let rows: Vec<serde_json::Value> = resp.json().await.unwrap_or_default();
        Ok(rows.first().and_then(row_id))
    }
}

/// Backend ids may arrive as strings or numbers depending on schema
fn row_id(row: &serde_json::Value) -> Option<String> {
    match row.get("id") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
