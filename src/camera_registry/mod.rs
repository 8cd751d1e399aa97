//! Camera registry - zone to backend camera identity resolution
//!
//! ## Responsibilities
//!
//! - Resolve the monitored zone to a backend camera id (lookup, then create)
//! - Cache the id for the process lifetime
//! - Serialize resolution so concurrent callers cannot double-create
//! - Treat a create conflict as "already exists" and re-look the row up

use std::collections::HashMap;

use tokio::sync::{Mutex, RwLock};

use crate::config::BackendConfig;
use crate::error::{snippet, Error, Result};

/// Camera registry backed by the hosted REST surface
pub struct CameraRegistry {
    client: reqwest::Client,
    backend: BackendConfig,
    /// zone -> backend camera id, kept for the process lifetime
    cache: RwLock<HashMap<String, String>>,
    /// Serializes lookup-then-create; the winner fills the cache
    resolve_lock: Mutex<()>,
}

enum CreateOutcome {
    Created(String),
    /// Uniqueness conflict or representation withheld: the row exists,
    /// re-lookup to learn its id
    Exists,
}

impl CameraRegistry {
    pub fn new(backend: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(backend.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            backend,
            cache: RwLock::new(HashMap::new()),
            resolve_lock: Mutex::new(()),
        }
    }

    fn cameras_url(&self) -> String {
        format!("{}/rest/v1/cameras", self.backend.base_url)
    }

    /// Resolve the backend camera id for a zone.
    ///
    /// The first success is cached; per-frame callers pay one map read.
    /// On error the caller degrades to the raw zone string as pseudo-id.
    pub async fn resolve(&self, zone: &str) -> Result<String> {
        if let Some(id) = self.cache.read().await.get(zone) {
            return Ok(id.clone());
        }

        let _guard = self.resolve_lock.lock().await;
        // Re-check under the guard: a concurrent caller may have resolved
        // while we waited
        if let Some(id) = self.cache.read().await.get(zone) {
            return Ok(id.clone());
        }

        let id = self.lookup_or_create(zone).await?;
        self.cache
            .write()
            .await
            .insert(zone.to_string(), id.clone());
        tracing::info!(zone = %zone, camera_id = %id, "Camera identity resolved");
        Ok(id)
    }

    /// Lightweight backend reachability check used at startup. The caller
    /// logs failures; they are never fatal.
    pub async fn probe(&self) -> Result<()> {
        let resp = self
            .client
            .get(self.cameras_url())
            .query(&[("limit", "1")])
            .header("apikey", &self.backend.anon_key)
            .bearer_auth(&self.backend.anon_key)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("backend unreachable: {}", e)))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Registry(format!("backend probe returned {}", status)))
        }
    }

    async fn lookup_or_create(&self, zone: &str) -> Result<String> {
        match self.lookup(zone).await {
            Ok(Some(id)) => return Ok(id),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(zone = %zone, error = %e, "Camera lookup failed, trying create");
            }
        }

        match self.create(zone).await? {
            CreateOutcome::Created(id) => Ok(id),
            CreateOutcome::Exists => match self.lookup(zone).await? {
                Some(id) => Ok(id),
                None => Err(Error::Registry(format!(
                    "camera create conflicted but re-lookup found nothing for zone {}",
                    zone
                ))),
            },
        }
    }

    async fn lookup(&self, zone: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .get(self.cameras_url())
            .query(&[
                ("name", format!("eq.Camera {}", zone)),
                ("location", format!("eq.{}", zone)),
            ])
            .header("apikey", &self.backend.anon_key)
            .bearer_auth(&self.backend.anon_key)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("camera lookup failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Registry(format!(
                "camera lookup returned {}: {}",
                status,
                snippet(&body)
            )));
        }

        let rows: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| Error::Registry(format!("camera lookup body: {}", e)))?;
        Ok(rows.first().and_then(row_id))
    }

    async fn create(&self, zone: &str) -> Result<CreateOutcome> {
        let body = serde_json::json!({
            "name": format!("Camera {}", zone),
            "location": zone,
            "status": "active",
            "zone": zone,
        });

        let resp = self
            .client
            .post(self.cameras_url())
            .header("apikey", &self.backend.anon_key)
            .bearer_auth(&self.backend.anon_key)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("camera create failed: {}", e)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::CONFLICT {
            tracing::info!(zone = %zone, "Camera already exists (create conflict)");
            return Ok(CreateOutcome::Exists);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Registry(format!(
                "camera create returned {}: {}",
                status,
                snippet(&body)
            )));
        }

        let rows: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| Error::Registry(format!("camera create body: {}", e)))?;
        match rows.first().and_then(row_id) {
            Some(id) => {
                tracing::info!(zone = %zone, camera_id = %id, "Camera registered");
                Ok(CreateOutcome::Created(id))
            }
            None => Ok(CreateOutcome::Exists),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(base_url: String) -> BackendConfig {
        BackendConfig {
            base_url,
            anon_key: "test-key".to_string(),
            ingest_fn_url: None,
            storage_bucket: "detection-images".to_string(),
            placeholder_image_url: "https://placeholder.example/img".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_resolve_looks_up_once_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cameras"))
            .and(query_param("name", "eq.Camera Zone A"))
            .and(query_param("location", "eq.Zone A"))
            .and(header("apikey", "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"id": "cam-1", "zone": "Zone A"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let registry = CameraRegistry::new(backend(server.uri()));
        assert_eq!(registry.resolve("Zone A").await.unwrap(), "cam-1");
        // Second resolve must come from the cache (mock expects one hit)
        assert_eq!(registry.resolve("Zone A").await.unwrap(), "cam-1");
    }

    #[tokio::test]
    async fn test_resolve_creates_when_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cameras"))
            .and(query_param("name", "eq.Camera Zone B"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/cameras"))
            .and(header("Prefer", "return=representation"))
            .and(body_partial_json(serde_json::json!({
                "name": "Camera Zone B",
                "location": "Zone B",
                "status": "active",
                "zone": "Zone B"
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!([{"id": "cam-9"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let registry = CameraRegistry::new(backend(server.uri()));
        assert_eq!(registry.resolve("Zone B").await.unwrap(), "cam-9");
    }

    #[tokio::test]
    async fn test_create_conflict_falls_back_to_lookup() {
        let server = MockServer::start().await;
        // First lookup sees nothing; after the conflicting create the row
        // is visible
        Mock::given(method("GET"))
            .and(path("/rest/v1/cameras"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/cameras"))
            .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cameras"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": "cam-7"}])),
            )
            .mount(&server)
            .await;

        let registry = CameraRegistry::new(backend(server.uri()));
        assert_eq!(registry.resolve("Zone C").await.unwrap(), "cam-7");
    }

    #[tokio::test]
    async fn test_resolve_errors_when_both_paths_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cameras"))
            .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/cameras"))
            .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
            .mount(&server)
            .await;

        let registry = CameraRegistry::new(backend(server.uri()));
        let err = registry.resolve("Zone D").await.unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[tokio::test]
    async fn test_numeric_ids_are_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cameras"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 42}])),
            )
            .mount(&server)
            .await;

        let registry = CameraRegistry::new(backend(server.uri()));
        assert_eq!(registry.resolve("Zone E").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn test_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/cameras"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let registry = CameraRegistry::new(backend(server.uri()));
        assert!(registry.probe().await.is_ok());

        let dead = CameraRegistry::new(backend("http://127.0.0.1:9".to_string()));
        assert!(dead.probe().await.is_err());
    }
}
