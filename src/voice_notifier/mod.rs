//! Voice notifier - supervisor call-out adapter
//!
//! Places a voice call through the provider's REST API (Twilio-compatible
//! surface). Cleanly disabled when credentials are absent; the pipeline
//! then logs what would have been spoken.

use serde::Deserialize;
use std::time::Duration;

use crate::config::VoiceConfig;
use crate::error::{snippet, Error, Result};

const CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Voice provider client
pub struct VoiceNotifier {
    client: reqwest::Client,
    config: Option<VoiceConfig>,
}

/// Provider response, call sid only
#[derive(Debug, Deserialize)]
struct CallResponse {
    sid: String,
}

impl VoiceNotifier {
    pub fn new(config: Option<VoiceConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Place a call speaking `message` to `to`; returns the provider call
    /// id. One attempt, no retry; the throttle window stays armed whether
    /// or not this succeeds.
    pub async fn call(&self, message: &str, to: &str) -> Result<String> {
        let config = self.config.as_ref().ok_or_else(|| {
            Error::Notification("voice notifications are disabled (no credentials)".to_string())
        })?;

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            config.api_base, config.account_sid
        );
        let twiml = format!(
            "<Response><Say voice=\"alice\">{}</Say></Response>",
            xml_escape(message)
        );

        let resp = self
            .client
            .post(&url)
            .basic_auth(&config.account_sid, Some(&config.auth_token))
            .form(&[
                ("Twiml", twiml.as_str()),
                ("To", to),
                ("From", config.from_number.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Notification(format!("voice call failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "voice provider returned {}: {}",
                status,
                snippet(&body)
            )));
        }

        let call: CallResponse = resp
            .json()
            .await
            .map_err(|e| Error::Notification(format!("voice provider response: {}", e)))?;
        Ok(call.sid)
    }
}

/// Minimal XML escaping for the spoken message
fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
