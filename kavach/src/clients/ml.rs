// kavach/src/clients/ml.rs
//
// ML probability service client.
//
// Hard timeout (default 150 ms, never above 180 ms) — the pay-validation
// path sits on the user's payment confirmation screen, so a slow model is
// worse than no model. Any failure mode returns None; the fusion layer
// treats that as "signal absent".

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ML_TIMEOUT_CAP_MS;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MlRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(rename = "receiverUPI", skip_serializing_if = "Option::is_none")]
    pub receiver_upi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub new_payee: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MlPrediction {
    pub probability: f32,
    #[serde(default)]
    pub indicators: Vec<String>,
}

pub struct MlClient {
    client: Client,
    url:    String,
}

impl MlClient {
    pub fn new(url: &str, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms.min(ML_TIMEOUT_CAP_MS)))
            .user_agent("kavach/0.4")
            .build()?;
        Ok(Self { client, url: url.to_string() })
    }

    pub async fn predict(&self, req: &MlRequest) -> Option<MlPrediction> {
        let resp = match self.client.post(&self.url).json(req).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("ML request failed: {e}");
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("ML service returned {}", resp.status());
            return None;
        }

        let pred: MlPrediction = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!("ML response malformed: {e}");
                return None;
            }
        };

        if !(0.0..=1.0).contains(&pred.probability) || !pred.probability.is_finite() {
            warn!("ML probability out of range: {}", pred.probability);
            return None;
        }
        Some(pred)
    }
}
