//! HTTP adapter for the hosted image-edit model.
//!
//! The image is sent inline as a data URL together with the fixed
//! instruction. The service answers with a temporary URL which is fetched
//! right away: it is not guaranteed to stay valid, so the caller re-hosts
//! the bytes.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use unmark_shared::constants::TRANSFORM_PROMPT;
use unmark_shared::validation::ImageUpload;

use crate::transform::{TransformError, Transformer};

pub const DEFAULT_API_URL: &str = "https://api.replicate.com/v1";
pub const DEFAULT_MODEL: &str = "qwen/qwen-image-edit-2511";

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct ReplicateConfig {
    pub api_url: String,
    pub model: String,
    pub api_token: Option<String>,
}

// The token never reaches the logs.
impl std::fmt::Debug for ReplicateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateConfig")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_token: None,
        }
    }
}

impl ReplicateConfig {
    /// Read `REPLICATE_API_TOKEN`, `REPLICATE_MODEL` and `REPLICATE_API_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("REPLICATE_API_TOKEN") {
            config.api_token = Some(token);
        }
        if let Some(model) = non_empty("REPLICATE_MODEL") {
            config.model = model;
        }
        if let Some(url) = non_empty("REPLICATE_API_URL") {
            config.api_url = url;
        }

        config
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

pub struct ReplicateTransformer {
    client: reqwest::Client,
    config: ReplicateConfig,
}

impl ReplicateTransformer {
    pub fn new(config: ReplicateConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn predictions_url(&self) -> String {
        format!(
            "{}/models/{}/predictions",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn fetch_output(&self, url: &str) -> Result<Vec<u8>, TransformError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransformError::Fetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransformError::Fetch(format!("status {}", resp.status())));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransformError::Fetch(e.to_string()))?;
        if bytes.is_empty() {
            return Err(TransformError::EmptyOutput);
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Transformer for ReplicateTransformer {
    async fn transform(&self, image: &ImageUpload) -> Result<Vec<u8>, TransformError> {
        let token = self
            .config
            .api_token
            .as_deref()
            .ok_or(TransformError::NotConfigured)?;

        let body = json!({
            "input": {
                "image": [image.to_data_url()],
                "prompt": TRANSFORM_PROMPT,
                "output_quality": 100,
                "output_format": "webp",
            }
        });

        info!(model = %self.config.model, size = image.bytes.len(), "Requesting transformation");

        let resp = self
            .client
            .post(self.predictions_url())
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let mut prediction = read_prediction(resp).await?;

        // `Prefer: wait` may return before the model finishes.
        while !is_terminal(&prediction.status) {
            let poll_url = prediction
                .urls
                .as_ref()
                .and_then(|u| u.get.clone())
                .ok_or_else(|| TransformError::Prediction("has no status URL".into()))?;
            debug!(status = %prediction.status, "Prediction still running");
            tokio::time::sleep(POLL_INTERVAL).await;
            let resp = self.client.get(&poll_url).bearer_auth(token).send().await?;
            prediction = read_prediction(resp).await?;
        }

        if prediction.status != "succeeded" {
            let reason = prediction
                .error
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_else(|| "no reason given".to_string());
            return Err(TransformError::Prediction(format!(
                "{}: {}",
                prediction.status, reason
            )));
        }

        let url = first_output_url(prediction.output.as_ref()).ok_or(TransformError::EmptyOutput)?;
        self.fetch_output(&url).await
    }
}

async fn read_prediction(resp: reqwest::Response) -> Result<Prediction, TransformError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TransformError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.json::<Prediction>().await?)
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "succeeded" | "failed" | "canceled")
}

/// The model returns either a single URL or a list of URLs.
fn first_output_url(output: Option<&Value>) -> Option<String> {
    match output? {
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        Value::Array(items) => items
            .iter()
            .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
            .map(str::to_string),
        _ => None,
    }
}
