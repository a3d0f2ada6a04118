//! Typed HTTP client for the Unmark server API.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use unmark_shared::constants::DAILY_LIMIT;
use unmark_shared::protocol::{
    ApiResponse, EntriesData, EntryView, ProcessData, ProcessRequest, SessionData, SessionRequest,
    ShareData, ShareRequest,
};
use unmark_shared::{EntryId, Identity, UnmarkError};

use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn session(&self, identity: &Identity) -> Result<SessionData> {
        let request = SessionRequest {
            identity: Some(identity.to_string()),
        };
        self.post("/session", &request).await
    }

    /// Send an already-encoded image. A 404 here means the server does not
    /// know the identity.
    pub async fn process(
        &self,
        identity: &Identity,
        image_base64: String,
        source_reference: Option<String>,
    ) -> Result<ProcessData> {
        let request = ProcessRequest {
            identity: Some(identity.to_string()),
            image_base64: Some(image_base64),
            source_reference,
        };
        self.post("/process", &request).await.map_err(|e| match e {
            ClientError::Unmark(UnmarkError::NotFound) => UnmarkError::IdentityNotFound.into(),
            other => other,
        })
    }

    pub async fn history(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<EntryView>> {
        let limit = limit.to_string();
        let offset = offset.to_string();
        let response = self
            .http
            .get(self.url("/history"))
            .query(&[
                ("identity", identity.as_str()),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
            ])
            .send()
            .await?;
        let data: EntriesData = read_envelope(response).await?;
        Ok(data.entries)
    }

    pub async fn share(&self, identity: &Identity, entry_id: EntryId) -> Result<ShareData> {
        let request = ShareRequest {
            entry_id: Some(entry_id.to_string()),
            identity: Some(identity.to_string()),
        };
        self.post("/share", &request).await
    }

    pub async fn public_feed(&self) -> Result<Vec<EntryView>> {
        let response = self.http.get(self.url("/public-feed")).send().await?;
        let data: EntriesData = read_envelope(response).await?;
        Ok(data.entries)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!(path, "POST");
        let response = self.http.post(self.url(path)).json(body).send().await?;
        read_envelope(response).await
    }
}

/// Decode the `{success, data, error}` envelope, mapping failure statuses
/// back onto the error taxonomy.
async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let envelope: ApiResponse<T> = response.json().await?;

    match envelope.into_result() {
        Ok(data) if status.is_success() => Ok(data),
        Ok(_) => Err(ClientError::Server {
            status: status.as_u16(),
            message: "unexpected payload".to_string(),
        }),
        Err(message) => Err(match status {
            StatusCode::BAD_REQUEST => UnmarkError::Validation(message).into(),
            StatusCode::NOT_FOUND => UnmarkError::NotFound.into(),
            StatusCode::TOO_MANY_REQUESTS => UnmarkError::QuotaExceeded { limit: DAILY_LIMIT }.into(),
            other => ClientError::Server {
                status: other.as_u16(),
                message,
            },
        }),
    }
}
