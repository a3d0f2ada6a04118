use async_trait::async_trait;
use thiserror::Error;
use unmark_shared::validation::ImageUpload;

/// Failures of the remote transformation.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transform service is not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Request(String),

    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("prediction {0}")]
    Prediction(String),

    #[error("no image in response")]
    EmptyOutput,

    #[error("failed to fetch result: {0}")]
    Fetch(String),
}

impl From<reqwest::Error> for TransformError {
    fn from(e: reqwest::Error) -> Self {
        TransformError::Request(e.to_string())
    }
}

/// The remote watermark removal. Opaque: image in, image out.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, image: &ImageUpload) -> Result<Vec<u8>, TransformError>;
}
