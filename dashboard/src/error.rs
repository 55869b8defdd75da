use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure talking to an upstream collaborator. Reported in the source's
/// snapshot state and retried by the poller only.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl FetchError {
    /// Build a `Status` error, keeping at most 300 bytes of the body.
    pub fn status(status: reqwest::StatusCode, body: &str) -> Self {
        let mut end = body.len().min(300);
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        FetchError::Status {
            status: status.as_u16(),
            body: body[..end].to_string(),
        }
    }

    /// Configuration problems won't fix themselves on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::NotConfigured(_))
    }
}

/// Decode a JSON body, turning non-2xx answers into `Status` errors.
pub(crate) async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, FetchError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::status(status, &body));
    }
    resp.json().await.map_err(|e| FetchError::Decode(e.to_string()))
}
