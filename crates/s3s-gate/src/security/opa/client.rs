use super::{OpaClient, OpaRequest, PolicyError, parse_decision};

use std::time::Duration;

use http::StatusCode;
use http::header::CONTENT_TYPE;
use tracing::debug;

/// [`OpaClient`] over HTTP.
///
/// Every call to [`evaluate`](OpaClient::evaluate) is one `POST`; nothing is cached or retried.
/// Connections are pooled by the inner [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpOpaClient {
    client: reqwest::Client,
}

impl HttpOpaClient {
    /// Creates a client whose requests fail after `timeout`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wraps a preconfigured client. The caller is responsible for its timeout.
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn transport_error(err: reqwest::Error) -> PolicyError {
    if err.is_timeout() {
        PolicyError::Timeout
    } else {
        PolicyError::Transport(err)
    }
}

#[async_trait::async_trait]
impl OpaClient for HttpOpaClient {
    async fn evaluate(&self, request: &OpaRequest) -> Result<bool, PolicyError> {
        let body = request.to_body()?;

        let resp = self
            .client
            .post(request.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(PolicyError::Status(status));
        }

        let bytes = resp.bytes().await.map_err(transport_error)?;
        let allowed = parse_decision(&bytes)?;
        debug!(uri = %request.uri, allowed, "policy decision");
        Ok(allowed)
    }
}
