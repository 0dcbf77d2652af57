//! Remote policy evaluation with OPA
//!
//! [`OpaS3SecurityFacadeProvider`] hands every request to an [`OpaS3SecurityMapper`]. The
//! mapper owns the decision logic: it may answer locally (fast-path rules) or build an
//! [`OpaRequest`] and send it through an [`OpaClient`].
//!
//! Wire contract: `POST <server-base-uri>/<decision-path>` with body `{"input": {...}}`.
//! The service answers `{"result": true}` to allow. Anything else is a deny, and every
//! transport or decoding failure is a deny too.
//!
//! ```text
//!  facade.decide(action)
//!        │
//!        ▼
//!  mapper.apply(request, action, base_uri, identity)
//!        │
//!        ├── fast-path rule matched ──► Success / Failure
//!        │
//!        ▼
//!  client.request_security_response(OpaRequest)
//!        │
//!        ├── Ok(true)  ──► Success
//!        └── Ok(false) / Err(_) ──► Failure
//! ```

mod client;
pub use self::client::HttpOpaClient;

mod mapper;
pub use self::mapper::{FastPathRules, TableOpaMapper};

use super::{SecurityFacade, SecurityFacadeProvider, SecurityResponse};

use crate::auth::Identity;
use crate::request::ParsedS3Request;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

/// A decision request: where to ask and what to send.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaRequest {
    pub uri: Url,
    pub input: Map<String, Value>,
}

impl OpaRequest {
    #[must_use]
    pub fn new(uri: Url, input: Map<String, Value>) -> Self {
        Self { uri, input }
    }

    /// Serializes the `{"input": ...}` request document.
    ///
    /// # Errors
    /// Returns an error if the input cannot be serialized.
    pub fn to_body(&self) -> Result<Vec<u8>, PolicyError> {
        #[derive(Serialize)]
        struct Body<'a> {
            input: &'a Map<String, Value>,
        }
        serde_json::to_vec(&Body { input: &self.input }).map_err(PolicyError::Json)
    }
}

/// Reads the boolean decision out of a policy response document.
///
/// A missing or non-boolean `result` is a deny.
///
/// # Errors
/// Returns [`PolicyError::Json`] if the document is not a JSON object.
pub fn parse_decision(body: &[u8]) -> Result<bool, PolicyError> {
    #[derive(Deserialize)]
    struct Response {
        #[serde(default)]
        result: Option<Value>,
    }
    let resp: Response = serde_json::from_slice(body).map_err(PolicyError::Json)?;
    Ok(matches!(resp.result, Some(Value::Bool(true))))
}

/// Appends a decision path to the server base uri, segment by segment.
///
/// ```
/// use s3s_gate::security::opa::decision_uri;
/// use url::Url;
///
/// let base = Url::parse("http://localhost:8181/v1/data").unwrap();
/// let uri = decision_uri(&base, "test/allow").unwrap();
/// assert_eq!(uri.as_str(), "http://localhost:8181/v1/data/test/allow");
/// ```
///
/// # Errors
/// Returns [`PolicyError::InvalidUri`] if the base uri cannot carry a path.
pub fn decision_uri(base: &Url, path: &str) -> Result<Url, PolicyError> {
    let mut uri = base.clone();
    uri.path_segments_mut()
        .map_err(|()| PolicyError::InvalidUri(base.to_string()))?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(uri)
}

/// Why a policy evaluation produced no decision.
///
/// Never shown to clients. Every variant ends as [`SecurityResponse::Failure`].
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy request timed out")]
    Timeout,

    #[error("policy request failed")]
    Transport(#[source] reqwest::Error),

    #[error("policy service returned status {0}")]
    Status(http::StatusCode),

    #[error("malformed policy document")]
    Json(#[source] serde_json::Error),

    #[error("invalid policy uri: {0}")]
    InvalidUri(String),
}

/// Sends decision requests to the policy service.
#[async_trait::async_trait]
pub trait OpaClient: Send + Sync + 'static {
    /// Performs one evaluation and returns the decision.
    ///
    /// # Errors
    /// Returns a [`PolicyError`] if no decision could be obtained.
    async fn evaluate(&self, request: &OpaRequest) -> Result<bool, PolicyError>;

    /// Like [`evaluate`](Self::evaluate), with every failure turned into a deny.
    async fn request_security_response(&self, request: &OpaRequest) -> SecurityResponse {
        match self.evaluate(request).await {
            Ok(allowed) => SecurityResponse::from_allowed(allowed),
            Err(err) => {
                warn!(uri = %request.uri, ?err, "policy evaluation failed");
                SecurityResponse::Failure
            }
        }
    }
}

/// The pluggable decision logic behind [`OpaS3SecurityFacadeProvider`].
#[async_trait::async_trait]
pub trait OpaS3SecurityMapper: Send + Sync + 'static {
    async fn apply(
        &self,
        request: &ParsedS3Request,
        lowercase_action: Option<&str>,
        base_uri: &Url,
        identity: Option<&Identity>,
    ) -> SecurityResponse;
}

/// A provider whose facades delegate to an [`OpaS3SecurityMapper`].
pub struct OpaS3SecurityFacadeProvider {
    server_base_uri: Url,
    mapper: Arc<dyn OpaS3SecurityMapper>,
}

impl OpaS3SecurityFacadeProvider {
    #[must_use]
    pub fn new(server_base_uri: Url, mapper: Arc<dyn OpaS3SecurityMapper>) -> Self {
        Self { server_base_uri, mapper }
    }

    #[must_use]
    pub fn server_base_uri(&self) -> &Url {
        &self.server_base_uri
    }
}

struct OpaS3SecurityFacade<'a> {
    request: &'a ParsedS3Request,
    identity: Option<&'a Identity>,
    base_uri: &'a Url,
    mapper: &'a dyn OpaS3SecurityMapper,
}

#[async_trait::async_trait]
impl<'a> SecurityFacade for OpaS3SecurityFacade<'a> {
    async fn decide(&self, lowercase_action: Option<&str>) -> SecurityResponse {
        self.mapper
            .apply(self.request, lowercase_action, self.base_uri, self.identity)
            .await
    }
}

impl SecurityFacadeProvider for OpaS3SecurityFacadeProvider {
    fn facade_for<'a>(&'a self, request: &'a ParsedS3Request, identity: Option<&'a Identity>) -> Box<dyn SecurityFacade + 'a> {
        Box::new(OpaS3SecurityFacade {
            request,
            identity,
            base_uri: &self.server_base_uri,
            mapper: &*self.mapper,
        })
    }
}
