use super::{OpaClient, OpaRequest, OpaS3SecurityMapper, decision_uri};

use crate::auth::Identity;
use crate::request::ParsedS3Request;
use crate::security::SecurityResponse;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

/// Keys answered locally, without asking the policy service.
///
/// A key listed in both sets is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FastPathRules {
    pub allow_keys: BTreeSet<String>,
    pub deny_keys: BTreeSet<String>,
}

impl FastPathRules {
    #[must_use]
    pub fn check(&self, key_in_bucket: &str) -> Option<SecurityResponse> {
        if self.deny_keys.contains(key_in_bucket) {
            return Some(SecurityResponse::Failure);
        }
        if self.allow_keys.contains(key_in_bucket) {
            return Some(SecurityResponse::Success);
        }
        None
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allow_keys.is_empty() && self.deny_keys.is_empty()
    }
}

/// The reference mapper.
///
/// Sends `{"table": <key>, "bucket": <bucket>, "action": <action>, "user": <user>}` to
/// `<base-uri>/<decision-path>`; `action` and `user` are omitted when absent.
pub struct TableOpaMapper {
    client: Arc<dyn OpaClient>,
    decision_path: String,
    fast_path: FastPathRules,
}

impl TableOpaMapper {
    #[must_use]
    pub fn new(client: Arc<dyn OpaClient>, decision_path: impl Into<String>) -> Self {
        Self {
            client,
            decision_path: decision_path.into(),
            fast_path: FastPathRules::default(),
        }
    }

    #[must_use]
    pub fn with_fast_path(mut self, fast_path: FastPathRules) -> Self {
        self.fast_path = fast_path;
        self
    }

    fn input(request: &ParsedS3Request, lowercase_action: Option<&str>, identity: Option<&Identity>) -> Map<String, Value> {
        let mut input = Map::new();
        input.insert("table".to_owned(), Value::from(request.key_in_bucket.as_str()));
        input.insert("bucket".to_owned(), Value::from(request.bucket.as_str()));
        if let Some(action) = lowercase_action {
            input.insert("action".to_owned(), Value::from(action));
        }
        if let Some(identity) = identity {
            input.insert("user".to_owned(), Value::from(identity.user()));
        }
        input
    }
}

#[async_trait::async_trait]
impl OpaS3SecurityMapper for TableOpaMapper {
    async fn apply(
        &self,
        request: &ParsedS3Request,
        lowercase_action: Option<&str>,
        base_uri: &Url,
        identity: Option<&Identity>,
    ) -> SecurityResponse {
        if let Some(verdict) = self.fast_path.check(&request.key_in_bucket) {
            debug!(key = %request.key_in_bucket, %verdict, "fast-path decision");
            return verdict;
        }

        let uri = match decision_uri(base_uri, &self.decision_path) {
            Ok(uri) => uri,
            Err(err) => {
                warn!(?err, "cannot build decision uri");
                return SecurityResponse::Failure;
            }
        };

        let opa_request = OpaRequest::new(uri, Self::input(request, lowercase_action, identity));
        self.client.request_security_response(&opa_request).await
    }
}
