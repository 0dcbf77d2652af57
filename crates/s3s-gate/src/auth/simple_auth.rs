use super::{CredentialScope, Identity, IdentityContext, IdentityResolver};

use crate::error::GateResult;

use std::collections::HashMap;

use tracing::debug;

/// Maps access keys to users by reading the SigV4 credential scope.
///
/// The signature is **not** verified. This resolver exists for tests and local development.
#[derive(Debug, Default)]
pub struct SimpleIdentityResolver {
    map: HashMap<String, String>,
}

impl SimpleIdentityResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_single(access_key: impl Into<String>, user: impl Into<String>) -> Self {
        let mut this = Self::new();
        this.register(access_key.into(), user.into());
        this
    }

    /// Registers a user. Returns the user previously bound to the access key.
    pub fn register(&mut self, access_key: String, user: String) -> Option<String> {
        self.map.insert(access_key, user)
    }
}

#[async_trait::async_trait]
impl IdentityResolver for SimpleIdentityResolver {
    async fn resolve_identity(&self, cx: &IdentityContext<'_>) -> GateResult<Identity> {
        let Some(scope) = CredentialScope::from_request(cx.uri, cx.headers)? else {
            return Err(gate_error!(AccessDenied, "Signature is required"));
        };

        if scope.service != cx.service.signing_name() {
            return Err(gate_error!(
                AuthorizationHeaderMalformed,
                "credential scope service {:?} does not match {:?}",
                scope.service,
                cx.service.signing_name()
            ));
        }

        match self.map.get(&scope.access_key) {
            Some(user) => {
                debug!(%user, access_key = %scope.access_key, "resolved identity");
                Ok(Identity::with_access_key(user.clone(), scope.access_key))
            }
            None => Err(gate_error!(InvalidAccessKeyId)),
        }
    }
}
