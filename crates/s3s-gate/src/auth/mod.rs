//! Caller identity
//!
//! Operations whose [`AccessRequirement`](crate::access::AccessRequirement) is `SigV4` only run
//! after an [`IdentityResolver`] has turned the request's signature into a verified
//! [`Identity`]. Signature verification itself belongs to the resolver implementation.
//!
//! [`SimpleIdentityResolver`] is a development resolver: it reads the SigV4 credential scope and
//! maps access keys to users without checking the signature. Do not use it in production.
//!
//! # Custom resolvers
//!
//! ```
//! use s3s_gate::auth::{Identity, IdentityContext, IdentityResolver};
//! use s3s_gate::{gate_error, GateResult};
//!
//! struct HeaderUser;
//!
//! #[async_trait::async_trait]
//! impl IdentityResolver for HeaderUser {
//!     async fn resolve_identity(&self, cx: &IdentityContext<'_>) -> GateResult<Identity> {
//!         match cx.headers.get("x-verified-user").and_then(|v| v.to_str().ok()) {
//!             Some(user) => Ok(Identity::new(user)),
//!             None => Err(gate_error!(AccessDenied, "Signature is required")),
//!         }
//!     }
//! }
//! ```

mod credential;
pub use self::credential::CredentialScope;

mod identity;
pub use self::identity::Identity;

mod simple_auth;
pub use self::simple_auth::SimpleIdentityResolver;

use crate::access::ServiceKind;
use crate::error::GateResult;

use http::{HeaderMap, Method, Uri};

/// The request data an [`IdentityResolver`] sees.
#[derive(Debug)]
pub struct IdentityContext<'a> {
    /// The service the operation's signature must be scoped to.
    pub service: ServiceKind,
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
}

/// Resolves the verified caller of a SigV4 request.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    /// Verifies the request's credentials and returns the caller.
    ///
    /// # Errors
    ///
    /// Returns an authentication error (`AccessDenied`, `InvalidAccessKeyId`,
    /// `SignatureDoesNotMatch`, `AuthorizationHeaderMalformed`) if the caller cannot be
    /// established. The error is sent to the client as is.
    async fn resolve_identity(&self, cx: &IdentityContext<'_>) -> GateResult<Identity>;
}
