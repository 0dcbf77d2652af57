//! Security facades
//!
//! For every request whose access requirement is not public, the gateway asks the active
//! [`SecurityFacadeProvider`] for a [`SecurityFacade`] bound to that request and invokes it once
//! with the request's lowercase action. The facade answers with a [`SecurityResponse`].
//!
//! Providers must not perform I/O in [`facade_for`](SecurityFacadeProvider::facade_for). Any
//! remote work happens inside [`decide`](SecurityFacade::decide).
//!
//! # Example
//!
//! ```
//! use s3s_gate::auth::Identity;
//! use s3s_gate::request::ParsedS3Request;
//! use s3s_gate::security::{SecurityFacade, SecurityFacadeProvider, SecurityResponse};
//!
//! /// Lets callers touch only their own bucket.
//! struct OwnBucketOnly;
//!
//! struct OwnBucketFacade<'a> {
//!     request: &'a ParsedS3Request,
//!     identity: Option<&'a Identity>,
//! }
//!
//! #[async_trait::async_trait]
//! impl<'a> SecurityFacade for OwnBucketFacade<'a> {
//!     async fn decide(&self, _lowercase_action: Option<&str>) -> SecurityResponse {
//!         match self.identity {
//!             Some(id) if id.user() == self.request.bucket => SecurityResponse::Success,
//!             _ => SecurityResponse::Failure,
//!         }
//!     }
//! }
//!
//! impl SecurityFacadeProvider for OwnBucketOnly {
//!     fn facade_for<'a>(
//!         &'a self,
//!         request: &'a ParsedS3Request,
//!         identity: Option<&'a Identity>,
//!     ) -> Box<dyn SecurityFacade + 'a> {
//!         Box::new(OwnBucketFacade { request, identity })
//!     }
//! }
//! ```

pub mod opa;

use crate::auth::Identity;
use crate::request::ParsedS3Request;

use std::fmt;

/// The two-valued security verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityResponse {
    Success,
    Failure,
}

impl SecurityResponse {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    #[must_use]
    pub const fn from_allowed(allowed: bool) -> Self {
        if allowed { Self::Success } else { Self::Failure }
    }
}

impl fmt::Display for SecurityResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("SUCCESS"),
            Self::Failure => f.write_str("FAILURE"),
        }
    }
}

/// A request-scoped authorization decision.
#[async_trait::async_trait]
pub trait SecurityFacade: Send + Sync {
    /// Decides whether the bound request may perform `lowercase_action`.
    async fn decide(&self, lowercase_action: Option<&str>) -> SecurityResponse;
}

/// Builds a [`SecurityFacade`] for each request.
pub trait SecurityFacadeProvider: Send + Sync + 'static {
    fn facade_for<'a>(&'a self, request: &'a ParsedS3Request, identity: Option<&'a Identity>)
    -> Box<dyn SecurityFacade + 'a>;
}

/// Allows every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllSecurityFacadeProvider;

struct AllowAll;

#[async_trait::async_trait]
impl SecurityFacade for AllowAll {
    async fn decide(&self, _: Option<&str>) -> SecurityResponse {
        SecurityResponse::Success
    }
}

impl SecurityFacadeProvider for AllowAllSecurityFacadeProvider {
    fn facade_for<'a>(&'a self, _: &'a ParsedS3Request, _: Option<&'a Identity>) -> Box<dyn SecurityFacade + 'a> {
        Box::new(AllowAll)
    }
}
