//! Gateway service and builder
//!
//! [`GateService`] is a hyper and tower service. It owns everything the authorization
//! pipeline needs:
//!
//! - **Operations**: the handlers requests are dispatched to, via [`Operation`]
//! - **Access registry**: the [`AccessRequirement`] of every operation
//! - **Identity resolver**: required as soon as one operation is not public
//! - **Request parser**: defaults to [`DefaultRequestParser`]
//! - **Security provider**: exactly one, usually built from [`GateConfig`]
//! - **Denial mode**: how a `Failure` verdict is reported
//!
//! # Example
//!
//! ```
//! use s3s_gate::access::{AccessRegistry, AccessRequirement};
//! use s3s_gate::auth::SimpleIdentityResolver;
//! use s3s_gate::ops::{GateRequest, Operation};
//! use s3s_gate::security::AllowAllSecurityFacadeProvider;
//! use s3s_gate::service::GateServiceBuilder;
//! use s3s_gate::GateResult;
//!
//! use bytes::Bytes;
//! use http::{HeaderMap, Method, Uri};
//! use std::sync::Arc;
//!
//! struct GetObject;
//!
//! #[async_trait::async_trait]
//! impl Operation for GetObject {
//!     fn name(&self) -> &'static str {
//!         "GetObject"
//!     }
//!
//!     fn is_match(&self, method: &Method, _uri: &Uri, _headers: &HeaderMap) -> bool {
//!         method == Method::GET
//!     }
//!
//!     async fn call(&self, _req: GateRequest) -> GateResult<http::Response<Bytes>> {
//!         Ok(http::Response::new(Bytes::from_static(b"hello")))
//!     }
//! }
//!
//! let registry = AccessRegistry::builder()
//!     .declare("GetObject", AccessRequirement::S3)
//!     .build()
//!     .unwrap();
//!
//! let mut builder = GateServiceBuilder::new(Arc::new(AllowAllSecurityFacadeProvider));
//! builder.set_access_registry(registry);
//! builder.set_identity_resolver(SimpleIdentityResolver::from_single("AKIDEXAMPLE", "alice"));
//! builder.add_operation(GetObject);
//! let service = builder.build().unwrap();
//! ```

use crate::access::AccessRegistry;
use crate::auth::IdentityResolver;
use crate::config::GateConfig;
use crate::error::{ConfigError, GateError, GateErrorCode};
use crate::ops::{CallContext, GateRequest, Operation};
use crate::outcome::DenialMode;
use crate::request::{DefaultRequestParser, S3RequestParser};
use crate::security::SecurityFacadeProvider;

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use tracing::{debug, error, info};

/// Builder for [`GateService`].
pub struct GateServiceBuilder {
    provider: Arc<dyn SecurityFacadeProvider>,
    registry: AccessRegistry,
    operations: Vec<Box<dyn Operation>>,
    identity_resolver: Option<Box<dyn IdentityResolver>>,
    parser: Option<Box<dyn S3RequestParser>>,
    denial_mode: DenialMode,
}

impl GateServiceBuilder {
    /// Creates a builder around the active security provider.
    #[must_use]
    pub fn new(provider: Arc<dyn SecurityFacadeProvider>) -> Self {
        Self {
            provider,
            registry: AccessRegistry::default(),
            operations: Vec::new(),
            identity_resolver: None,
            parser: None,
            denial_mode: DenialMode::default(),
        }
    }

    /// Builds the provider and takes the denial mode from `config`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the configured provider cannot be built.
    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        let mut this = Self::new(config.build_provider()?);
        this.set_denial_mode(config.denial_mode);
        Ok(this)
    }

    pub fn set_access_registry(&mut self, registry: AccessRegistry) {
        self.registry = registry;
    }

    pub fn set_identity_resolver(&mut self, resolver: impl IdentityResolver) {
        self.identity_resolver = Some(Box::new(resolver));
    }

    /// Replaces the [`DefaultRequestParser`].
    pub fn set_parser(&mut self, parser: impl S3RequestParser) {
        self.parser = Some(Box::new(parser));
    }

    pub fn set_denial_mode(&mut self, denial_mode: DenialMode) {
        self.denial_mode = denial_mode;
    }

    /// Registers an operation. Operations are matched in registration order.
    pub fn add_operation(&mut self, op: impl Operation) {
        self.operations.push(Box::new(op));
    }

    /// Validates the setup and builds the service.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if an operation is registered twice, has no declared access
    /// requirement, or requires SigV4 while no identity resolver is set.
    pub fn build(self) -> Result<GateService, ConfigError> {
        let mut seen = BTreeSet::new();
        for op in &self.operations {
            let name = op.name();
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateOperation(name));
            }
            let requirement = self.registry.require(name)?;
            if !requirement.is_public() && self.identity_resolver.is_none() {
                return Err(ConfigError::MissingIdentityResolver(name));
            }
        }

        info!(operations = self.operations.len(), denial_mode = ?self.denial_mode, "gateway ready");

        Ok(GateService {
            inner: Arc::new(Inner {
                registry: self.registry,
                operations: self.operations,
                identity_resolver: self.identity_resolver,
                parser: self.parser.unwrap_or_else(|| Box::new(DefaultRequestParser::new())),
                provider: self.provider,
                denial_mode: self.denial_mode,
            }),
        })
    }
}

#[derive(Clone)]
pub struct GateService {
    inner: Arc<Inner>,
}

struct Inner {
    registry: AccessRegistry,
    operations: Vec<Box<dyn Operation>>,
    identity_resolver: Option<Box<dyn IdentityResolver>>,
    parser: Box<dyn S3RequestParser>,
    provider: Arc<dyn SecurityFacadeProvider>,
    denial_mode: DenialMode,
}

impl GateService {
    /// Authorizes and dispatches one request.
    ///
    /// Never fails: every rejection is an S3 XML error response.
    #[tracing::instrument(level = "debug", skip(self, req), fields(method = %req.method(), uri = %req.uri()))]
    pub async fn call(&self, req: http::Request<Bytes>) -> http::Response<Bytes> {
        let t0 = Instant::now();

        let (parts, body) = req.into_parts();
        let req = GateRequest::new(parts.method, parts.uri, parts.headers, body);

        let ccx = CallContext {
            registry: &self.inner.registry,
            operations: &self.inner.operations,
            identity_resolver: self.inner.identity_resolver.as_deref(),
            parser: &*self.inner.parser,
            provider: &*self.inner.provider,
            denial_mode: self.inner.denial_mode,
        };
        let resp = crate::ops::call(req, &ccx).await;

        let duration = t0.elapsed();
        if resp.status().is_server_error() {
            error!(?duration, status = %resp.status());
        } else {
            debug!(?duration, status = %resp.status());
        }

        resp
    }

    async fn call_body<B>(self, req: http::Request<B>) -> Result<http::Response<Full<Bytes>>, Infallible>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let (parts, body) = req.into_parts();
        let resp = match body.collect().await {
            Ok(collected) => self.call(http::Request::from_parts(parts, collected.to_bytes())).await,
            Err(err) => {
                let err = GateError::with_source(GateErrorCode::InvalidRequest, Box::new(err));
                debug!(?err, "failed to read request body");
                crate::ops::serialize_error(&err)
            }
        };
        Ok(resp.map(Full::new))
    }
}

impl fmt::Debug for GateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateService")
            .field("operations", &self.inner.operations.len())
            .field("denial_mode", &self.inner.denial_mode)
            .finish_non_exhaustive()
    }
}

impl hyper::service::Service<http::Request<hyper::body::Incoming>> for GateService {
    type Response = http::Response<Full<Bytes>>;

    type Error = Infallible;

    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: http::Request<hyper::body::Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(service.call_body(req))
    }
}

impl<B> tower::Service<http::Request<B>> for GateService
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = http::Response<Full<Bytes>>;

    type Error = Infallible;

    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(service.call_body(req))
    }
}
