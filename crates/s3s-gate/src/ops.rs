//! Operations and the authorization pipeline
//!
//! An incoming request is matched against the registered [`Operation`]s. The first match
//! wins. What happens next depends on the operation's declared
//! [`AccessRequirement`]:
//!
//! - `Public`: the operation is called directly. No identity, no policy.
//! - `SigV4(service)`: the identity resolver runs first and its errors go to the client as is.
//!   Then the request is parsed, a facade is obtained for it and invoked once with the
//!   lowercase action. `Success` calls the operation; `Failure` becomes the configured denial.

use crate::access::{AccessRegistry, AccessRequirement};
use crate::auth::{Identity, IdentityContext, IdentityResolver};
use crate::error::{GateError, GateErrorCode, GateResult};
use crate::outcome::DenialMode;
use crate::request::{ParsedS3Request, S3RequestParser};
use crate::security::SecurityFacadeProvider;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use tracing::{debug, error};

/// A request as seen by an [`Operation`].
#[derive(Debug)]
pub struct GateRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,

    /// The verified caller. `None` for public operations.
    pub identity: Option<Identity>,

    /// The parsed request the facade decided on. `None` for public operations.
    pub parsed: Option<ParsedS3Request>,
}

impl GateRequest {
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            identity: None,
            parsed: None,
        }
    }
}

/// A named handler the gateway dispatches to.
///
/// Every operation must be declared in the [`AccessRegistry`] under its [`name`](Self::name).
#[async_trait::async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Returns the operation name (e.g., "GetObject", "AssumeRole")
    fn name(&self) -> &'static str;

    fn is_match(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> bool;

    /// Runs the operation. Only called once the request has been authorized.
    async fn call(&self, req: GateRequest) -> GateResult<http::Response<Bytes>>;
}

pub(crate) struct CallContext<'a> {
    pub registry: &'a AccessRegistry,
    pub operations: &'a [Box<dyn Operation>],
    pub identity_resolver: Option<&'a dyn IdentityResolver>,
    pub parser: &'a dyn S3RequestParser,
    pub provider: &'a dyn SecurityFacadeProvider,
    pub denial_mode: DenialMode,
}

struct Prepared<'a> {
    op: &'a dyn Operation,
    identity: Option<Identity>,
    parsed: Option<ParsedS3Request>,
}

pub(crate) fn serialize_error(err: &GateError) -> http::Response<Bytes> {
    let status = err.status_code();
    match err.to_xml() {
        Ok(xml) => {
            let mut res = http::Response::new(Bytes::from(xml));
            *res.status_mut() = status;
            res.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
            res
        }
        Err(e) => {
            error!(?e, "failed to serialize error");
            let mut res = http::Response::new(Bytes::new());
            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            res
        }
    }
}

fn unknown_operation() -> GateError {
    GateError::with_message(GateErrorCode::NotImplemented, "Unknown operation")
}

pub(crate) async fn call(mut req: GateRequest, ccx: &CallContext<'_>) -> http::Response<Bytes> {
    let prep = match prepare(&req, ccx).await {
        Ok(prep) => prep,
        Err(err) => {
            debug!(?err, "request rejected");
            return serialize_error(&err);
        }
    };

    req.identity = prep.identity;
    req.parsed = prep.parsed;

    match prep.op.call(req).await {
        Ok(resp) => resp,
        Err(err) => {
            if err.status_code().is_server_error() {
                error!(op = %prep.op.name(), ?err, "op returns error");
            } else {
                debug!(op = %prep.op.name(), ?err, "op returns error");
            }
            serialize_error(&err)
        }
    }
}

#[tracing::instrument(level = "debug", skip_all, err)]
async fn prepare<'a>(req: &GateRequest, ccx: &CallContext<'a>) -> GateResult<Prepared<'a>> {
    let op: &'a dyn Operation = ccx
        .operations
        .iter()
        .find(|op| op.is_match(&req.method, &req.uri, &req.headers))
        .map(|op| &**op)
        .ok_or_else(unknown_operation)?;

    let Some(requirement) = ccx.registry.requirement_of(op.name()) else {
        error!(op = %op.name(), "operation has no access requirement");
        return Err(gate_error!(InternalError));
    };
    debug!(op = %op.name(), ?requirement);

    let AccessRequirement::SigV4(service) = requirement else {
        return Ok(Prepared {
            op,
            identity: None,
            parsed: None,
        });
    };

    let Some(resolver) = ccx.identity_resolver else {
        error!(op = %op.name(), "no identity resolver for a SigV4 operation");
        return Err(gate_error!(InternalError));
    };

    let cx = IdentityContext {
        service,
        method: &req.method,
        uri: &req.uri,
        headers: &req.headers,
    };
    let identity = resolver.resolve_identity(&cx).await?;

    let parsed = ccx.parser.parse(&req.method, &req.uri, &req.headers)?;

    let verdict = {
        let facade = ccx.provider.facade_for(&parsed, Some(&identity));
        facade.decide(parsed.lowercase_action.as_deref()).await
    };
    debug!(
        op = %op.name(),
        user = %identity,
        bucket = %parsed.bucket,
        key = %parsed.key_in_bucket,
        %verdict,
        "security decision"
    );

    if !verdict.is_success() {
        return Err(ccx.denial_mode.denial_error(&parsed));
    }

    Ok(Prepared {
        op,
        identity: Some(identity),
        parsed: Some(parsed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response() {
        let mut err = gate_error!(AccessDenied, "Access Denied");
        err.set_status_code(StatusCode::UNAUTHORIZED);

        let res = serialize_error(&err);
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers().get(CONTENT_TYPE).unwrap(), "application/xml");

        let body = std::str::from_utf8(res.body()).unwrap();
        assert!(body.contains("<Code>AccessDenied</Code>"));
        assert!(body.contains("<Message>Access Denied</Message>"));
    }

    #[test]
    fn unknown() {
        let res = serialize_error(&unknown_operation());
        assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
        assert!(std::str::from_utf8(res.body()).unwrap().contains("NotImplemented"));
    }
}
