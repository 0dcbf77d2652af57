//! Errors
//!
//! [`GateError`] is the client-visible error type: every per-request failure (authentication,
//! malformed request, denial) is turned into one and serialized as an S3 XML error document.
//!
//! [`ConfigError`] is startup-fatal. It is returned while building the service or loading the
//! configuration and never reaches a client.

use std::borrow::Cow;
use std::fmt;

use http::StatusCode;
use serde::Serialize;

pub type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type GateResult<T = (), E = GateError> = Result<T, E>;

/// Builds a [`GateError`] from an error code and an optional formatted message.
///
/// ```
/// use s3s_gate::{gate_error, GateErrorCode};
///
/// let err = gate_error!(AccessDenied, "Signature is required");
/// assert_eq!(err.code(), &GateErrorCode::AccessDenied);
/// assert_eq!(err.message(), Some("Signature is required"));
/// ```
#[macro_export]
macro_rules! gate_error {
    ($code:ident) => {
        $crate::GateError::new($crate::GateErrorCode::$code)
    };
    ($code:ident, $($arg:tt)+) => {
        $crate::GateError::with_message($crate::GateErrorCode::$code, format!($($arg)+))
    };
}

/// Error codes understood by AWS SDK clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum GateErrorCode {
    AccessDenied,
    AuthorizationHeaderMalformed,
    InternalError,
    InvalidAccessKeyId,
    InvalidRequest,
    InvalidURI,
    NoSuchBucket,
    NoSuchKey,
    NotImplemented,
    SignatureDoesNotMatch,
}

impl GateErrorCode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::AuthorizationHeaderMalformed => "AuthorizationHeaderMalformed",
            Self::InternalError => "InternalError",
            Self::InvalidAccessKeyId => "InvalidAccessKeyId",
            Self::InvalidRequest => "InvalidRequest",
            Self::InvalidURI => "InvalidURI",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::NotImplemented => "NotImplemented",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
        }
    }

    /// The HTTP status S3 uses for this code.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::AccessDenied | Self::InvalidAccessKeyId | Self::SignatureDoesNotMatch => StatusCode::FORBIDDEN,
            Self::AuthorizationHeaderMalformed | Self::InvalidRequest | Self::InvalidURI => StatusCode::BAD_REQUEST,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoSuchBucket | Self::NoSuchKey => StatusCode::NOT_FOUND,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

impl fmt::Display for GateErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client-visible request error.
pub struct GateError(Box<Inner>);

struct Inner {
    code: GateErrorCode,
    message: Option<Cow<'static, str>>,
    status_code: Option<StatusCode>,
    source: Option<StdError>,
}

impl GateError {
    #[must_use]
    pub fn new(code: GateErrorCode) -> Self {
        Self(Box::new(Inner {
            code,
            message: None,
            status_code: None,
            source: None,
        }))
    }

    #[must_use]
    pub fn with_message(code: GateErrorCode, msg: impl Into<Cow<'static, str>>) -> Self {
        let mut this = Self::new(code);
        this.0.message = Some(msg.into());
        this
    }

    #[must_use]
    pub fn with_source(code: GateErrorCode, source: StdError) -> Self {
        let mut this = Self::new(code);
        this.0.source = Some(source);
        this
    }

    #[must_use]
    pub fn code(&self) -> &GateErrorCode {
        &self.0.code
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.0.message.as_deref()
    }

    /// Overrides the status derived from the error code.
    pub fn set_status_code(&mut self, status: StatusCode) {
        self.0.status_code = Some(status);
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.0.status_code.unwrap_or_else(|| self.0.code.status_code())
    }

    /// Serializes the error as an S3 XML error document.
    ///
    /// # Errors
    /// Returns an error if the XML serializer fails.
    pub fn to_xml(&self) -> Result<String, quick_xml::se::SeError> {
        #[derive(Serialize)]
        #[serde(rename = "Error")]
        struct ErrorBody<'a> {
            #[serde(rename = "Code")]
            code: &'a str,
            #[serde(rename = "Message", skip_serializing_if = "Option::is_none")]
            message: Option<&'a str>,
        }

        let body = ErrorBody {
            code: self.0.code.as_str(),
            message: self.message(),
        };
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push_str(&quick_xml::se::to_string(&body)?);
        Ok(xml)
    }
}

impl From<GateErrorCode> for GateError {
    fn from(code: GateErrorCode) -> Self {
        Self::new(code)
    }
}

impl fmt::Debug for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("GateError");
        d.field("code", &self.0.code);
        if let Some(msg) = &self.0.message {
            d.field("message", msg);
        }
        if let Some(status) = &self.0.status_code {
            d.field("status_code", status);
        }
        if let Some(source) = &self.0.source {
            d.field("source", source);
        }
        d.finish()
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.message {
            Some(msg) => write!(f, "{}: {msg}", self.0.code),
            None => write!(f, "{}", self.0.code),
        }
    }
}

impl std::error::Error for GateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Startup-time configuration errors.
///
/// Any of these must stop the process before it starts serving.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("operation {0:?} has no declared access requirement")]
    UnclassifiedOperation(&'static str),

    #[error("operation {0:?} is declared more than once")]
    DuplicateDeclaration(&'static str),

    #[error("operation {0:?} is registered more than once")]
    DuplicateOperation(&'static str),

    #[error("operation {0:?} requires SigV4 but no identity resolver is configured")]
    MissingIdentityResolver(&'static str),

    #[error("opa security requires `server_base_uri`")]
    MissingOpaServerBaseUri,

    #[error("invalid opa server base uri {uri:?}: {reason}")]
    InvalidOpaServerBaseUri { uri: String, reason: String },

    #[error("policy request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("failed to build the policy http client")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to read configuration file")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration")]
    Json(#[from] serde_json::Error),
}
