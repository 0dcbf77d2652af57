//! Denial mapping
//!
//! Facades answer with a bare [`SecurityResponse`](crate::security::SecurityResponse). How a
//! `Failure` looks to the client is decided here, by the router.

use crate::error::{GateError, GateErrorCode};
use crate::request::ParsedS3Request;

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// How a denied request is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenialMode {
    /// `401 AccessDenied`
    #[default]
    Unauthorized,
    /// `403 AccessDenied`
    Forbidden,
    /// `404 NoSuchKey`, or `404 NoSuchBucket` for requests without a key.
    ///
    /// Hides whether the denied resource exists.
    NotFound,
}

impl DenialMode {
    /// Builds the client-visible error for a denied request.
    #[must_use]
    pub fn denial_error(self, request: &ParsedS3Request) -> GateError {
        match self {
            Self::Unauthorized => {
                let mut err = GateError::with_message(GateErrorCode::AccessDenied, "Access Denied");
                err.set_status_code(StatusCode::UNAUTHORIZED);
                err
            }
            Self::Forbidden => GateError::with_message(GateErrorCode::AccessDenied, "Access Denied"),
            Self::NotFound if request.key_in_bucket.is_empty() => gate_error!(NoSuchBucket),
            Self::NotFound => gate_error!(NoSuchKey),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(bucket: &str, key: &str) -> ParsedS3Request {
        ParsedS3Request {
            bucket: bucket.into(),
            key_in_bucket: key.into(),
            ..Default::default()
        }
    }

    #[test]
    fn denial_statuses() {
        let req = request("bucket", "key");

        let err = DenialMode::default().denial_error(&req);
        assert_eq!(err.code(), &GateErrorCode::AccessDenied);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = DenialMode::Forbidden.denial_error(&req);
        assert_eq!(err.code(), &GateErrorCode::AccessDenied);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = DenialMode::NotFound.denial_error(&req);
        assert_eq!(err.code(), &GateErrorCode::NoSuchKey);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = DenialMode::NotFound.denial_error(&request("bucket", ""));
        assert_eq!(err.code(), &GateErrorCode::NoSuchBucket);
    }

    #[test]
    fn serde_names() {
        let modes: Vec<DenialMode> = serde_json::from_str(r#"["unauthorized", "forbidden", "not-found"]"#).unwrap();
        assert_eq!(modes, [DenialMode::Unauthorized, DenialMode::Forbidden, DenialMode::NotFound]);
    }
}
