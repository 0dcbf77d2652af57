//! SigV4 credential scope
//!
//! `<access-key>/<yyyymmdd>/<region>/<service>/aws4_request`, carried either in the
//! `Credential=` field of the `Authorization` header or in the `X-Amz-Credential` query
//! parameter of a presigned URL.

use crate::error::GateResult;

use http::header::AUTHORIZATION;
use http::{HeaderMap, Uri};

const TERMINATOR: &str = "aws4_request";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    pub access_key: String,
    pub date: String,
    pub region: String,
    pub service: String,
}

impl CredentialScope {
    /// Parses a credential scope string.
    ///
    /// # Errors
    /// Returns `AuthorizationHeaderMalformed` if the scope has the wrong shape.
    pub fn parse(s: &str) -> GateResult<Self> {
        let mut parts = s.split('/');
        let (Some(access_key), Some(date), Some(region), Some(service), Some(TERMINATOR), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(gate_error!(AuthorizationHeaderMalformed, "invalid credential scope"));
        };

        if access_key.is_empty() || service.is_empty() {
            return Err(gate_error!(AuthorizationHeaderMalformed, "invalid credential scope"));
        }
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(gate_error!(AuthorizationHeaderMalformed, "invalid credential date"));
        }

        Ok(Self {
            access_key: access_key.to_owned(),
            date: date.to_owned(),
            region: region.to_owned(),
            service: service.to_owned(),
        })
    }

    /// Extracts the credential scope from a request.
    ///
    /// The `Authorization` header wins over the presigned query parameter. Returns `Ok(None)`
    /// for an unsigned request.
    ///
    /// # Errors
    /// Returns `AuthorizationHeaderMalformed` if a credential is present but unreadable.
    pub fn from_request(uri: &Uri, headers: &HeaderMap) -> GateResult<Option<Self>> {
        if let Some(val) = headers.get(AUTHORIZATION) {
            let val = val
                .to_str()
                .map_err(|_| gate_error!(AuthorizationHeaderMalformed, "invalid header: Authorization"))?;
            return Self::from_authorization(val).map(Some);
        }

        let Some(query) = uri.query() else { return Ok(None) };
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(query).map_err(|_| gate_error!(InvalidURI, "invalid query string"))?;
        match pairs.iter().find(|(k, _)| k == "X-Amz-Credential") {
            Some((_, v)) => Self::parse(v).map(Some),
            None => Ok(None),
        }
    }

    fn from_authorization(val: &str) -> GateResult<Self> {
        let Some((algorithm, rest)) = val.split_once(' ') else {
            return Err(gate_error!(AuthorizationHeaderMalformed, "missing signing algorithm"));
        };
        if !algorithm.starts_with("AWS4-") {
            return Err(gate_error!(
                AuthorizationHeaderMalformed,
                "unsupported signing algorithm: {algorithm}"
            ));
        }

        let credential = rest
            .split(',')
            .map(str::trim)
            .find_map(|field| field.strip_prefix("Credential="));

        match credential {
            Some(scope) => Self::parse(scope),
            None => Err(gate_error!(AuthorizationHeaderMalformed, "missing Credential")),
        }
    }
}
