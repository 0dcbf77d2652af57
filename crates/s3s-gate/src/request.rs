//! Parsed S3 requests
//!
//! The security layer never looks at raw HTTP. An [`S3RequestParser`] turns the request into a
//! [`ParsedS3Request`] first: bucket, key, verb and the lowercase action.

use crate::error::GateResult;

use std::net::{IpAddr, SocketAddr};

use http::{HeaderMap, Method, Uri};
use tracing::debug;

/// Bucket/key/action view of an incoming call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedS3Request {
    /// Empty for service-level calls.
    pub bucket: String,
    /// Empty for bucket-level calls.
    pub key_in_bucket: String,
    pub http_verb: Method,
    pub raw_path: String,
    pub raw_query: String,
    /// Decoded query parameters, in request order.
    pub query: Vec<(String, String)>,
    /// The sub-resource the call addresses, e.g. `acl` for `GET /bucket/key?acl`.
    pub lowercase_action: Option<String>,
}

impl ParsedS3Request {
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

/// Parses an HTTP request into a [`ParsedS3Request`].
pub trait S3RequestParser: Send + Sync + 'static {
    /// # Errors
    /// Returns `InvalidURI` or `InvalidRequest` if the request cannot be parsed.
    fn parse(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> GateResult<ParsedS3Request>;
}

/// Path-style parser with optional virtual-hosted-style support.
///
/// With a base domain configured, `Host: bucket.s3.example.com` addresses `bucket`; requests
/// to the bare domain or to an IP address fall back to path-style.
///
/// ```
/// use s3s_gate::request::{DefaultRequestParser, S3RequestParser};
/// use http::{HeaderMap, Method, Uri};
///
/// let parser = DefaultRequestParser::new();
/// let uri = Uri::from_static("/my-bucket/dir/file.txt?tagging");
/// let req = parser.parse(&Method::GET, &uri, &HeaderMap::new()).unwrap();
/// assert_eq!(req.bucket, "my-bucket");
/// assert_eq!(req.key_in_bucket, "dir/file.txt");
/// assert_eq!(req.lowercase_action.as_deref(), Some("tagging"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DefaultRequestParser {
    domain: Option<String>,
}

impl DefaultRequestParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
        }
    }

    fn virtual_host_bucket<'h>(&self, headers: &'h HeaderMap) -> GateResult<Option<&'h str>> {
        let Some(domain) = self.domain.as_deref() else { return Ok(None) };
        let Some(val) = headers.get(http::header::HOST) else { return Ok(None) };
        let host = val
            .to_str()
            .map_err(|_| gate_error!(InvalidRequest, "invalid header: Host: {val:?}"))?;

        if is_socket_addr_or_ip_addr(host) {
            return Ok(None);
        }

        let host_without_port = match host.rsplit_once(':') {
            Some((h, port)) if port.bytes().all(|b| b.is_ascii_digit()) => h,
            _ => host,
        };

        Ok(host_without_port
            .strip_suffix(domain)
            .and_then(|prefix| prefix.strip_suffix('.'))
            .filter(|bucket| !bucket.is_empty()))
    }
}

fn is_socket_addr_or_ip_addr(host: &str) -> bool {
    host.parse::<SocketAddr>().is_ok() || host.parse::<IpAddr>().is_ok()
}

fn lowercase_action(query: &[(String, String)]) -> Option<String> {
    query
        .iter()
        .map(|(k, _)| k)
        .find(|k| !k.to_ascii_lowercase().starts_with("x-amz-"))
        .map(|k| k.to_ascii_lowercase())
}

impl S3RequestParser for DefaultRequestParser {
    fn parse(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> GateResult<ParsedS3Request> {
        let raw_path = uri.path();
        let decoded_path = urlencoding::decode(raw_path).map_err(|_| gate_error!(InvalidURI))?;
        let path = decoded_path.strip_prefix('/').unwrap_or(&decoded_path);

        let (bucket, key_in_bucket) = match self.virtual_host_bucket(headers)? {
            Some(bucket) => (bucket.to_owned(), path.to_owned()),
            None => match path.split_once('/') {
                Some((bucket, key)) => (bucket.to_owned(), key.to_owned()),
                None => (path.to_owned(), String::new()),
            },
        };

        let raw_query = uri.query().unwrap_or_default();
        let query: Vec<(String, String)> =
            serde_urlencoded::from_str(raw_query).map_err(|_| gate_error!(InvalidURI, "invalid query string"))?;

        let parsed = ParsedS3Request {
            bucket,
            key_in_bucket,
            http_verb: method.clone(),
            raw_path: raw_path.to_owned(),
            raw_query: raw_query.to_owned(),
            lowercase_action: lowercase_action(&query),
            query,
        };
        debug!(bucket = %parsed.bucket, key = %parsed.key_in_bucket, action = ?parsed.lowercase_action, "parsed request");
        Ok(parsed)
    }
}
