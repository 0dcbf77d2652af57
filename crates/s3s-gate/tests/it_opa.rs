use s3s_gate::access::{AccessRegistry, AccessRequirement};
use s3s_gate::auth::SimpleIdentityResolver;
use s3s_gate::config::GateConfig;
use s3s_gate::ops::{GateRequest, Operation};
use s3s_gate::security::SecurityResponse;
use s3s_gate::security::opa::{HttpOpaClient, OpaClient, OpaRequest, PolicyError};
use s3s_gate::service::{GateService, GateServiceBuilder};
use s3s_gate::{GateResult, gate_error};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::debug;
use url::Url;

const BUCKET: &str = "opa-test-bucket";
const ACCESS_KEY: &str = "AKIDEXAMPLE";
const SIGNATURE: &str = "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240101/us-east-1/s3/aws4_request, \
                         SignedHeaders=host;x-amz-date, Signature=00";

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// A policy server that allows only `input.table == "good"` under `test/allow`.
/// The other decision paths answer with broken replies.
#[derive(Clone, Default)]
struct FakeOpa {
    calls: Arc<AtomicUsize>,
}

impl FakeOpa {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn serve(&self) -> Result<SocketAddr> {
        async fn allow(State(opa): State<FakeOpa>, Json(body): Json<Value>) -> Json<Value> {
            opa.calls.fetch_add(1, Ordering::SeqCst);
            debug!(%body, "policy request");
            Json(json!({ "result": body["input"]["table"] == "good" }))
        }

        async fn slow(State(opa): State<FakeOpa>, Json(_): Json<Value>) -> Json<Value> {
            opa.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "result": true }))
        }

        async fn broken(State(opa): State<FakeOpa>) -> impl IntoResponse {
            opa.calls.fetch_add(1, Ordering::SeqCst);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "result": true })))
        }

        async fn empty(State(opa): State<FakeOpa>) -> Json<Value> {
            opa.calls.fetch_add(1, Ordering::SeqCst);
            Json(json!({}))
        }

        async fn garbage(State(opa): State<FakeOpa>) -> &'static str {
            opa.calls.fetch_add(1, Ordering::SeqCst);
            "<html>allow</html>"
        }

        let app = Router::new()
            .route("/v1/data/test/allow", post(allow))
            .route("/v1/data/slow/allow", post(slow))
            .route("/v1/data/broken/allow", post(broken))
            .route("/v1/data/empty/allow", post(empty))
            .route("/v1/data/garbage/allow", post(garbage))
            .with_state(self.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, app).await });
        Ok(addr)
    }
}

/// Serves objects of one bucket from memory.
struct GetObject {
    objects: HashMap<&'static str, &'static str>,
}

#[async_trait::async_trait]
impl Operation for GetObject {
    fn name(&self) -> &'static str {
        "GetObject"
    }

    fn is_match(&self, method: &Method, uri: &Uri, _: &HeaderMap) -> bool {
        let path = uri.path().trim_start_matches('/');
        *method == Method::GET && path.split_once('/').is_some_and(|(_, key)| !key.is_empty())
    }

    async fn call(&self, req: GateRequest) -> GateResult<http::Response<Bytes>> {
        let Some(parsed) = req.parsed else {
            return Err(gate_error!(InternalError, "request was not parsed"));
        };
        if parsed.bucket != BUCKET {
            return Err(gate_error!(NoSuchBucket));
        }
        match self.objects.get(parsed.key_in_bucket.as_str()) {
            Some(content) => Ok(http::Response::new(Bytes::from_static(content.as_bytes()))),
            None => Err(gate_error!(NoSuchKey)),
        }
    }
}

struct Health;

#[async_trait::async_trait]
impl Operation for Health {
    fn name(&self) -> &'static str {
        "Health"
    }

    fn is_match(&self, method: &Method, uri: &Uri, _: &HeaderMap) -> bool {
        *method == Method::GET && uri.path() == "/health"
    }

    async fn call(&self, _: GateRequest) -> GateResult<http::Response<Bytes>> {
        Ok(http::Response::new(Bytes::from_static(b"ok")))
    }
}

fn gate_config(addr: SocketAddr, decision_path: &str, extra: &Value) -> Result<GateConfig> {
    let mut doc = json!({
        "security": {
            "type": "opa",
            "server_base_uri": format!("http://{addr}/v1/data"),
            "decision_path": decision_path,
            "timeout_ms": 1000,
            "fast_path": {
                "allow_keys": ["default-allow"],
                "deny_keys": ["default-deny"],
            },
        },
    });
    if let (Some(doc), Some(extra)) = (doc.as_object_mut(), extra.as_object()) {
        doc.extend(extra.clone());
    }
    Ok(GateConfig::from_json(&doc.to_string())?)
}

fn gate(config: &GateConfig) -> Result<GateService> {
    let registry = AccessRegistry::builder()
        .declare("Health", AccessRequirement::Public)
        .declare("GetObject", AccessRequirement::S3)
        .build()?;

    let mut builder = GateServiceBuilder::from_config(config)?;
    builder.set_access_registry(registry);
    builder.set_identity_resolver(SimpleIdentityResolver::from_single(ACCESS_KEY, "testing-user"));
    builder.add_operation(Health);
    builder.add_operation(GetObject {
        objects: HashMap::from([("default-allow", "allowed"), ("default-deny", "denied")]),
    });
    Ok(builder.build()?)
}

async fn setup(decision_path: &str, extra: &Value) -> Result<(FakeOpa, GateService)> {
    setup_tracing();
    let opa = FakeOpa::default();
    let addr = opa.serve().await?;
    let service = gate(&gate_config(addr, decision_path, extra)?)?;
    Ok((opa, service))
}

fn get(path: &str, signed: bool) -> http::Request<Bytes> {
    let mut req = http::Request::builder().method(Method::GET).uri(path);
    if signed {
        req = req.header(AUTHORIZATION, SIGNATURE);
    }
    req.body(Bytes::new()).unwrap()
}

fn error_code(resp: &http::Response<Bytes>) -> String {
    let body = std::str::from_utf8(resp.body()).unwrap();
    let start = body.find("<Code>").map(|i| i + "<Code>".len()).unwrap();
    let end = body.find("</Code>").unwrap();
    body[start..end].to_owned()
}

#[tokio::test]
async fn fast_path_allow() -> Result<()> {
    let (opa, service) = setup("test/allow", &json!({})).await?;

    let resp = service.call(get("/opa-test-bucket/default-allow", true)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.body().as_ref(), b"allowed");
    assert_eq!(opa.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn fast_path_deny() -> Result<()> {
    let (opa, service) = setup("test/allow", &json!({})).await?;

    let resp = service.call(get("/opa-test-bucket/default-deny", true)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&resp), "AccessDenied");
    assert_eq!(opa.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn remote_allow_reaches_backend() -> Result<()> {
    let (opa, service) = setup("test/allow", &json!({})).await?;

    let resp = service.call(get("/opa-test-bucket/good", true)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&resp), "NoSuchKey");
    assert_eq!(opa.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn remote_deny() -> Result<()> {
    let (opa, service) = setup("test/allow", &json!({})).await?;

    let resp = service.call(get("/opa-test-bucket/bad", true)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&resp), "AccessDenied");
    assert_eq!(opa.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn unsigned_request() -> Result<()> {
    let (opa, service) = setup("test/allow", &json!({})).await?;

    for key in ["default-allow", "good", "bad"] {
        let resp = service.call(get(&format!("/opa-test-bucket/{key}"), false)).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_code(&resp), "AccessDenied");
    }
    assert_eq!(opa.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn public_operation() -> Result<()> {
    let (opa, service) = setup("test/allow", &json!({})).await?;

    let resp = service.call(get("/health", false)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(opa.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn not_found_denial_mode() -> Result<()> {
    let (opa, service) = setup("test/allow", &json!({ "denial_mode": "not-found" })).await?;

    let resp = service.call(get("/opa-test-bucket/bad", true)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&resp), "NoSuchKey");

    let resp = service.call(get("/opa-test-bucket/default-deny", true)).await;
    assert_eq!(error_code(&resp), "NoSuchKey");

    assert_eq!(opa.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_policy_service() -> Result<()> {
    setup_tracing();

    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?
    };
    let service = gate(&gate_config(addr, "test/allow", &json!({}))?)?;

    let resp = service.call(get("/opa-test-bucket/good", true)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // fast-path rules still answer
    let resp = service.call(get("/opa-test-bucket/default-allow", true)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn policy_timeout() -> Result<()> {
    let (opa, service) = setup("slow/allow", &json!({})).await?;

    let resp = service.call(get("/opa-test-bucket/good", true)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(opa.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_requests() -> Result<()> {
    let (opa, service) = setup("test/allow", &json!({})).await?;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let key = if i % 2 == 0 { "good" } else { "bad" };
            let resp = service.call(get(&format!("/opa-test-bucket/{key}"), true)).await;
            (key, resp.status())
        }));
    }
    for task in tasks {
        let (key, status) = task.await?;
        let expected = if key == "good" { StatusCode::NOT_FOUND } else { StatusCode::UNAUTHORIZED };
        assert_eq!(status, expected, "{key}");
    }
    assert_eq!(opa.calls(), 20);
    Ok(())
}

#[tokio::test]
async fn failed_policy_replies_deny() -> Result<()> {
    for path in ["broken/allow", "empty/allow", "garbage/allow"] {
        let (opa, service) = setup(path, &json!({})).await?;

        let resp = service.call(get("/opa-test-bucket/good", true)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(error_code(&resp), "AccessDenied", "{path}");
        assert_eq!(opa.calls(), 1, "{path}");
    }
    Ok(())
}

#[tokio::test]
async fn error_status_ignores_body() -> Result<()> {
    setup_tracing();
    let opa = FakeOpa::default();
    let addr = opa.serve().await?;

    let client = HttpOpaClient::from_client(reqwest::Client::builder().timeout(Duration::from_secs(1)).build()?);
    let uri = Url::parse(&format!("http://{addr}/v1/data/broken/allow"))?;
    let request = OpaRequest::new(uri, json!({ "table": "good" }).as_object().cloned().unwrap_or_default());

    let result = client.evaluate(&request).await;
    assert!(
        matches!(result, Err(PolicyError::Status(status)) if status == StatusCode::INTERNAL_SERVER_ERROR),
        "{result:?}"
    );
    assert!(matches!(client.request_security_response(&request).await, SecurityResponse::Failure));
    assert_eq!(opa.calls(), 2);
    Ok(())
}
