//! The gateway every backend call goes through.
//!
//! # Design
//! `Gateway` owns the active endpoint handle, the transport and the decorator
//! pipeline. A call is split the way the request lifecycle is:
//! - `request` / `json_request` build an `HttpRequest` against the endpoint
//!   as it is at that moment, with the JSON content type.
//! - `execute` runs the request decorators, sends with the configured
//!   timeout, and hands transport failures to the failure decorators before
//!   returning them. Non-2xx responses come back as `HttpStatus` errors with
//!   status and body untouched; they never trigger fallback.
//!
//! `Gateway` is cheap to clone; clones share the endpoint and pipeline.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::endpoint::ActiveEndpoint;
use crate::error::{GatewayError, GatewayResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, APPLICATION_JSON, CONTENT_TYPE};
use crate::pipeline::{BearerAuth, FailureDecorator, FallbackRebind, RequestDecorator};
use crate::storage::CredentialStore;
use crate::transport::{ReqwestTransport, Transport};

#[derive(Clone)]
pub struct Gateway {
    endpoint: ActiveEndpoint,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    timeout: Duration,
    request_decorators: Vec<Arc<dyn RequestDecorator>>,
    failure_decorators: Vec<Arc<dyn FailureDecorator>>,
}

impl Gateway {
    /// Create a gateway with bearer-token attachment and fallback rebinding
    /// installed. `config` is taken as is; see `try_new`.
    pub fn new(
        config: &GatewayConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let endpoint = ActiveEndpoint::new(&config.resolve_base_url(), &config.fallback_url);
        debug!(base_url = %endpoint.current(), fallback = %endpoint.fallback(), "gateway configured");

        Self {
            request_decorators: vec![Arc::new(BearerAuth::new(store.clone(), endpoint.clone()))],
            failure_decorators: vec![Arc::new(FallbackRebind::new(endpoint.clone()))],
            endpoint,
            transport,
            store,
            timeout: config.timeout,
        }
    }

    /// Like `new`, but rejects a configuration with unusable URLs.
    pub fn try_new(
        config: &GatewayConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self::new(config, transport, store))
    }

    /// Gateway configured from the environment, sending over `reqwest`.
    pub fn from_env(store: Arc<dyn CredentialStore>) -> GatewayResult<Self> {
        Self::try_new(&GatewayConfig::from_env(), Arc::new(ReqwestTransport::new()), store)
    }

    /// Append a decorator that runs after the built-in ones.
    pub fn with_request_decorator(mut self, decorator: Arc<dyn RequestDecorator>) -> Self {
        self.request_decorators.push(decorator);
        self
    }

    pub fn with_failure_decorator(mut self, decorator: Arc<dyn FailureDecorator>) -> Self {
        self.failure_decorators.push(decorator);
        self
    }

    pub fn endpoint(&self) -> &ActiveEndpoint {
        &self.endpoint
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a request for `path` relative to the current base endpoint.
    pub fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        let mut request = HttpRequest::new(method, join_url(&self.endpoint.current(), path));
        request.set_header(CONTENT_TYPE, APPLICATION_JSON);
        request
    }

    pub fn json_request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
    ) -> GatewayResult<HttpRequest> {
        let body = serde_json::to_string(body).map_err(|e| GatewayError::Serialization(e.to_string()))?;
        Ok(self.request(method, path).with_body(body))
    }

    /// Send `request` through the pipeline.
    pub async fn execute(&self, mut request: HttpRequest) -> GatewayResult<HttpResponse> {
        for decorator in &self.request_decorators {
            decorator.decorate(&mut request).await;
        }

        let method = request.method;
        let url = request.url.clone();
        debug!(%method, %url, "sending request");

        let response = match self.transport.send(request, self.timeout).await {
            Ok(response) => response,
            Err(error) => {
                debug!(%method, %url, %error, "no response");
                for decorator in &self.failure_decorators {
                    decorator.on_transport_failure(&error).await;
                }
                return Err(GatewayError::Network(error));
            }
        };

        if !response.is_success() {
            debug!(%method, %url, status = response.status, "backend returned error status");
            return Err(GatewayError::HttpStatus {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }

    /// Execute `request` and deserialize the JSON body. An empty body reads
    /// as `null`, so `T = ()` accepts `204 No Content`.
    pub async fn call<T: DeserializeOwned>(&self, request: HttpRequest) -> GatewayResult<T> {
        let response = self.execute(request).await?;
        parse_body(&response.body)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        self.call(self.request(HttpMethod::Get, path)).await
    }

    pub async fn send_json<B, T>(&self, method: HttpMethod, path: &str, body: &B) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(self.json_request(method, path, body)?).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Post, path, body).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Put, path, body).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(HttpMethod::Patch, path, body).await
    }

    pub async fn delete(&self, path: &str) -> GatewayResult<()> {
        self.execute(self.request(HttpMethod::Delete, path)).await?;
        Ok(())
    }

    /// `GET /health`.
    pub async fn health(&self) -> GatewayResult<serde_json::Value> {
        self.get_json("/health").await
    }
}

fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> GatewayResult<T> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| GatewayError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::config::DEFAULT_TIMEOUT;
    use crate::error::TransportError;
    use crate::http::AUTHORIZATION;
    use crate::pipeline::tests::FailingStore;
    use crate::services::SessionService;
    use crate::storage::{MemoryStore, StorageKeys};

    const EMULATOR: &str = "http://10.0.2.2:4022/api";
    const LAN: &str = "http://192.168.100.4:4022/api";

    type Scripted = Result<HttpResponse, TransportError>;

    /// Replays scripted outcomes and records what was sent.
    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<Scripted>>,
        sent: Mutex<Vec<HttpRequest>>,
        timeouts: Mutex<Vec<Duration>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Default::default()
            })
        }

        fn sent(&self) -> Vec<HttpRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest, timeout: Duration) -> Scripted {
            self.sent.lock().unwrap().push(request);
            self.timeouts.lock().unwrap().push(timeout);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(200, "{}")))
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig::new(LAN).with_base_url(EMULATOR)
    }

    fn gateway(transport: Arc<ScriptedTransport>, store: Arc<dyn CredentialStore>) -> Gateway {
        Gateway::new(&config(), transport, store)
    }

    #[test]
    fn request_joins_base_and_sets_json_content_type() {
        let gw = gateway(ScriptedTransport::new(vec![]), Arc::new(MemoryStore::new()));
        let req = gw.request(HttpMethod::Get, "/cards");
        assert_eq!(req.url, format!("{EMULATOR}/cards"));
        assert_eq!(req.header(CONTENT_TYPE), Some(APPLICATION_JSON));
        assert!(req.header(AUTHORIZATION).is_none());
        assert!(req.body.is_none());

        assert_eq!(gw.request(HttpMethod::Get, "cards").url, format!("{EMULATOR}/cards"));
    }

    #[test]
    fn json_request_serializes_body() {
        let gw = gateway(ScriptedTransport::new(vec![]), Arc::new(MemoryStore::new()));
        let req = gw
            .json_request(HttpMethod::Post, "/auth/login", &serde_json::json!({"email": "a@b.c"}))
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["email"], "a@b.c");
    }

    #[tokio::test]
    async fn stored_token_is_sent_as_bearer() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(200, "[]"))]);
        let store = Arc::new(MemoryStore::with_entry(StorageKeys::SESSION_TOKEN, "abc123"));
        let gw = gateway(transport.clone(), store);

        let cards: Vec<serde_json::Value> = gw.get_json("/cards").await.unwrap();
        assert!(cards.is_empty());

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header(AUTHORIZATION), Some("Bearer abc123"));
    }

    #[tokio::test]
    async fn missing_token_still_sends_request() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(200, r#"{"status":"ok"}"#))]);
        let gw = gateway(transport.clone(), Arc::new(MemoryStore::new()));

        let health = gw.health().await.unwrap();
        assert_eq!(health["status"], "ok");

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].header(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn storage_failure_still_sends_request() {
        let transport = ScriptedTransport::new(vec![]);
        let gw = gateway(transport.clone(), Arc::new(FailingStore));

        gw.execute(gw.request(HttpMethod::Get, "/health")).await.unwrap();
        assert!(transport.sent()[0].header(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn connection_refused_rebinds_and_rejects() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::ConnectionRefused)]);
        let gw = gateway(transport.clone(), Arc::new(MemoryStore::new()));

        let err = gw.execute(gw.request(HttpMethod::Get, "/cards")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Network(TransportError::ConnectionRefused)));
        assert_eq!(gw.endpoint().current(), LAN);

        gw.execute(gw.request(HttpMethod::Get, "/cards")).await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent[0].url, format!("{EMULATOR}/cards"));
        assert_eq!(sent[1].url, format!("{LAN}/cards"));
    }

    #[tokio::test]
    async fn failure_on_fallback_keeps_fallback() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout)]);
        let gw = Gateway::new(&GatewayConfig::new(LAN), transport, Arc::new(MemoryStore::new()));

        let err = gw.execute(gw.request(HttpMethod::Get, "/cards")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Network(TransportError::Timeout)));
        assert_eq!(gw.endpoint().current(), LAN);
    }

    #[tokio::test]
    async fn http_error_status_passes_through() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(404, r#"{"message":"no card"}"#))]);
        let gw = gateway(transport, Arc::new(MemoryStore::new()));

        let err = gw.execute(gw.request(HttpMethod::Get, "/cards/42")).await.unwrap_err();
        match err {
            GatewayError::HttpStatus { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, r#"{"message":"no card"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(gw.endpoint().current(), EMULATOR);
    }

    #[tokio::test]
    async fn unauthorized_is_not_handled_by_gateway() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(401, "unauthorized"))]);
        let store = Arc::new(MemoryStore::with_entry(StorageKeys::SESSION_TOKEN, "expired"));
        let gw = gateway(transport, store.clone());

        let err = gw.get_json::<serde_json::Value>("/cards").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(
            store.get(StorageKeys::SESSION_TOKEN).await.unwrap().as_deref(),
            Some("expired")
        );
    }

    #[tokio::test]
    async fn legacy_token_used_after_fallback_until_replaced() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::ConnectionRefused)]);
        let store = Arc::new(MemoryStore::with_entry(StorageKeys::LEGACY_SESSION_TOKEN, "old"));
        let gw = gateway(transport.clone(), store.clone());

        let _ = gw.execute(gw.request(HttpMethod::Get, "/cards")).await;
        assert!(transport.sent()[0].header(AUTHORIZATION).is_none());

        gw.execute(gw.request(HttpMethod::Get, "/cards")).await.unwrap();
        assert_eq!(transport.sent()[1].header(AUTHORIZATION), Some("Bearer old"));

        store.set(StorageKeys::SESSION_TOKEN, "fresh").await.unwrap();
        gw.execute(gw.request(HttpMethod::Get, "/cards")).await.unwrap();
        assert_eq!(transport.sent()[2].header(AUTHORIZATION), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn no_authorization_after_fallback_then_logout() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::ConnectionRefused)]);
        let store = Arc::new(MemoryStore::with_entry(StorageKeys::LEGACY_SESSION_TOKEN, "old"));
        let gw = gateway(transport.clone(), store.clone());

        let err = gw.health().await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(gw.endpoint().current(), LAN);

        SessionService::new(gw.clone()).logout().await.unwrap();
        assert!(store.get(StorageKeys::SESSION_TOKEN).await.unwrap().is_none());
        assert!(store.get(StorageKeys::LEGACY_SESSION_TOKEN).await.unwrap().is_none());

        gw.health().await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent[1].url, format!("{LAN}/health"));
        assert!(sent[1].header(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn no_credential_after_fallback_sends_no_authorization() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Timeout)]);
        let gw = gateway(transport.clone(), Arc::new(MemoryStore::new()));

        let _ = gw.execute(gw.request(HttpMethod::Get, "/cards")).await;
        gw.execute(gw.request(HttpMethod::Get, "/cards")).await.unwrap();
        assert!(transport.sent()[1].header(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn default_timeout_reaches_transport() {
        let transport = ScriptedTransport::new(vec![]);
        let gw = Gateway::new(
            &GatewayConfig::default(),
            transport.clone(),
            Arc::new(MemoryStore::new()),
        );

        for method in [
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Patch,
            HttpMethod::Delete,
        ] {
            gw.execute(gw.request(method, "/cards")).await.unwrap();
        }
        gw.health().await.unwrap();

        let timeouts = transport.timeouts.lock().unwrap().clone();
        assert_eq!(timeouts.len(), 6);
        assert!(timeouts.iter().all(|t| *t == Duration::from_secs(10)));
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn configured_timeout_reaches_transport() {
        let transport = ScriptedTransport::new(vec![]);
        let config = config().with_timeout(Duration::from_secs(3));
        let gw = Gateway::new(&config, transport.clone(), Arc::new(MemoryStore::new()));

        gw.post_json::<_, serde_json::Value>("/auth/login", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(transport.timeouts.lock().unwrap()[0], Duration::from_secs(3));
    }

    #[test]
    fn try_new_rejects_empty_fallback() {
        let config = GatewayConfig::new("");
        let result = Gateway::try_new(&config, ScriptedTransport::new(vec![]), Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(GatewayError::Config(_))));

        let result = Gateway::try_new(
            &GatewayConfig::default(),
            ScriptedTransport::new(vec![]),
            Arc::new(MemoryStore::new()),
        );
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn empty_body_parses_as_unit() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(204, ""))]);
        let gw = gateway(transport, Arc::new(MemoryStore::new()));
        gw.delete("/notification/1").await.unwrap();
    }

    #[tokio::test]
    async fn bad_json_is_deserialization_error() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(200, "not json"))]);
        let gw = gateway(transport, Arc::new(MemoryStore::new()));
        let err = gw.get_json::<Vec<serde_json::Value>>("/cards").await.unwrap_err();
        assert!(matches!(err, GatewayError::Deserialization(_)));
    }

    /// Records the request, then holds it until released.
    struct GatedTransport {
        sent: Mutex<Vec<String>>,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, request: HttpRequest, _timeout: Duration) -> Scripted {
            self.sent.lock().unwrap().push(request.url);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(HttpResponse::new(200, "{}"))
        }
    }

    #[tokio::test]
    async fn in_flight_request_keeps_its_address_across_rebind() {
        let transport = Arc::new(GatedTransport {
            sent: Mutex::new(Vec::new()),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let gw = Gateway::new(&config(), transport.clone(), Arc::new(MemoryStore::new()));

        let in_flight = {
            let gw = gw.clone();
            tokio::spawn(async move { gw.execute(gw.request(HttpMethod::Get, "/cards")).await })
        };
        transport.entered.notified().await;

        assert!(gw.endpoint().rebind_to_fallback());
        transport.release.notify_one();
        let response = in_flight.await.unwrap().unwrap();
        assert_eq!(response.status, 200);

        let next = gw.request(HttpMethod::Get, "/cards");
        assert_eq!(next.url, format!("{LAN}/cards"));
        assert_eq!(transport.sent.lock().unwrap().clone(), vec![format!("{EMULATOR}/cards")]);
    }

    struct Tagger;

    #[async_trait]
    impl RequestDecorator for Tagger {
        async fn decorate(&self, request: &mut HttpRequest) {
            request.set_header("x-client", "mobile");
        }
    }

    #[tokio::test]
    async fn extra_decorators_run_after_builtins() {
        let transport = ScriptedTransport::new(vec![]);
        let store = Arc::new(MemoryStore::with_entry(StorageKeys::SESSION_TOKEN, "abc123"));
        let gw = gateway(transport.clone(), store).with_request_decorator(Arc::new(Tagger));

        gw.execute(gw.request(HttpMethod::Get, "/cards")).await.unwrap();
        let sent = &transport.sent()[0];
        assert_eq!(sent.header("x-client"), Some("mobile"));
        assert_eq!(sent.header(AUTHORIZATION), Some("Bearer abc123"));
    }
}
