//! The transport seam between the gateway and the network.
//!
//! # Design
//! A `Transport` executes one `HttpRequest` and returns whatever the server
//! answered, whatever the status. It reports only the case where no response
//! was obtained, classified into `TransportError`. Tests substitute scripted
//! transports; production uses `ReqwestTransport`.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `request`, giving up after `timeout`.
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| classify(&e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        // The server already answered; a failure past this point is not a
        // connectivity failure.
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Map a `reqwest` failure onto the transport taxonomy.
///
/// Timeouts and connect-phase failures are connectivity failures. The
/// underlying `io::Error` kind, when present, narrows a connect failure down
/// to a refused connection or a timeout.
pub(crate) fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return TransportError::ConnectionRefused,
                std::io::ErrorKind::TimedOut => return TransportError::Timeout,
                _ => {}
            }
        }
        source = cause.source();
    }

    if err.is_connect() {
        TransportError::Unreachable(err.to_string())
    } else {
        TransportError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};

    /// Answers one connection with headers and a short body, then stalls.
    fn stalling_server(hold: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
                .unwrap();
            stream.flush().unwrap();
            std::thread::sleep(hold);
        });
        addr
    }

    #[tokio::test]
    async fn closed_port_is_connection_refused() {
        // Bind then drop to get a local port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = ReqwestTransport::new();
        let request = HttpRequest::new(HttpMethod::Get, format!("http://127.0.0.1:{port}/api/health"));
        let err = transport
            .send(request, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_network_unreachable(), "got {err:?}");
    }

    #[tokio::test]
    async fn invalid_url_is_not_network_unreachable() {
        let transport = ReqwestTransport::new();
        let request = HttpRequest::new(HttpMethod::Get, "not a url");
        let err = transport
            .send(request, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn stalled_body_is_protocol_error() {
        let addr = stalling_server(Duration::from_secs(3));
        let transport = ReqwestTransport::new();
        let request = HttpRequest::new(HttpMethod::Get, format!("http://{addr}/api/cards"));
        let err = transport
            .send(request, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)), "got {err:?}");
        assert!(!err.is_network_unreachable());
    }

    #[tokio::test]
    async fn truncated_body_is_protocol_error() {
        let addr = stalling_server(Duration::ZERO);
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap();
        let transport = ReqwestTransport::with_client(client);
        let request = HttpRequest::new(HttpMethod::Get, format!("http://{addr}/api/cards"));
        let err = transport
            .send(request, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)), "got {err:?}");
    }

    #[test]
    fn methods_map_one_to_one() {
        assert_eq!(to_reqwest_method(HttpMethod::Get), reqwest::Method::GET);
        assert_eq!(to_reqwest_method(HttpMethod::Patch), reqwest::Method::PATCH);
        assert_eq!(to_reqwest_method(HttpMethod::Delete), reqwest::Method::DELETE);
    }
}
