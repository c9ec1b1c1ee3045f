// Shared transport configuration and the HTTP seam used by the bridge client.
//
// `HttpTransport` is the only thing that touches the network. The reqwest
// implementation lives here; tests substitute recording fakes.

use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Body of a streaming response, chunk by chunk as it arrives.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// TLS verification mode.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (bridges serve a self-signed one).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Upper bound on establishing a TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Whole-request timeout for control and fetch calls. Never applied to
    /// the event stream body.
    pub request_timeout: Duration,
    /// HTTP/2 PING and TCP keep-alive cadence for long-lived connections.
    pub keep_alive: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(20),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(self.keep_alive)
            .http2_keep_alive_interval(self.keep_alive)
            .http2_keep_alive_timeout(self.keep_alive)
            .http2_keep_alive_while_idle(true)
            .user_agent(concat!("huelink/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

// ── Transport seam ───────────────────────────────────────────────────

/// Status and raw body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Minimal HTTP surface the bridge client needs.
///
/// An `Err` always means no HTTP response was obtained. Non-2xx statuses
/// come back as `Ok(HttpResponse)` from `get`/`put`; interpreting them is
/// the caller's job.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<HttpResponse, Error>;

    async fn put(
        &self,
        url: &Url,
        headers: &HeaderMap,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, Error>;

    /// Open a streaming GET. A non-2xx status is reported as
    /// [`Error::Status`] since there is no body to hand out.
    async fn stream(&self, url: &Url, headers: &HeaderMap) -> Result<ByteStream, Error>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
            request_timeout: config.request_timeout,
        })
    }

    /// Wrap a pre-built client (tests, custom proxies).
    pub fn with_client(http: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            http,
            request_timeout,
        }
    }

    fn map_err(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.request_timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }

    async fn finish(&self, resp: reqwest::Response) -> Result<HttpResponse, Error> {
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| self.map_err(e))?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<HttpResponse, Error> {
        debug!("GET {url}");
        let resp = self
            .http
            .get(url.clone())
            .headers(headers.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        self.finish(resp).await
    }

    async fn put(
        &self,
        url: &Url,
        headers: &HeaderMap,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, Error> {
        debug!("PUT {url}");
        let resp = self
            .http
            .put(url.clone())
            .headers(headers.clone())
            .json(body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        self.finish(resp).await
    }

    async fn stream(&self, url: &Url, headers: &HeaderMap) -> Result<ByteStream, Error> {
        debug!("GET (stream) {url}");
        let resp = self
            .http
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(resp.bytes_stream().map(|chunk| chunk.map_err(Error::Transport))))
    }
}
