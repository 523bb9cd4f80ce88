//! One-shot HTTP/1.1 GET client used by network probes.
//!
//! Each request opens its own connection (plain TCP or rustls over TCP),
//! performs a hyper HTTP/1 handshake, and hands the streaming response
//! back to the caller. Timeouts are applied by the caller around the whole
//! exchange.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{Method, Request, Response, Uri};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{ProbeError, ProbeResult};

const DEFAULT_USER_AGENT: &str = concat!("zscaler/", env!("CARGO_PKG_VERSION"));

/// URL scheme supported by [`HttpClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// A validated request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: String,
    scheme: Scheme,
    host: String,
    port: u16,
    authority: String,
    path_and_query: String,
}

impl Target {
    /// Parse and validate an absolute `http://` or `https://` URL.
    pub fn parse(url: &str) -> ProbeResult<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e: http::uri::InvalidUri| ProbeError::invalid_url(url, e.to_string()))?;

        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            Some(other) => {
                return Err(ProbeError::invalid_url(
                    url,
                    format!("unsupported scheme {other:?}"),
                ));
            }
            None => return Err(ProbeError::invalid_url(url, "missing scheme")),
        };

        let host = match uri.host() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(ProbeError::invalid_url(url, "missing host")),
        };

        let port = uri.port_u16().unwrap_or(match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        });

        let authority = match uri.port_u16() {
            Some(p) => format!("{host}:{p}"),
            None => host.clone(),
        };

        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/")
            .to_string();

        Ok(Self {
            url: url.to_string(),
            scheme,
            host,
            port,
            authority,
            path_and_query,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host as used for name resolution and SNI (IPv6 brackets removed).
    pub fn connect_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Value of the `Host` header.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Shared HTTP client. Cheap to clone; safe to use from many tasks.
#[derive(Clone)]
pub struct HttpClient {
    tls: TlsConnector,
    user_agent: Arc<str>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client trusting the Mozilla root certificate store.
    pub fn new() -> Result<Self, rustls::Error> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self::with_tls_config(Arc::new(config)))
    }

    /// Create a client from a pre-built `rustls` configuration
    /// (private CAs, client certificates).
    pub fn with_tls_config(config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            tls: TlsConnector::from(config),
            user_agent: Arc::from(DEFAULT_USER_AGENT),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Arc::from(user_agent.into());
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Issue a GET against `target` and return the response with its body
    /// still unread.
    pub async fn get(&self, target: &Target) -> ProbeResult<Response<Incoming>> {
        let url = target.as_str();
        let stream = TcpStream::connect((target.connect_host(), target.port()))
            .await
            .map_err(|e| {
                debug!(error = %e, %url, "probe connection failed");
                ProbeError::transport(url, e)
            })?;

        match target.scheme() {
            Scheme::Http => self.send(TokioIo::new(stream), target).await,
            Scheme::Https => {
                let server_name = ServerName::try_from(target.connect_host().to_string())
                    .map_err(|e| ProbeError::invalid_url(url, e.to_string()))?;
                let tls = self.tls.connect(server_name, stream).await.map_err(|e| {
                    debug!(error = %e, %url, "probe tls handshake failed");
                    ProbeError::transport(url, e)
                })?;
                self.send(TokioIo::new(tls), target).await
            }
        }
    }

    async fn send<I>(&self, io: I, target: &Target) -> ProbeResult<Response<Incoming>>
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let url = target.as_str();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| {
                debug!(error = %e, %url, "probe http handshake failed");
                ProbeError::transport(url, e)
            })?;

        // Drive the connection until the response body is dropped.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "probe connection closed with error");
            }
        });

        let req = Request::builder()
            .method(Method::GET)
            .uri(target.path_and_query())
            .header(HOST, target.authority())
            .header(USER_AGENT, self.user_agent())
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::invalid_url(url, e.to_string()))?;

        let resp = sender.send_request(req).await.map_err(|e| {
            debug!(error = %e, %url, "probe request failed");
            ProbeError::transport(url, e)
        })?;
        debug!(status = %resp.status(), %url, "probe response");
        Ok(resp)
    }
}
