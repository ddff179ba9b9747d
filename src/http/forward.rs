//! Upstream forwarding.
//!
//! # Responsibilities
//! - Parse a route destination into a forwarding target (once, at registration)
//! - Rewrite the request URI onto the target
//! - Stream request and response bodies without buffering
//! - Bridge protocol upgrades (WebSocket and friends) after a `101`
//! - Map transport failures to 502
//!
//! # Design Decisions
//! - Single attempt, no retries
//! - Original Host header is kept so upstream virtual hosting still works
//! - `http` and `https` destinations share one pooled client
//! - Client disconnect drops the handler future, which aborts the upstream call

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header,
        uri::{Authority, InvalidUri, Scheme},
        HeaderValue, Request, StatusCode, Uri, Version,
    },
    response::{IntoResponse, Response},
};
use hyper::upgrade::OnUpgrade;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
};
use thiserror::Error;
use url::Url;

use crate::http::pipeline::RequestContext;
use crate::observability::metrics;
use crate::routing::matcher::request_host;
use crate::security::headers::{restore_upgrade, set_forwarded, strip_hop_by_hop, upgrade_protocol};

/// Shared client used for every upstream.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the upstream client; `tls` verifies `https` destinations.
pub fn upstream_client(connect_timeout: Duration, tls: rustls::ClientConfig) -> UpstreamClient {
    let mut http = HttpConnector::new();
    http.set_connect_timeout(Some(connect_timeout));
    http.enforce_http(false);

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Why a destination could not become a forwarding target.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("destination has no host")]
    MissingHost,

    #[error("{0}")]
    Authority(#[from] InvalidUri),
}

/// Where a route sends its traffic.
#[derive(Debug, Clone)]
pub struct Target {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: Option<String>,
}

impl Target {
    /// Parse an absolute `http(s)://host[:port][/path][?query]` destination.
    pub fn parse(destination: &str) -> Result<Self, DestinationError> {
        let url = Url::parse(destination.trim())?;
        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(DestinationError::UnsupportedScheme(other.to_string())),
        };

        let host = url.host_str().ok_or(DestinationError::MissingHost)?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            scheme,
            authority: Authority::from_str(&authority)?,
            base_path: url.path().to_string(),
            base_query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    /// The URI the request for `original` is sent to.
    pub fn upstream_uri(&self, original: &Uri) -> Result<Uri, axum::http::Error> {
        let path = join_paths(&self.base_path, original.path());
        let query = match (self.base_query.as_deref(), original.query().filter(|q| !q.is_empty())) {
            (None, None) => None,
            (Some(base), None) => Some(base.to_string()),
            (None, Some(request)) => Some(request.to_string()),
            (Some(base), Some(request)) => Some(format!("{}&{}", base, request)),
        };
        let path_and_query = match query {
            Some(q) => format!("{}?{}", path, q),
            None => path,
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path)?;
        if let Some(q) = &self.base_query {
            write!(f, "?{}", q)?;
        }
        Ok(())
    }
}

/// Join two paths with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// The forwarding capability of a route.
#[derive(Clone)]
pub struct Forwarder {
    target: Target,
    client: UpstreamClient,
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder").field("target", &self.target).finish()
    }
}

impl Forwarder {
    pub fn new(target: Target, client: UpstreamClient) -> Self {
        Self { target, client }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Proxy `req` to the target and stream the answer back.
    pub async fn forward(&self, ctx: &RequestContext, mut req: Request<Body>) -> Response {
        let host = request_host(&req).map(str::to_string);
        let upgrade = upgrade_protocol(req.headers());
        let client_upgrade = upgrade.as_ref().map(|_| hyper::upgrade::on(&mut req));
        let (mut parts, body) = req.into_parts();

        parts.uri = match self.target.upstream_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(destination = %self.target, error = %e, "Failed to build upstream URI");
                return (StatusCode::BAD_REQUEST, "invalid request URI").into_response();
            }
        };

        strip_hop_by_hop(&mut parts.headers);
        if let Some(protocol) = upgrade {
            restore_upgrade(&mut parts.headers, protocol);
        }
        set_forwarded(&mut parts.headers, ctx.remote.ip(), host.as_deref(), ctx.listener.scheme());
        if !parts.headers.contains_key(header::HOST) {
            if let Some(value) = host.as_deref().and_then(|h| HeaderValue::from_str(h).ok()) {
                parts.headers.insert(header::HOST, value);
            }
        }
        // HTTP/2 clients on the secure listener still reach upstreams over HTTP/1.1
        parts.version = Version::HTTP_11;

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) if response.status() == StatusCode::SWITCHING_PROTOCOLS => {
                self.switch_protocols(ctx.remote, host.as_deref(), client_upgrade, response)
            }
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(
                    host = host.as_deref().unwrap_or_default(),
                    source = %ctx.remote,
                    destination = %self.target,
                    error = %e,
                    "Upstream request failed"
                );
                metrics::record_request("upstream_error");
                (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response()
            }
        }
    }

    /// Answer `101` to the client and splice both upgraded connections.
    fn switch_protocols<B>(
        &self,
        remote: SocketAddr,
        host: Option<&str>,
        client_upgrade: Option<OnUpgrade>,
        mut response: hyper::Response<B>,
    ) -> Response {
        let Some(client_upgrade) = client_upgrade else {
            tracing::error!(
                host = host.unwrap_or_default(),
                source = %remote,
                destination = %self.target,
                "Upstream switched protocols without being asked"
            );
            metrics::record_request("upstream_error");
            return (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response();
        };

        let upstream_upgrade = hyper::upgrade::on(&mut response);
        let (mut parts, _) = response.into_parts();
        let protocol = parts.headers.get(header::UPGRADE).cloned();
        strip_hop_by_hop(&mut parts.headers);
        if let Some(protocol) = protocol {
            restore_upgrade(&mut parts.headers, protocol);
        }

        let host = host.unwrap_or_default().to_string();
        let destination = self.target.to_string();
        tracing::debug!(host = %host, source = %remote, destination = %destination, "Switching protocols");
        tokio::spawn(async move {
            let (client, upstream) = match tokio::try_join!(client_upgrade, upstream_upgrade) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(host = %host, source = %remote, destination = %destination, error = %e, "Connection upgrade failed");
                    return;
                }
            };

            let mut client = TokioIo::new(client);
            let mut upstream = TokioIo::new(upstream);
            match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                Ok((sent, received)) => {
                    tracing::debug!(host = %host, source = %remote, destination = %destination, sent, received, "Upgraded connection closed")
                }
                Err(e) => {
                    tracing::debug!(host = %host, source = %remote, destination = %destination, error = %e, "Upgraded connection reset")
                }
            }
        });

        Response::from_parts(parts, Body::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_onto_target() {
        let target = Target::parse("http://10.0.0.5:8080").unwrap();
        let uri = target.upstream_uri(&"/foo?x=1".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.5:8080/foo?x=1");
    }

    #[test]
    fn joins_base_path_and_query() {
        let target = Target::parse("http://backend/app/?tenant=7").unwrap();
        let uri = target.upstream_uri(&"/api/items?page=2".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://backend/app/api/items?tenant=7&page=2");

        let bare = Target::parse("http://backend/app").unwrap();
        let uri = bare.upstream_uri(&"/".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://backend/app/");
        assert_eq!(join_paths("/app", "x"), "/app/x");
    }

    #[test]
    fn rejects_bad_destinations() {
        assert!(matches!(Target::parse("devnull"), Err(DestinationError::Parse(_))));
        assert!(matches!(
            Target::parse("ftp://10.0.0.5"),
            Err(DestinationError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(Target::parse("http://[::1]:9000").is_ok());
    }

    #[test]
    fn https_destination_keeps_its_scheme() {
        let target = Target::parse("https://10.0.0.7:5001/nas").unwrap();
        let uri = target.upstream_uri(&"/login".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "https://10.0.0.7:5001/nas/login");
        assert_eq!(target.to_string(), "https://10.0.0.7:5001/nas");
    }
}
