//! Registered routes.
//!
//! A route is built once from its `RouteConfig` and never changes after
//! registration. The destination is parsed here so that a bad URI fails at
//! startup instead of on the first request.

use thiserror::Error;

use crate::config::{RouteConfig, DEFAULT_HOST};
use crate::http::forward::{DestinationError, Forwarder, Target, UpstreamClient};
use crate::routing::matcher::normalize_host;

/// Registration failures.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("host already registered {host}")]
    Conflict { host: String },

    #[error("failed to parse URL for destination host {destination:?}: {source}")]
    InvalidDestination {
        destination: String,
        #[source]
        source: DestinationError,
    },

    #[error("route has no hosts")]
    NoHosts,
}

/// A binding from hostnames to one destination.
#[derive(Debug)]
pub struct Route {
    external_hosts: Vec<String>,
    internal_hosts: Vec<String>,
    destination: String,
    source_port: Option<u16>,
    always_404: bool,
    require_auth: bool,
    forwarder: Option<Forwarder>,
}

impl Route {
    /// Build a route. `always404` routes and empty destinations get no
    /// forwarder; anything else must parse.
    pub fn build(config: &RouteConfig, client: &UpstreamClient) -> Result<Self, RouteError> {
        let external_hosts = normalized(config.external.iter().chain(config.hosts.iter()));
        let internal_hosts: Vec<String> = normalized(config.internal.iter())
            .into_iter()
            .filter(|h| !external_hosts.contains(h))
            .collect();

        if external_hosts.is_empty() && internal_hosts.is_empty() {
            return Err(RouteError::NoHosts);
        }

        let destination = config.destination.trim().to_string();
        let forwarder = if config.always_404 || destination.is_empty() {
            None
        } else {
            let target = Target::parse(&destination).map_err(|source| RouteError::InvalidDestination {
                destination: destination.clone(),
                source,
            })?;
            Some(Forwarder::new(target, client.clone()))
        };

        Ok(Self {
            external_hosts,
            internal_hosts,
            destination,
            source_port: config.source_port,
            always_404: config.always_404,
            require_auth: config.require_auth,
            forwarder,
        })
    }

    /// Every host this route answers to, `default` included.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.external_hosts
            .iter()
            .chain(self.internal_hosts.iter())
            .map(String::as_str)
    }

    /// Hosts that need a certificate.
    pub fn external_hosts(&self) -> impl Iterator<Item = &str> {
        self.external_hosts
            .iter()
            .map(String::as_str)
            .filter(|h| *h != DEFAULT_HOST)
    }

    pub fn is_default(&self) -> bool {
        self.hosts().any(|h| h == DEFAULT_HOST)
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn source_port(&self) -> Option<u16> {
        self.source_port
    }

    pub fn always_404(&self) -> bool {
        self.always_404
    }

    pub fn require_auth(&self) -> bool {
        self.require_auth
    }

    /// Forwarding capability; `None` for blackholes and `always404` routes.
    pub fn forwarder(&self) -> Option<&Forwarder> {
        self.forwarder.as_ref()
    }
}

fn normalized<'a>(hosts: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for host in hosts.map(|h| normalize_host(h)).filter(|h| !h.is_empty()) {
        if !out.contains(&host) {
            out.push(host);
        }
    }
    out
}
