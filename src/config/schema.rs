//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.
//! Keys are camelCase to match the YAML files operators already keep.

use serde::{Deserialize, Deserializer, Serialize};

/// Root configuration for the edge router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EdgeConfig {
    /// Per-class token bucket parameters.
    pub rate_limits: RateLimits,

    /// Virtual host definitions.
    pub routes: Vec<RouteConfig>,

    /// Terminate TLS and upgrade public HTTP callers to HTTPS.
    #[serde(rename = "doSSL")]
    pub do_ssl: bool,

    /// Certificate contact address handed to the certificate provider.
    pub email: String,

    /// Verbose console logging.
    pub debug: bool,

    /// Listener bind addresses.
    pub listeners: ListenerConfig,

    /// Certificate material for the secure listener.
    pub tls: Option<TlsConfig>,

    /// Remote authorization settings for `requireAuth` routes.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,

    /// How `https` destinations are verified.
    pub upstream: UpstreamConfig,
}

impl EdgeConfig {
    /// Hostnames that need certificates: every external host of every route.
    pub fn external_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .routes
            .iter()
            .flat_map(|r| r.external_hosts())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }
}

/// Rate limits for the two network classes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimits {
    /// Private-network callers.
    pub internal: RateLimitParams,
    /// Everyone else.
    pub external: RateLimitParams,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            internal: RateLimitParams { rate: 1000.0, burst: 1000 },
            external: RateLimitParams { rate: 10.0, burst: 10 },
        }
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RateLimitParams {
    /// Tokens added per second.
    pub rate: f64,
    /// Bucket capacity; also the number of requests admitted back to back.
    pub burst: u32,
}

/// Host name reserved for default routes.
pub const DEFAULT_HOST: &str = "default";

/// A single virtual host entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteConfig {
    /// Hosts reachable only from the LAN (no certificate needed).
    pub internal: Vec<String>,

    /// Public hosts; these are put on the certificate.
    pub external: Vec<String>,

    /// Merged host list. Treated as external.
    pub hosts: Vec<String>,

    /// Upstream URI. Empty means the route swallows traffic.
    pub destination: String,

    /// Restricts a `default` entry to connections accepted on this local port.
    #[serde(deserialize_with = "deserialize_port", skip_serializing_if = "Option::is_none")]
    pub source_port: Option<u16>,

    /// Answer 404 to everything.
    #[serde(rename = "always404")]
    pub always_404: bool,

    /// Gate requests behind the authorization check.
    #[serde(alias = "doAuth")]
    pub require_auth: bool,
}

impl RouteConfig {
    /// A route forwarding `hosts` to `destination`.
    pub fn new(hosts: &[&str], destination: impl Into<String>) -> Self {
        Self {
            external: hosts.iter().map(|h| h.to_string()).collect(),
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Every host this route answers to, external first.
    pub fn all_hosts(&self) -> impl Iterator<Item = &str> {
        self.external
            .iter()
            .chain(self.hosts.iter())
            .chain(self.internal.iter())
            .map(String::as_str)
    }

    /// Certificate-bearing hosts, without the `default` marker.
    pub fn external_hosts(&self) -> impl Iterator<Item = String> + '_ {
        self.external
            .iter()
            .chain(self.hosts.iter())
            .filter(|h| !h.eq_ignore_ascii_case(DEFAULT_HOST))
            .cloned()
    }
}

/// Accepts `sourcePort: 8080` as well as `sourcePort: "8080"`.
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match Option::<PortRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortRepr::Number(port)) => Ok(Some(port)),
        Some(PortRepr::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid sourcePort {:?}", text))),
    }
}

/// Listener bind addresses.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plain HTTP listener.
    pub http: String,
    /// TLS listener (only bound when `doSSL` is set).
    pub https: String,
    /// Health probe listener.
    pub health: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http: "0.0.0.0:80".to_string(),
            https: "0.0.0.0:443".to_string(),
            health: "0.0.0.0:9000".to_string(),
        }
    }
}

/// TLS configuration for the secure listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// Path to certificate chain (PEM).
    pub cert_path: String,

    /// Path to private key (PEM).
    pub key_path: String,
}

/// Authorization collaborator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
    /// Endpoint answering 200 for authorized callers.
    pub url: Option<String>,

    /// Where denied browsers are sent. Without it denial is a bare 401.
    pub sign_in_url: Option<String>,

    /// Cookie carrying the caller's session.
    pub cookie_name: String,

    /// How long a checked session is trusted without asking again.
    pub session_ttl_secs: u64,

    /// Timeout for the remote check in seconds.
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: None,
            sign_in_url: None,
            cookie_name: "namerouter_session".to_string(),
            session_ttl_secs: 300,
            timeout_secs: 5,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time listeners get to drain in-flight requests on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            shutdown_grace_secs: 15,
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Start the Prometheus exporter.
    pub enabled: bool,

    /// Exporter bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Upstream connection settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// Extra PEM roots trusted for `https` destinations, on top of the
    /// system store. Private backends with their own CA go here.
    pub ca_path: Option<String>,
}
