//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and socket addresses
//! - Detect hosts claimed by more than one route
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EdgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{EdgeConfig, RateLimitParams, DEFAULT_HOST};
use crate::http::forward::Target;
use crate::routing::matcher::normalize_host;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("rateLimits.{class}.rate must be a non-negative number, got {rate}")]
    InvalidRate { class: &'static str, rate: f64 },

    #[error("routes[{index}] has no hosts")]
    RouteWithoutHosts { index: usize },

    #[error("routes[{index}] destination {destination:?}: {reason}")]
    InvalidDestination {
        index: usize,
        destination: String,
        reason: String,
    },

    #[error("host already registered {host}")]
    DuplicateHost { host: String },

    #[error("more than one default route for {scope}")]
    DuplicateDefault { scope: String },

    #[error("listeners.{listener} is not a socket address: {address:?}")]
    InvalidAddress {
        listener: &'static str,
        address: String,
    },

    #[error("doSSL requires a tls section")]
    MissingTls,

    #[error("routes[{index}] requires auth but auth.url is not set")]
    MissingAuthUrl { index: usize },
}

/// A legal but probably unintended combination of settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigWarning {
    #[error("routes[{index}] requires auth, but with doSSL its public callers are redirected to the secure listener, which does not check auth")]
    AuthSkippedOverTls { index: usize },
}

/// Combinations that load fine but weaken what the config seems to ask for.
pub fn config_warnings(config: &EdgeConfig) -> Vec<ConfigWarning> {
    if !config.do_ssl {
        return Vec::new();
    }
    config
        .routes
        .iter()
        .enumerate()
        .filter(|(_, route)| route.require_auth && !route.always_404)
        .map(|(index, _)| ConfigWarning::AuthSkippedOverTls { index })
        .collect()
}

/// Run every semantic check over `config`.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_rate("internal", &config.rate_limits.internal, &mut errors);
    check_rate("external", &config.rate_limits.external, &mut errors);

    let mut seen_hosts = HashSet::new();
    let mut seen_defaults = HashSet::new();

    for (index, route) in config.routes.iter().enumerate() {
        let mut hosts: Vec<String> = route.all_hosts().map(normalize_host).collect();
        hosts.sort();
        hosts.dedup();

        if hosts.is_empty() {
            errors.push(ValidationError::RouteWithoutHosts { index });
        }

        for host in hosts {
            if host == DEFAULT_HOST {
                let scope = match route.source_port {
                    Some(port) => format!("source port {}", port),
                    None => "all ports".to_string(),
                };
                if !seen_defaults.insert(scope.clone()) {
                    errors.push(ValidationError::DuplicateDefault { scope });
                }
            } else if !seen_hosts.insert(host.clone()) {
                errors.push(ValidationError::DuplicateHost { host });
            }
        }

        if !route.always_404 && !route.destination.is_empty() {
            if let Err(e) = Target::parse(&route.destination) {
                errors.push(ValidationError::InvalidDestination {
                    index,
                    destination: route.destination.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if route.require_auth && config.auth.url.is_none() {
            errors.push(ValidationError::MissingAuthUrl { index });
        }
    }

    let listeners = [
        ("http", &config.listeners.http),
        ("https", &config.listeners.https),
        ("health", &config.listeners.health),
    ];
    for (listener, address) in listeners {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                listener,
                address: address.clone(),
            });
        }
    }

    if config.do_ssl && config.tls.is_none() {
        errors.push(ValidationError::MissingTls);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_rate(class: &'static str, params: &RateLimitParams, errors: &mut Vec<ValidationError>) {
    if !params.rate.is_finite() || params.rate < 0.0 {
        errors.push(ValidationError::InvalidRate {
            class,
            rate: params.rate,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RouteConfig, TlsConfig};

    fn route(hosts: &[&str], destination: &str) -> RouteConfig {
        RouteConfig::new(hosts, destination)
    }

    #[test]
    fn accepts_minimal_config() {
        let mut config = EdgeConfig::default();
        config.routes.push(route(&["a.example.com"], "http://10.0.0.5:8080"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = EdgeConfig::default();
        config.rate_limits.external.rate = -1.0;
        config.routes.push(route(&["a.example.com"], "http://10.0.0.5"));
        config.routes.push(route(&["A.example.com"], "ftp://10.0.0.6"));
        config.routes.push(route(&[], "http://10.0.0.7"));
        config.listeners.health = "nowhere".into();
        config.do_ssl = true;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidRate { class: "external", rate: -1.0 }));
        assert!(errors.contains(&ValidationError::DuplicateHost { host: "a.example.com".into() }));
        assert!(errors.contains(&ValidationError::RouteWithoutHosts { index: 2 }));
        assert!(errors.contains(&ValidationError::MissingTls));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidDestination { index: 1, .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidAddress { listener: "health", .. })));
    }

    #[test]
    fn default_scopes_are_independent() {
        let mut config = EdgeConfig::default();
        config.routes.push(route(&["default"], "http://10.0.0.5"));
        let mut scoped = route(&["default"], "http://10.0.0.6");
        scoped.source_port = Some(8080);
        config.routes.push(scoped.clone());
        assert!(validate_config(&config).is_ok());

        config.routes.push(scoped);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateDefault { scope: "source port 8080".into() }]
        );
    }

    #[test]
    fn always_404_skips_destination_checks() {
        let mut config = EdgeConfig::default();
        let mut junk = route(&["junk.example.com"], "::not a url::");
        junk.always_404 = true;
        config.routes.push(junk);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn auth_routes_need_an_endpoint() {
        let mut config = EdgeConfig::default();
        let mut private = route(&["vault.example.com"], "http://10.0.0.9");
        private.require_auth = true;
        config.routes.push(private);
        config.tls = Some(TlsConfig { cert_path: "c".into(), key_path: "k".into() });

        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MissingAuthUrl { index: 0 }]
        );

        config.auth.url = Some("https://auth.example.com/check".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn warns_when_tls_redirect_skips_auth() {
        let mut config = EdgeConfig::default();
        let mut private = route(&["vault.example.com"], "http://10.0.0.9");
        private.require_auth = true;
        config.routes.push(route(&["open.example.com"], "http://10.0.0.8"));
        config.routes.push(private);
        assert!(config_warnings(&config).is_empty());

        config.do_ssl = true;
        assert_eq!(
            config_warnings(&config),
            vec![ConfigWarning::AuthSkippedOverTls { index: 1 }]
        );
    }
}
