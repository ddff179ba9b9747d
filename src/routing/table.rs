//! Route lookup.
//!
//! # Responsibilities
//! - Store registered routes keyed by normalized hostname
//! - Hold the global default and per-source-port defaults
//! - Answer lookups concurrently with registration
//!
//! # Design Decisions
//! - One read-write lock guards all three maps; lookups take it shared
//! - Routes are built before the write lock is taken, so a lookup sees a
//!   route fully registered or not at all
//! - A failed registration leaves the table untouched
//! - No lock is held while forwarding: lookups hand out `Arc<Route>`

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{RouteConfig, DEFAULT_HOST};
use crate::http::forward::UpstreamClient;
use crate::routing::matcher::normalize_host;
use crate::routing::route::{Route, RouteError};

#[derive(Debug, Default)]
struct Tables {
    hosts: HashMap<String, Arc<Route>>,
    global_default: Option<Arc<Route>>,
    port_defaults: HashMap<u16, Arc<Route>>,
}

/// Concurrency-safe hostname registry.
pub struct RouteTable {
    tables: RwLock<Tables>,
    client: UpstreamClient,
}

impl RouteTable {
    pub fn new(client: UpstreamClient) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            client,
        }
    }

    /// Build and register a route.
    pub fn register(&self, config: &RouteConfig) -> Result<Arc<Route>, RouteError> {
        let route = Arc::new(Route::build(config, &self.client)?);

        let mut tables = self.tables.write();

        for host in route.hosts() {
            if host == DEFAULT_HOST {
                let taken = match route.source_port() {
                    Some(port) => tables.port_defaults.contains_key(&port),
                    None => tables.global_default.is_some(),
                };
                if taken {
                    let host = match route.source_port() {
                        Some(port) => format!("{}:{}", DEFAULT_HOST, port),
                        None => DEFAULT_HOST.to_string(),
                    };
                    return Err(RouteError::Conflict { host });
                }
            } else if tables.hosts.contains_key(host) {
                return Err(RouteError::Conflict { host: host.to_string() });
            }
        }

        for host in route.hosts() {
            if host == DEFAULT_HOST {
                match route.source_port() {
                    Some(port) => {
                        tracing::info!(destination = route.destination(), source_port = port, "Registering source port default route");
                        tables.port_defaults.insert(port, Arc::clone(&route));
                    }
                    None => {
                        tracing::info!(destination = route.destination(), "Registering default route");
                        tables.global_default = Some(Arc::clone(&route));
                    }
                }
            } else {
                tracing::info!(host, destination = route.destination(), "Register host");
                tables.hosts.insert(host.to_string(), Arc::clone(&route));
            }
        }

        Ok(route)
    }

    /// Exact (case-insensitive) lookup of a Host header value.
    pub fn resolve(&self, host: &str) -> Option<Arc<Route>> {
        let host = normalize_host(host);
        if host == DEFAULT_HOST {
            return None;
        }
        self.tables.read().hosts.get(&host).cloned()
    }

    /// Fallback route for a connection accepted on `port`: the port-scoped
    /// default if one exists, else the global default.
    pub fn resolve_default(&self, port: u16) -> Option<Arc<Route>> {
        let tables = self.tables.read();
        tables
            .port_defaults
            .get(&port)
            .or(tables.global_default.as_ref())
            .cloned()
    }

    /// Only the default scoped to `port`.
    pub fn resolve_port_default(&self, port: u16) -> Option<Arc<Route>> {
        self.tables.read().port_defaults.get(&port).cloned()
    }

    /// Union of certificate-bearing hosts over all routes, sorted.
    pub fn external_hosts(&self) -> Vec<String> {
        let tables = self.tables.read();
        let mut hosts: Vec<String> = tables
            .hosts
            .values()
            .flat_map(|r| r.external_hosts().map(str::to_string).collect::<Vec<_>>())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    /// Number of registered hostnames (defaults excluded).
    pub fn len(&self) -> usize {
        self.tables.read().hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::forward::upstream_client;
    use crate::net::upstream_tls_config;
    use std::time::Duration;

    fn table() -> RouteTable {
        RouteTable::new(upstream_client(Duration::from_secs(1), upstream_tls_config(None).unwrap()))
    }

    fn route(hosts: &[&str], destination: &str) -> RouteConfig {
        RouteConfig::new(hosts, destination)
    }

    #[tokio::test]
    async fn resolves_exact_route() {
        let table = table();
        let a = table.register(&route(&["a.example.com"], "http://10.0.0.5:8080")).unwrap();
        let b = table.register(&route(&["b.example.com"], "http://10.0.0.5:8080")).unwrap();

        assert!(Arc::ptr_eq(&table.resolve("a.example.com").unwrap(), &a));
        assert!(Arc::ptr_eq(&table.resolve("B.Example.com").unwrap(), &b));
        assert!(table.resolve("c.example.com").is_none());
        assert!(table.resolve("a.example.com:8443").is_none());
    }

    #[tokio::test]
    async fn conflict_leaves_table_untouched() {
        let table = table();
        let first = table.register(&route(&["a.example.com"], "http://10.0.0.5")).unwrap();

        let err = table
            .register(&route(&["new.example.com", "a.example.com"], "http://10.0.0.6"))
            .unwrap_err();
        assert!(matches!(err, RouteError::Conflict { ref host } if host == "a.example.com"));

        assert!(Arc::ptr_eq(&table.resolve("a.example.com").unwrap(), &first));
        assert!(table.resolve("new.example.com").is_none());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn default_routes_by_scope() {
        let table = table();
        assert!(table.resolve_default(80).is_none());

        let global = table.register(&route(&["default"], "http://10.0.0.1")).unwrap();
        let mut scoped_config = route(&["default"], "http://10.0.0.2");
        scoped_config.source_port = Some(8080);
        let scoped = table.register(&scoped_config).unwrap();

        assert!(Arc::ptr_eq(&table.resolve_default(80).unwrap(), &global));
        assert!(Arc::ptr_eq(&table.resolve_default(443).unwrap(), &global));
        assert!(Arc::ptr_eq(&table.resolve_default(8080).unwrap(), &scoped));
        assert!(table.resolve_port_default(80).is_none());
        assert!(table.resolve("default").is_none());

        assert!(matches!(
            table.register(&route(&["default"], "http://10.0.0.3")),
            Err(RouteError::Conflict { .. })
        ));
        assert!(matches!(
            table.register(&scoped_config),
            Err(RouteError::Conflict { ref host }) if host == "default:8080"
        ));
    }

    #[tokio::test]
    async fn collects_external_hosts() {
        let table = table();
        let mut config = route(&["b.example.com", "default"], "http://10.0.0.5");
        config.internal = vec!["b.lan".into()];
        table.register(&config).unwrap();
        table.register(&route(&["a.example.com"], "http://10.0.0.6")).unwrap();

        assert_eq!(table.external_hosts(), vec!["a.example.com", "b.example.com"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_and_resolve() {
        let table = Arc::new(table());
        let writers: Vec<_> = (0..16)
            .map(|i| {
                let table = Arc::clone(&table);
                tokio::spawn(async move {
                    let host = format!("h{}.example.com", i);
                    table
                        .register(&route(&[host.as_str()], &format!("http://10.0.0.{}", i + 1)))
                        .unwrap()
                })
            })
            .collect();
        let readers: Vec<_> = (0..16)
            .map(|i| {
                let table = Arc::clone(&table);
                tokio::spawn(async move {
                    if let Some(route) = table.resolve(&format!("h{}.example.com", i)) {
                        assert_eq!(route.destination(), format!("http://10.0.0.{}", i + 1));
                    }
                })
            })
            .collect();

        for w in writers {
            w.await.unwrap();
        }
        for r in readers {
            r.await.unwrap();
        }
        assert_eq!(table.len(), 16);
    }
}
