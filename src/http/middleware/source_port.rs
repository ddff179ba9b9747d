//! Source-port default routing.
//!
//! A caller that dials an address instead of a name (no Host, or a bare IP)
//! on a port with its own default route goes straight to that default.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request};

use crate::http::dispatch::Dispatcher;
use crate::http::pipeline::{Flow, RequestContext, Stage};
use crate::routing::matcher::{is_bare_ip, request_host};

pub struct SourcePortDefault {
    dispatcher: Arc<Dispatcher>,
}

impl SourcePortDefault {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Stage for SourcePortDefault {
    fn name(&self) -> &'static str {
        "source-port"
    }

    async fn intercept(&self, ctx: &mut RequestContext, req: Request<Body>) -> Flow {
        let host = request_host(&req).unwrap_or_default().to_string();
        if !host.is_empty() && !is_bare_ip(&host) {
            return Flow::Continue(req);
        }

        let Some(route) = self.dispatcher.routes().resolve_port_default(ctx.local_port) else {
            tracing::debug!(host = %host, port = ctx.local_port, "Not a source port connection");
            return Flow::Continue(req);
        };

        tracing::info!(
            destination = route.destination(),
            source_port = ctx.local_port,
            "Sending source port default request"
        );
        Flow::Respond(
            self.dispatcher
                .serve_route(&route, ctx, req, &host, "source_port")
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::http::forward::upstream_client;
    use crate::net::upstream_tls_config;
    use crate::http::pipeline::ListenerKind;
    use crate::routing::RouteTable;
    use axum::http::StatusCode;
    use std::time::Duration;

    fn stage() -> SourcePortDefault {
        let table = RouteTable::new(upstream_client(Duration::from_secs(1), upstream_tls_config(None).unwrap()));
        let mut scoped = RouteConfig::new(&["default"], "");
        scoped.source_port = Some(8080);
        scoped.always_404 = true;
        table.register(&scoped).unwrap();
        SourcePortDefault::new(Arc::new(Dispatcher::new(Arc::new(table))))
    }

    fn request(host: &str) -> Request<Body> {
        Request::builder().uri("/").header("host", host).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn bare_ip_on_scoped_port_hits_default() {
        let stage = stage();
        let mut ctx = RequestContext::new("203.0.113.3:1000".parse().unwrap(), 8080, ListenerKind::Insecure);
        match stage.intercept(&mut ctx, request("192.0.2.10")).await {
            Flow::Respond(response) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
            Flow::Continue(_) => panic!("bare IP should be served by the port default"),
        }
    }

    #[tokio::test]
    async fn names_and_other_ports_pass() {
        let stage = stage();
        let mut ctx = RequestContext::new("203.0.113.3:1000".parse().unwrap(), 8080, ListenerKind::Insecure);
        assert!(matches!(stage.intercept(&mut ctx, request("a.example.com")).await, Flow::Continue(_)));

        let mut ctx = RequestContext::new("203.0.113.3:1000".parse().unwrap(), 80, ListenerKind::Insecure);
        assert!(matches!(stage.intercept(&mut ctx, request("192.0.2.10")).await, Flow::Continue(_)));
    }
}
