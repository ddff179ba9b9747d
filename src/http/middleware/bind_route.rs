//! Resolve the Host header once and bind the route to the request.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request};

use crate::http::pipeline::{Flow, RequestContext, Stage};
use crate::routing::matcher::request_host;
use crate::routing::RouteTable;

/// Looks the host up and stores the result in the context. Never answers.
pub struct BindRoute {
    routes: Arc<RouteTable>,
}

impl BindRoute {
    pub fn new(routes: Arc<RouteTable>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl Stage for BindRoute {
    fn name(&self) -> &'static str {
        "bind-route"
    }

    async fn intercept(&self, ctx: &mut RequestContext, req: Request<Body>) -> Flow {
        if let Some(route) = request_host(&req).and_then(|host| self.routes.resolve(host)) {
            ctx.bind(route);
        }
        Flow::Continue(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::http::forward::upstream_client;
    use crate::net::upstream_tls_config;
    use crate::http::pipeline::ListenerKind;
    use std::time::Duration;

    #[tokio::test]
    async fn binds_known_host_only() {
        let client = upstream_client(Duration::from_secs(1), upstream_tls_config(None).unwrap());
        let table = Arc::new(RouteTable::new(client));
        table.register(&RouteConfig::new(&["a.example.com"], "http://10.0.0.5:8080")).unwrap();
        let stage = BindRoute::new(table);

        let mut ctx = RequestContext::new("10.1.1.1:4000".parse().unwrap(), 80, ListenerKind::Insecure);
        let req = Request::builder().header("host", "A.example.com").body(Body::empty()).unwrap();
        assert!(matches!(stage.intercept(&mut ctx, req).await, Flow::Continue(_)));
        assert_eq!(ctx.route.as_ref().map(|r| r.destination()), Some("http://10.0.0.5:8080"));

        let mut ctx = RequestContext::new("10.1.1.1:4000".parse().unwrap(), 80, ListenerKind::Insecure);
        let req = Request::builder().header("host", "b.example.com").body(Body::empty()).unwrap();
        assert!(matches!(stage.intercept(&mut ctx, req).await, Flow::Continue(_)));
        assert!(ctx.route.is_none());
    }
}
