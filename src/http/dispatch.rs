//! Dispatch handler: the last step of every pipeline.
//!
//! Resolution order:
//! 1. route bound by an earlier stage
//! 2. exact Host lookup
//! 3. default for the accepting port, then the global default
//!
//! A miss with no default answers 400 and names the host.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::pipeline::RequestContext;
use crate::observability::metrics;
use crate::routing::matcher::request_host;
use crate::routing::{Route, RouteTable};

/// Turns a request into a forwarded (or refused) response.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteTable>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub async fn dispatch(&self, ctx: &RequestContext, req: Request<Body>) -> Response {
        let host = request_host(&req).unwrap_or_default().to_string();

        if let Some(route) = ctx.route.clone() {
            return self.serve_route(&route, ctx, req, &host, "forwarded").await;
        }

        if let Some(route) = self.routes.resolve(&host) {
            return self.serve_route(&route, ctx, req, &host, "forwarded").await;
        }

        match self.routes.resolve_default(ctx.local_port) {
            Some(route) => {
                tracing::debug!(host = %host, port = ctx.local_port, "Using default route");
                self.serve_route(&route, ctx, req, &host, "default_route").await
            }
            None => {
                tracing::error!(
                    host = %host,
                    source = %ctx.remote,
                    request = %req.uri(),
                    "Host not configured"
                );
                metrics::record_request("host_not_configured");
                (StatusCode::BAD_REQUEST, format!("host not configured {}", host)).into_response()
            }
        }
    }

    /// Apply a resolved route.
    pub async fn serve_route(
        &self,
        route: &Route,
        ctx: &RequestContext,
        req: Request<Body>,
        host: &str,
        outcome: &'static str,
    ) -> Response {
        if route.always_404() {
            tracing::info!(host, source = %ctx.remote, request = %req.uri(), "Always 404");
            metrics::record_request("always_404");
            return (StatusCode::NOT_FOUND, "not found").into_response();
        }

        let Some(forwarder) = route.forwarder() else {
            tracing::error!(
                host,
                source = %ctx.remote,
                destination = route.destination(),
                request = %req.uri(),
                "Proxy not configured for host"
            );
            metrics::record_request("not_implemented");
            return (StatusCode::NOT_IMPLEMENTED, "proxy not configured for host").into_response();
        };

        tracing::info!(
            host,
            source = %ctx.remote,
            destination = route.destination(),
            request = %req.uri(),
            "Proxying request"
        );
        let response = forwarder.forward(ctx, req).await;
        if response.status() != StatusCode::BAD_GATEWAY {
            metrics::record_request(outcome);
        }
        response
    }
}
