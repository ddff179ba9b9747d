//! Host header presence.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
};

use crate::http::pipeline::{Flow, RequestContext, Stage};
use crate::routing::matcher::request_host;

/// Answers 400 when the request names no host.
pub struct RequireHost;

#[async_trait]
impl Stage for RequireHost {
    fn name(&self) -> &'static str {
        "host-header"
    }

    async fn intercept(&self, ctx: &mut RequestContext, req: Request<Body>) -> Flow {
        if request_host(&req).is_some() {
            return Flow::Continue(req);
        }
        tracing::error!(source = %ctx.remote, request = %req.uri(), "Host header not configured");
        Flow::Respond((StatusCode::BAD_REQUEST, "missing Host header").into_response())
    }
}
