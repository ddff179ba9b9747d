//! Upgrade public callers from HTTP to HTTPS.
//!
//! Private-network callers pass through untouched so LAN clients and the
//! certificate challenge path keep working over plain HTTP.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::pipeline::{Flow, RequestContext, Stage};
use crate::observability::metrics;
use crate::routing::matcher::request_host;
use crate::security::{classify, NetworkClass};

pub struct HttpsRedirect;

impl HttpsRedirect {
    /// `https://` + host + original path and query.
    pub fn location<B>(req: &Request<B>) -> String {
        let host = request_host(req).unwrap_or_default();
        let path = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("https://{}{}", host, path)
    }
}

#[async_trait]
impl Stage for HttpsRedirect {
    fn name(&self) -> &'static str {
        "https-redirect"
    }

    async fn intercept(&self, ctx: &mut RequestContext, req: Request<Body>) -> Flow {
        if classify(ctx.remote.ip()) == NetworkClass::Private {
            return Flow::Continue(req);
        }

        let location = Self::location(&req);
        let Ok(value) = HeaderValue::from_str(&location) else {
            return Flow::Respond((StatusCode::BAD_REQUEST, "invalid redirect target").into_response());
        };
        tracing::debug!(source = %ctx.remote, location = %location, "Redirecting to HTTPS");
        metrics::record_redirect();

        let mut response: Response = StatusCode::FOUND.into_response();
        response.headers_mut().insert(header::LOCATION, value);
        Flow::Respond(response)
    }
}
