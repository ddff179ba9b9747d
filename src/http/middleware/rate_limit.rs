//! Per-client admission.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
};

use crate::http::pipeline::{Flow, RequestContext, Stage};
use crate::observability::metrics;
use crate::security::{classify, RateLimiter};

/// Answers 429 once the caller's bucket is empty.
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Stage for RateLimit {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn intercept(&self, ctx: &mut RequestContext, req: Request<Body>) -> Flow {
        let ip = ctx.remote.ip();
        if self.limiter.check(ip) {
            return Flow::Continue(req);
        }

        let class = classify(ip);
        tracing::debug!(ip = %ip, class = class.as_str(), "Rate limit exceeded");
        metrics::record_rate_limited(class.as_str());
        Flow::Respond((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateLimitParams, RateLimits};
    use crate::http::pipeline::ListenerKind;

    #[tokio::test(start_paused = true)]
    async fn rejects_after_burst() {
        let limiter = Arc::new(RateLimiter::new(RateLimits {
            internal: RateLimitParams { rate: 1000.0, burst: 1000 },
            external: RateLimitParams { rate: 1.0, burst: 2 },
        }));
        let stage = RateLimit::new(limiter);
        let mut ctx = RequestContext::new("203.0.113.50:1234".parse().unwrap(), 443, ListenerKind::Secure);

        for _ in 0..2 {
            let flow = stage.intercept(&mut ctx, Request::new(Body::empty())).await;
            assert!(matches!(flow, Flow::Continue(_)));
        }
        match stage.intercept(&mut ctx, Request::new(Body::empty())).await {
            Flow::Respond(response) => assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS),
            Flow::Continue(_) => panic!("third request should be limited"),
        }

        // private callers draw from their own, larger budget
        let mut lan = RequestContext::new("192.168.1.20:1234".parse().unwrap(), 443, ListenerKind::Secure);
        assert!(matches!(stage.intercept(&mut lan, Request::new(Body::empty())).await, Flow::Continue(_)));
    }
}
