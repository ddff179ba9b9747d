//! Authorization gate for `requireAuth` routes.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::auth::{AuthChecker, AuthRequest, SessionCache};
use crate::http::pipeline::{Flow, RequestContext, Stage};
use crate::observability::metrics;

/// Asks the checker before letting a caller reach a protected route.
///
/// Requests without a bound route, or bound to an unprotected one, pass.
/// A protected route with no checker configured denies everyone.
pub struct AuthGate {
    checker: Option<Arc<dyn AuthChecker>>,
    sessions: SessionCache,
    cookie_name: String,
    sign_in_url: Option<String>,
}

impl AuthGate {
    pub fn new(
        checker: Option<Arc<dyn AuthChecker>>,
        sessions: SessionCache,
        cookie_name: impl Into<String>,
        sign_in_url: Option<String>,
    ) -> Self {
        Self {
            checker,
            sessions,
            cookie_name: cookie_name.into(),
            sign_in_url,
        }
    }

    fn deny(&self, auth: &AuthRequest) -> Response {
        metrics::record_auth_denied();
        let Some(sign_in) = &self.sign_in_url else {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        };

        let mut target = match url::Url::parse(sign_in) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(sign_in_url = %sign_in, error = %e, "Invalid sign-in URL");
                return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
            }
        };
        target.query_pairs_mut().append_pair("rd", &auth.url);

        match HeaderValue::from_str(target.as_str()) {
            Ok(location) => {
                let mut response = StatusCode::FOUND.into_response();
                response.headers_mut().insert(header::LOCATION, location);
                response
            }
            Err(_) => (StatusCode::UNAUTHORIZED, "unauthorized").into_response(),
        }
    }
}

#[async_trait]
impl Stage for AuthGate {
    fn name(&self) -> &'static str {
        "auth-gate"
    }

    async fn intercept(&self, ctx: &mut RequestContext, req: Request<Body>) -> Flow {
        let protected = ctx.route.as_ref().is_some_and(|r| r.require_auth());
        if !protected {
            return Flow::Continue(req);
        }

        let auth = AuthRequest::from_request(&req, ctx.listener.scheme(), &self.cookie_name);
        if auth.session.as_deref().is_some_and(|s| self.sessions.is_valid(s)) {
            return Flow::Continue(req);
        }

        let Some(checker) = &self.checker else {
            tracing::error!(host = %auth.host, "Route requires auth but no checker is configured");
            return Flow::Respond(self.deny(&auth));
        };

        match checker.check(&auth).await {
            Ok(()) => {
                if let Some(session) = auth.session {
                    self.sessions.remember(session);
                }
                Flow::Continue(req)
            }
            Err(e) => {
                tracing::info!(host = %auth.host, source = %ctx.remote, error = %e, "Authorization denied");
                Flow::Respond(self.deny(&auth))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use crate::config::RouteConfig;
    use crate::http::forward::upstream_client;
    use crate::net::upstream_tls_config;
    use crate::http::pipeline::ListenerKind;
    use crate::routing::Route;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Allows exactly the session `good`, counting calls.
    #[derive(Default)]
    struct FakeChecker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthChecker for FakeChecker {
        async fn check(&self, req: &AuthRequest) -> Result<(), AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match req.session.as_deref() {
                Some("good") => Ok(()),
                _ => Err(AuthError::Denied { status: 403 }),
            }
        }
    }

    fn protected_ctx() -> RequestContext {
        let mut config = RouteConfig::new(&["app.example.com"], "http://10.0.0.9");
        config.require_auth = true;
        let client = upstream_client(Duration::from_secs(1), upstream_tls_config(None).unwrap());
        let route = Route::build(&config, &client).unwrap();
        let mut ctx = RequestContext::new("203.0.113.77:1000".parse().unwrap(), 80, ListenerKind::Insecure);
        ctx.bind(Arc::new(route));
        ctx
    }

    fn request(session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/inbox").header("host", "app.example.com");
        if let Some(s) = session {
            builder = builder.header("cookie", format!("namerouter_session={}", s));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn gate(checker: Option<Arc<dyn AuthChecker>>, sign_in: Option<&str>) -> AuthGate {
        AuthGate::new(
            checker,
            SessionCache::new(Duration::from_secs(300)),
            "namerouter_session",
            sign_in.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn valid_session_is_checked_once() {
        let checker = Arc::new(FakeChecker::default());
        let gate = gate(Some(checker.clone()), None);

        for _ in 0..3 {
            let flow = gate.intercept(&mut protected_ctx(), request(Some("good"))).await;
            assert!(matches!(flow, Flow::Continue(_)));
        }
        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn denial_is_401_or_sign_in_redirect() {
        let checker: Arc<dyn AuthChecker> = Arc::new(FakeChecker::default());

        match gate(Some(checker.clone()), None).intercept(&mut protected_ctx(), request(Some("bad"))).await {
            Flow::Respond(response) => assert_eq!(response.status(), StatusCode::UNAUTHORIZED),
            Flow::Continue(_) => panic!("bad session must be denied"),
        }

        let gate = gate(Some(checker), Some("https://auth.example.com/login"));
        match gate.intercept(&mut protected_ctx(), request(None)).await {
            Flow::Respond(response) => {
                assert_eq!(response.status(), StatusCode::FOUND);
                assert_eq!(
                    response.headers()[header::LOCATION],
                    "https://auth.example.com/login?rd=http%3A%2F%2Fapp.example.com%2Finbox"
                );
            }
            Flow::Continue(_) => panic!("missing session must be denied"),
        }
    }

    #[tokio::test]
    async fn unprotected_and_unconfigured() {
        let mut open = RequestContext::new("203.0.113.77:1000".parse().unwrap(), 80, ListenerKind::Insecure);
        assert!(matches!(gate(None, None).intercept(&mut open, request(None)).await, Flow::Continue(_)));

        match gate(None, None).intercept(&mut protected_ctx(), request(Some("good"))).await {
            Flow::Respond(response) => assert_eq!(response.status(), StatusCode::UNAUTHORIZED),
            Flow::Continue(_) => panic!("no checker means no access"),
        }
    }
}
