//! Authorization collaborator.
//!
//! Routes flagged `requireAuth` ask an [`AuthChecker`] before forwarding.
//! The sign-in flow itself lives elsewhere; this side only asks "may this
//! caller through?" and remembers recent yeses in a [`SessionCache`].

pub mod remote;
pub mod session;

use async_trait::async_trait;
use axum::http::{header, HeaderValue, Request};
use thiserror::Error;

use crate::routing::matcher::request_host;

pub use remote::RemoteAuthCheck;
pub use session::SessionCache;

/// Why a caller was not let through.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization denied (status {status})")]
    Denied { status: u16 },

    #[error("authorization service unavailable: {0}")]
    Unavailable(String),
}

/// What the checker gets to see of a request.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Host the caller asked for.
    pub host: String,
    /// Full URL the caller asked for, used as the sign-in return address.
    pub url: String,
    /// Path and query only.
    pub uri: String,
    pub cookie: Option<HeaderValue>,
    pub authorization: Option<HeaderValue>,
    /// Value of the session cookie, if the caller sent one.
    pub session: Option<String>,
}

impl AuthRequest {
    pub fn from_request<B>(req: &Request<B>, scheme: &str, cookie_name: &str) -> Self {
        let host = request_host(req).unwrap_or_default().to_string();
        let uri = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let session = req
            .headers()
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|cookies| find_cookie(cookies, cookie_name));

        Self {
            url: format!("{}://{}{}", scheme, host, uri),
            host,
            uri,
            cookie: req.headers().get(header::COOKIE).cloned(),
            authorization: req.headers().get(header::AUTHORIZATION).cloned(),
            session,
        }
    }
}

fn find_cookie(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Decides whether a request may reach an auth-protected route.
#[async_trait]
pub trait AuthChecker: Send + Sync {
    async fn check(&self, req: &AuthRequest) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn extracts_session_and_url() {
        let req = Request::builder()
            .uri("/dash?tab=2")
            .header("host", "app.example.com")
            .header("cookie", "theme=dark; namerouter_session=abc123")
            .body(Body::empty())
            .unwrap();
        let auth = AuthRequest::from_request(&req, "https", "namerouter_session");

        assert_eq!(auth.url, "https://app.example.com/dash?tab=2");
        assert_eq!(auth.uri, "/dash?tab=2");
        assert_eq!(auth.session.as_deref(), Some("abc123"));
        assert!(auth.authorization.is_none());
    }

    #[test]
    fn missing_or_empty_cookie_is_no_session() {
        assert_eq!(find_cookie("a=1; b=2", "namerouter_session"), None);
        assert_eq!(find_cookie("namerouter_session=", "namerouter_session"), None);
    }
}
