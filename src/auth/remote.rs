//! Remote authorization check over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, COOKIE};

use crate::auth::{AuthChecker, AuthError, AuthRequest};

/// Asks an external endpoint: `200` lets the caller through, anything else
/// denies.
#[derive(Debug, Clone)]
pub struct RemoteAuthCheck {
    client: reqwest::Client,
    url: String,
}

impl RemoteAuthCheck {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AuthChecker for RemoteAuthCheck {
    async fn check(&self, req: &AuthRequest) -> Result<(), AuthError> {
        let mut call = self
            .client
            .get(&self.url)
            .header("x-forwarded-host", req.host.as_str())
            .header("x-forwarded-uri", req.uri.as_str());
        if let Some(cookie) = req.cookie.as_ref().and_then(|v| v.to_str().ok()) {
            call = call.header(COOKIE, cookie);
        }
        if let Some(authorization) = req.authorization.as_ref().and_then(|v| v.to_str().ok()) {
            call = call.header(AUTHORIZATION, authorization);
        }

        let response = call.send().await.map_err(|e| {
            tracing::error!(url = %self.url, error = %e, "Authorization check failed");
            AuthError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            Ok(())
        } else {
            tracing::debug!(host = %req.host, status = status.as_u16(), "Authorization denied");
            Err(AuthError::Denied {
                status: status.as_u16(),
            })
        }
    }
}
