//! Pipeline stages.
//!
//! Insecure listener order:
//! ```text
//! bind-route → rate-limit → source-port → host-header → [https-redirect] → [auth-gate] → dispatch
//! ```
//! Secure listener order:
//! ```text
//! rate-limit → host-header → dispatch
//! ```

pub mod auth_gate;
pub mod bind_route;
pub mod host_header;
pub mod https_redirect;
pub mod rate_limit;
pub mod source_port;

pub use auth_gate::AuthGate;
pub use bind_route::BindRoute;
pub use host_header::RequireHost;
pub use https_redirect::HttpsRedirect;
pub use rate_limit::RateLimit;
pub use source_port::SourcePortDefault;
