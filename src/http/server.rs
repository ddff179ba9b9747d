//! Edge server setup and lifecycle.
//!
//! # Responsibilities
//! - Register configured routes (conflicts fail startup)
//! - Build the per-listener pipelines
//! - Bind insecure, secure (when `doSSL`) and health listeners before serving
//! - Wire up request id and tracing layers
//! - Coordinate graceful shutdown under one deadline
//!
//! # Design Decisions
//! - Each listener runs on its own `axum-server` with its own `Handle`
//! - A listener that dies at runtime is reported, not silently dropped
//! - Shutdown never fails: stragglers are logged and aborted

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    response::Response,
    Router,
};
use axum_server::{tls_rustls::RustlsAcceptor, Handle};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::auth::{AuthChecker, AuthError, RemoteAuthCheck, SessionCache};
use crate::config::{config_warnings, ConfigError, EdgeConfig, RouteConfig};
use crate::http::dispatch::Dispatcher;
use crate::http::forward::upstream_client;
use crate::http::health;
use crate::http::middleware::{AuthGate, BindRoute, HttpsRedirect, RateLimit, RequireHost, SourcePortDefault};
use crate::http::pipeline::{ListenerKind, Pipeline, RequestContext};
use crate::lifecycle::{Lifecycle, Shutdown};
use crate::net::{
    upstream_tls_config, BoundListener, CertificateProvider, ListenerError, ObservingAcceptor, PemCertificates,
    TlsError,
};
use crate::routing::{Route, RouteError, RouteTable};
use crate::security::RateLimiter;

/// Extra time past the grace period for servers to notice their forced close.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

/// Startup and runtime failures of the edge server.
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("doSSL is set but no certificate provider is configured")]
    MissingCertificates,

    #[error("{name} listener failed: {source}")]
    ListenerFailed {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// UUID v4 request ids for `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Application state injected into the edge handler.
#[derive(Clone)]
struct EdgeState {
    pipeline: Arc<Pipeline>,
    listener: ListenerKind,
    local_port: u16,
}

async fn edge_handler(
    State(state): State<EdgeState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let ctx = RequestContext::new(remote, state.local_port, state.listener);
    state.pipeline.run(ctx, request).await
}

/// Router for one request listener: pipeline behind request id and tracing.
fn edge_router(state: EdgeState) -> Router {
    Router::new()
        .fallback(edge_handler)
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}

/// A configured edge server that has not started yet.
pub struct EdgeServer {
    config: EdgeConfig,
    routes: Arc<RouteTable>,
    limiter: Arc<RateLimiter>,
    auth: Option<Arc<dyn AuthChecker>>,
    certificates: Option<Arc<dyn CertificateProvider>>,
}

impl EdgeServer {
    /// Register every configured route and prepare the collaborators.
    pub fn new(config: EdgeConfig) -> Result<Self, EdgeError> {
        for warning in config_warnings(&config) {
            tracing::warn!(%warning, "Configuration warning");
        }

        let upstream_tls = upstream_tls_config(config.upstream.ca_path.as_deref().map(Path::new))?;
        let client = upstream_client(Duration::from_secs(config.timeouts.connect_secs), upstream_tls);
        let routes = Arc::new(RouteTable::new(client));
        for route in &config.routes {
            routes.register(route)?;
        }

        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));

        let auth = match &config.auth.url {
            Some(url) => {
                let check = RemoteAuthCheck::new(url.clone(), Duration::from_secs(config.auth.timeout_secs))?;
                Some(Arc::new(check) as Arc<dyn AuthChecker>)
            }
            None => None,
        };

        let certificates = config.tls.as_ref().map(|tls| {
            Arc::new(PemCertificates::new(&tls.cert_path, &tls.key_path)) as Arc<dyn CertificateProvider>
        });

        tracing::info!(
            hosts = routes.len(),
            do_ssl = config.do_ssl,
            "Edge server configured"
        );

        Ok(Self {
            config,
            routes,
            limiter,
            auth,
            certificates,
        })
    }

    /// Replace the authorization collaborator.
    pub fn with_auth_checker(mut self, checker: Arc<dyn AuthChecker>) -> Self {
        self.auth = Some(checker);
        self
    }

    /// Replace the certificate collaborator.
    pub fn with_certificate_provider(mut self, provider: Arc<dyn CertificateProvider>) -> Self {
        self.certificates = Some(provider);
        self
    }

    pub fn add_route(&self, route: &RouteConfig) -> Result<Arc<Route>, RouteError> {
        self.routes.register(route)
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    pub fn state(&self) -> Lifecycle {
        Lifecycle::Created
    }

    fn secure_pipeline(&self, dispatcher: &Arc<Dispatcher>) -> Pipeline {
        Pipeline::new(Arc::clone(dispatcher))
            .stage(RateLimit::new(Arc::clone(&self.limiter)))
            .stage(RequireHost)
    }

    fn insecure_pipeline(&self, dispatcher: &Arc<Dispatcher>) -> Pipeline {
        let mut pipeline = Pipeline::new(Arc::clone(dispatcher))
            .stage(BindRoute::new(Arc::clone(&self.routes)))
            .stage(RateLimit::new(Arc::clone(&self.limiter)))
            .stage(SourcePortDefault::new(Arc::clone(dispatcher)))
            .stage(RequireHost);
        if self.config.do_ssl {
            pipeline = pipeline.stage(HttpsRedirect);
        }
        pipeline.stage(AuthGate::new(
            self.auth.clone(),
            SessionCache::new(Duration::from_secs(self.config.auth.session_ttl_secs)),
            self.config.auth.cookie_name.clone(),
            self.config.auth.sign_in_url.clone(),
        ))
    }

    /// Bind every listener, then start serving.
    pub async fn start(self) -> Result<RunningEdge, EdgeError> {
        let listeners = &self.config.listeners;
        let http = BoundListener::bind("http", &listeners.http).await?;
        let health = BoundListener::bind("health", &listeners.health).await?;
        let https = if self.config.do_ssl {
            Some(BoundListener::bind("https", &listeners.https).await?)
        } else {
            None
        };

        let tls = match &https {
            Some(_) => {
                let provider = self.certificates.as_ref().ok_or(EdgeError::MissingCertificates)?;
                Some(
                    provider
                        .tls_config(&self.routes.external_hosts(), &self.config.email)
                        .await?,
                )
            }
            None => None,
        };

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&self.routes)));
        let (failures_tx, failures) = mpsc::unbounded_channel();
        let mut tasks = Vec::new();

        let http_addr = http.local_addr();
        let pipeline = self.insecure_pipeline(&dispatcher);
        tracing::debug!(stages = ?pipeline.stage_names(), "Insecure pipeline");
        let insecure = edge_router(EdgeState {
            pipeline: Arc::new(pipeline),
            listener: ListenerKind::Insecure,
            local_port: http_addr.port(),
        });
        let handle = Handle::new();
        let serve = axum_server::from_tcp(http.into_std())
            .acceptor(ObservingAcceptor)
            .handle(handle.clone())
            .serve(insecure.into_make_service_with_connect_info::<SocketAddr>());
        tasks.push(ListenerTask::spawn("http", handle, serve, failures_tx.clone()));

        let mut https_addr = None;
        if let (Some(https), Some(tls)) = (https, tls) {
            let addr = https.local_addr();
            https_addr = Some(addr);
            let secure = edge_router(EdgeState {
                pipeline: Arc::new(self.secure_pipeline(&dispatcher)),
                listener: ListenerKind::Secure,
                local_port: addr.port(),
            });
            let handle = Handle::new();
            let serve = axum_server::from_tcp(https.into_std())
                .acceptor(RustlsAcceptor::new(tls).acceptor(ObservingAcceptor))
                .handle(handle.clone())
                .serve(secure.into_make_service_with_connect_info::<SocketAddr>());
            tasks.push(ListenerTask::spawn("https", handle, serve, failures_tx.clone()));
        }

        let health_addr = health.local_addr();
        let handle = Handle::new();
        let serve = axum_server::from_tcp(health.into_std())
            .handle(handle.clone())
            .serve(health::router().into_make_service());
        tasks.push(ListenerTask::spawn("health", handle, serve, failures_tx));

        let shutdown = Shutdown::new();
        let sweeper = self.limiter.spawn_sweeper(shutdown.subscribe());

        tracing::info!(
            http = %http_addr,
            https = ?https_addr,
            health = %health_addr,
            "Edge server running"
        );

        Ok(RunningEdge {
            state: Lifecycle::Running,
            http_addr,
            https_addr,
            health_addr,
            routes: self.routes,
            limiter: self.limiter,
            tasks,
            sweeper: Some(sweeper),
            shutdown,
            failures,
        })
    }
}

/// A listener that stopped on its own.
#[derive(Debug)]
struct ListenerFailure {
    name: &'static str,
    error: io::Error,
}

struct ListenerTask {
    name: &'static str,
    handle: Handle,
    task: JoinHandle<()>,
}

impl ListenerTask {
    fn spawn<F>(
        name: &'static str,
        handle: Handle,
        serve: F,
        failures: mpsc::UnboundedSender<ListenerFailure>,
    ) -> Self
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            match serve.await {
                Ok(()) => tracing::info!(listener = name, "Listener stopped"),
                Err(error) => {
                    tracing::error!(listener = name, error = %error, "Listener failed");
                    let _ = failures.send(ListenerFailure { name, error });
                }
            }
        });
        Self { name, handle, task }
    }
}

/// Handle to a started edge server.
pub struct RunningEdge {
    state: Lifecycle,
    http_addr: SocketAddr,
    https_addr: Option<SocketAddr>,
    health_addr: SocketAddr,
    routes: Arc<RouteTable>,
    limiter: Arc<RateLimiter>,
    tasks: Vec<ListenerTask>,
    sweeper: Option<JoinHandle<()>>,
    shutdown: Shutdown,
    failures: mpsc::UnboundedReceiver<ListenerFailure>,
}

impl RunningEdge {
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// `None` when TLS is disabled.
    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https_addr
    }

    pub fn health_addr(&self) -> SocketAddr {
        self.health_addr
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Register a route while serving. A conflict leaves the table as it was.
    /// Certificates are not reissued for hosts added this way.
    pub fn add_route(&self, route: &RouteConfig) -> Result<Arc<Route>, RouteError> {
        self.routes.register(route)
    }

    /// Drain every listener within `grace`, stop the sweep, and reach
    /// `Stopped`. Calling it again is a no-op.
    pub async fn shutdown(&mut self, grace: Duration) {
        if self.state != Lifecycle::Running {
            return;
        }
        self.state = Lifecycle::ShuttingDown;
        tracing::info!(grace_secs = grace.as_secs_f64(), "Shutting down");

        let deadline = Instant::now() + grace + SHUTDOWN_SLACK;
        for listener in &self.tasks {
            listener.handle.graceful_shutdown(Some(grace));
        }
        self.shutdown.trigger();

        for ListenerTask { name, mut task, .. } in self.tasks.drain(..) {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(listener = name, error = %e, "Listener task ended abnormally"),
                Err(_) => {
                    tracing::error!(listener = name, "Listener did not stop within grace period");
                    task.abort();
                }
            }
        }

        if let Some(mut sweeper) = self.sweeper.take() {
            if tokio::time::timeout_at(deadline, &mut sweeper).await.is_err() {
                tracing::error!("Visitor sweep did not stop within grace period");
                sweeper.abort();
            }
        }

        self.state = Lifecycle::Stopped;
        tracing::info!("Shutdown complete");
    }

    /// Serve until `signal` resolves or a listener fails, then shut down.
    pub async fn run_until<F>(mut self, signal: F, grace: Duration) -> Result<(), EdgeError>
    where
        F: Future<Output = ()>,
    {
        let failure = tokio::select! {
            _ = signal => None,
            failure = self.failures.recv() => failure,
        };

        self.shutdown(grace).await;

        match failure {
            Some(ListenerFailure { name, error }) => Err(EdgeError::ListenerFailed { name, source: error }),
            None => Ok(()),
        }
    }
}
