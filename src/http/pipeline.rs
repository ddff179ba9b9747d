//! Request admission pipeline.
//!
//! # Data Flow
//! ```text
//! Request + RequestContext
//!     → stage 1 .. stage N   (each may answer and stop the chain)
//!     → Dispatcher            (resolve route, forward)
//! ```
//!
//! # Design Decisions
//! - Stages are plain objects behind one trait, each testable alone
//! - The order is fixed per listener and built once at startup
//! - Per-request state (the resolved route) travels in `RequestContext`,
//!   not in untyped request extensions

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};

use crate::http::dispatch::Dispatcher;
use crate::routing::Route;

/// Which listener accepted the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    /// Plain HTTP.
    Insecure,
    /// TLS terminated here.
    Secure,
}

impl ListenerKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            ListenerKind::Insecure => "http",
            ListenerKind::Secure => "https",
        }
    }
}

/// Per-request values threaded through the stages.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Client address of the connection.
    pub remote: SocketAddr,
    /// Port of the listener that accepted the connection.
    pub local_port: u16,
    pub listener: ListenerKind,
    /// Route resolved by an earlier stage, reused by later ones.
    pub route: Option<Arc<Route>>,
}

impl RequestContext {
    pub fn new(remote: SocketAddr, local_port: u16, listener: ListenerKind) -> Self {
        Self {
            remote,
            local_port,
            listener,
            route: None,
        }
    }

    /// Attach the resolved route.
    pub fn bind(&mut self, route: Arc<Route>) {
        self.route = Some(route);
    }
}

/// Outcome of one stage.
#[derive(Debug)]
pub enum Flow {
    /// Hand the (possibly modified) request to the next stage.
    Continue(Request<Body>),
    /// Stop here and send this response.
    Respond(Response),
}

/// One interceptor in the admission chain.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn intercept(&self, ctx: &mut RequestContext, req: Request<Body>) -> Flow;
}

/// Fixed, ordered list of stages in front of the dispatcher.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    dispatcher: Arc<Dispatcher>,
}

impl Pipeline {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            stages: Vec::new(),
            dispatcher,
        }
    }

    /// Append a stage; stages run in insertion order.
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run the request through every stage, then dispatch.
    pub async fn run(&self, mut ctx: RequestContext, req: Request<Body>) -> Response {
        let mut req = req;
        for stage in &self.stages {
            match stage.intercept(&mut ctx, req).await {
                Flow::Continue(next) => req = next,
                Flow::Respond(response) => {
                    tracing::debug!(stage = stage.name(), status = %response.status(), "Request answered by stage");
                    return response;
                }
            }
        }
        self.dispatcher.dispatch(&ctx, req).await
    }
}
