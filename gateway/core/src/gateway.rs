//! Request Handler
//!
//! Entry point for every client request:
//!
//! 1. Pick a backend from the pool
//! 2. Non-GET requests are forwarded verbatim
//! 3. GET requests are planned; a split plan starts the split engine on its
//!    own task and the response streams back immediately
//! 4. Anything not split is forwarded verbatim
//!
//! Once a split response has started, no backend failure can change its
//! status: the client always receives a well-formed (possibly shorter) array.

use std::sync::Arc;

use bytes::Bytes;
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::config::GatewaySettings;
use crate::proxy::{channel_body, full, BoxError, GatewayBody, PassThroughForwarder};
use crate::routing::{BackendPool, PlanDecision, SplitPlanner};
use crate::streaming::{SplitEngine, SubRequestExecutor};

/// Errors constructing a [`Gateway`]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The outbound HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Shared, immutable request handler
#[derive(Clone, Debug)]
pub struct Gateway {
    base: Arc<str>,
    pool: Arc<BackendPool>,
    planner: Arc<SplitPlanner>,
    engine: SplitEngine,
    forwarder: PassThroughForwarder,
    body_capacity: usize,
}

impl Gateway {
    /// Build a gateway from validated settings
    ///
    /// # Errors
    ///
    /// Returns an error if the outbound HTTP client cannot be created.
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        let client = SubRequestExecutor::build_client(&settings.executor)?;
        let executor = SubRequestExecutor::new(client.clone(), settings.executor.max_line_bytes);

        Ok(Self {
            base: settings.base.into(),
            pool: Arc::new(settings.pool),
            planner: Arc::new(settings.planner),
            engine: SplitEngine::new(executor, settings.executor.channel_capacity),
            forwarder: PassThroughForwarder::new(client),
            body_capacity: settings.executor.channel_capacity,
        })
    }

    /// Path prefix served by this gateway
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Handle one client request
    pub async fn handle<B>(&self, request: Request<B>) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "request",
            %request_id,
            method = %request.method(),
            uri = %request.uri(),
        );
        self.route(request).instrument(span).await
    }

    async fn route<B>(&self, request: Request<B>) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        if !self.serves(request.uri().path()) {
            return status_response(StatusCode::NOT_FOUND, "Not Found");
        }

        let backend = self.pool.select().to_string();

        if request.method() != Method::GET {
            return self.forward(&backend, request).await;
        }

        let decision = self
            .planner
            .plan(&backend, request.uri().path(), request.uri().query());

        match decision {
            PlanDecision::Split(plan) => {
                debug!(
                    api = plan.api(),
                    windows = plan.len(),
                    backend = %backend,
                    "Splitting request"
                );
                let (sink, body) = channel_body(self.body_capacity);
                let engine = self.engine.clone();
                tokio::spawn(
                    async move { engine.run(plan, sink).await }
                        .instrument(tracing::Span::current()),
                );
                split_response(body)
            }
            PlanDecision::PassThrough(reason) => {
                debug!(%reason, backend = %backend, "Passing request through");
                self.forward(&backend, request).await
            }
        }
    }

    fn serves(&self, path: &str) -> bool {
        self.base.is_empty()
            || path == &*self.base
            || path
                .strip_prefix(&*self.base)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    async fn forward<B>(&self, backend: &str, request: Request<B>) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        match self.forwarder.forward(backend, request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(backend = %backend, error = %e, "Pass-through failed");
                status_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
        }
    }
}

fn split_response(body: GatewayBody) -> Response<GatewayBody> {
    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn status_response(status: StatusCode, message: &'static str) -> Response<GatewayBody> {
    let mut response = Response::new(full(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
