//! Per-route request pipelines.
//!
//! # Data Flow
//! ```text
//! Request
//!     → error boundary (always first, always on)
//!     → rate_limit.rs   (quota per client and scope)
//!     → auth.rs         (session required / admin required)
//!     → validate.rs     (parse, sanitize, validate body)
//!     → handler (inside catch_unwind)
//!     ← after hooks, in reverse (quota headers)
//!     ← error boundary logs internal failures, converts panics to 500
//! ```
//!
//! # Design Decisions
//! - Stage order is a property of the pipeline, not of the call site:
//!   `build()` sorts by phase, so a route cannot validate before it
//!   authenticates
//! - A stage either continues with the request or halts with a response;
//!   a halted request never reaches the handler
//! - Every route has a pipeline, even with no stages, so every route gets
//!   the error boundary

pub mod auth;
pub mod rate_limit;
pub mod validate;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use futures_util::FutureExt;
use serde_json::Value;

use crate::auth::Session;
use crate::http::request::{client_ip, request_id};
use crate::http::response::{ApiError, InternalFailure, ResponseStyle};
use crate::observability::metrics;
use crate::security::Decision;

pub use auth::{AuthenticateStage, RequireAdminStage};
pub use rate_limit::RateLimitStage;
pub use validate::ValidateStage;

/// Name of the built-in outermost stage.
pub const ERROR_BOUNDARY: &str = "error_boundary";

/// Where a stage runs relative to the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    RateLimit,
    Authenticate,
    Validate,
}

/// Outcome of a stage's `before` hook.
pub enum Flow {
    Continue(Request<Body>),
    Halt(Response),
}

/// What the pipeline knows about a request. Handlers read it through the
/// extractors in `http::extract`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub client_ip: String,
    pub style: ResponseStyle,
    pub session: Option<Session>,
    pub is_admin: bool,
    pub rate_limit: Option<Decision>,
    pub validated: Option<Value>,
}

impl RequestContext {
    pub fn from_request<B>(req: &Request<B>, style: ResponseStyle, trust_forwarded: bool) -> Self {
        Self {
            request_id: request_id(req),
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            client_ip: client_ip(req, trust_forwarded),
            style,
            session: None,
            is_admin: false,
            rate_limit: None,
            validated: None,
        }
    }

    /// Render an error in this route's response shape.
    pub fn reject(&self, err: ApiError) -> Response {
        err.render(self.style)
    }
}

/// One cross-cutting check around a handler.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn phase(&self) -> Phase;

    async fn before(&self, req: Request<Body>, ctx: &mut RequestContext) -> Flow;

    /// Runs on the way out, for every stage whose `before` continued.
    fn after(&self, _ctx: &RequestContext, _response: &mut Response) {}
}

/// An ordered, immutable list of stages for one route.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
    style: ResponseStyle,
    trust_forwarded: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("style", &self.style)
            .finish()
    }
}

pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    style: ResponseStyle,
    trust_forwarded: bool,
}

impl PipelineBuilder {
    pub fn trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Freeze the stage list in phase order. Stages of the same phase keep
    /// the order they were added in.
    pub fn build(mut self) -> Pipeline {
        self.stages.sort_by_key(|stage| stage.phase());
        Pipeline {
            stages: self.stages.into(),
            style: self.style,
            trust_forwarded: self.trust_forwarded,
        }
    }
}

impl Pipeline {
    pub fn builder(style: ResponseStyle) -> PipelineBuilder {
        PipelineBuilder {
            stages: Vec::new(),
            style,
            trust_forwarded: false,
        }
    }

    pub fn style(&self) -> ResponseStyle {
        self.style
    }

    /// Stage names in execution order, error boundary first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        std::iter::once(ERROR_BOUNDARY)
            .chain(self.stages.iter().map(|stage| stage.name()))
            .collect()
    }

    /// Run the `before` hooks. Returns the request (or the halting
    /// response) and how many stages continued.
    async fn enter(
        &self,
        mut req: Request<Body>,
        ctx: &mut RequestContext,
    ) -> (Result<Request<Body>, Response>, usize) {
        for (entered, stage) in self.stages.iter().enumerate() {
            match stage.before(req, ctx).await {
                Flow::Continue(next) => req = next,
                Flow::Halt(response) => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        stage = stage.name(),
                        status = response.status().as_u16(),
                        "Pipeline halted"
                    );
                    return (Err(response), entered);
                }
            }
        }
        (Ok(req), self.stages.len())
    }
}

/// Middleware entry point, applied per route with
/// `axum::middleware::from_fn_with_state(pipeline, run_pipeline)`.
pub async fn run_pipeline(State(pipeline): State<Pipeline>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut ctx = RequestContext::from_request(&req, pipeline.style, pipeline.trust_forwarded);

    let (outcome, entered) = pipeline.enter(req, &mut ctx).await;
    let mut response = match outcome {
        Ok(mut req) => {
            req.extensions_mut().insert(ctx.clone());
            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => ctx.reject(ApiError::internal(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            }
        }
        Err(response) => response,
    };

    for stage in pipeline.stages[..entered].iter().rev() {
        stage.after(&ctx, &mut response);
    }

    if let Some(InternalFailure(detail)) = response.extensions_mut().remove::<InternalFailure>() {
        tracing::error!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            client = %ctx.client_ip,
            error = %detail,
            "API route error"
        );
    }

    metrics::record_request(ctx.method.as_str(), response.status().as_u16(), started);
    response
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
