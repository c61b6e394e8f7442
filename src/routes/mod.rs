//! Storefront route table.
//!
//! # Data Flow
//! ```text
//! Routes::new(state)
//!     → storefront routes (this module's children)
//!     → admin routes (crate::admin)
//!     → each route: one handler + one Pipeline, recorded as a RouteContract
//!     → into_router() / contracts()
//! ```
//!
//! # Design Decisions
//! - The contract table is produced by the same code that mounts the
//!   routes, so it cannot drift from what is served
//! - Response style (enveloped or bare) is fixed per route

pub mod auth;
pub mod categories;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod products;
pub mod profile;
pub mod wishlist;

use axum::handler::Handler;
use axum::middleware::from_fn_with_state;
use axum::routing::{self, MethodRouter};
use axum::Router;
use serde::Serialize;

use crate::config::RatePolicy;
use crate::http::{AppState, ResponseStyle};
use crate::pipeline::{
    run_pipeline, AuthenticateStage, Pipeline, PipelineBuilder, RateLimitStage, RequireAdminStage,
    ValidateStage,
};
use crate::security::{schemas, Schema};

use ResponseStyle::{Bare, Enveloped};

/// Quota buckets. Each has its own policy and its own counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    Default,
    Auth,
    Checkout,
}

impl RateScope {
    pub fn name(self) -> &'static str {
        match self {
            RateScope::Default => "default",
            RateScope::Auth => "auth",
            RateScope::Checkout => "checkout",
        }
    }
}

/// One row of the route contract table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteContract {
    pub method: &'static str,
    pub path: &'static str,
    pub stages: Vec<&'static str>,
    pub style: ResponseStyle,
}

/// Route registry: mounts handlers behind their pipelines and records
/// what it mounted.
pub struct Routes {
    state: AppState,
    router: Router<AppState>,
    contracts: Vec<RouteContract>,
}

impl Routes {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            router: Router::new(),
            contracts: Vec::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Pipeline builder for this deployment.
    pub fn pipeline(&self, style: ResponseStyle) -> PipelineBuilder {
        Pipeline::builder(style).trust_forwarded(self.state.config.security.trust_forwarded_headers)
    }

    pub fn rate_limit(&self, scope: RateScope) -> RateLimitStage {
        let config = &self.state.config.rate_limit;
        let policy: RatePolicy = match scope {
            RateScope::Default => config.default,
            RateScope::Auth => config.auth,
            RateScope::Checkout => config.checkout,
        };
        RateLimitStage::new(self.state.limiter.clone(), scope.name(), policy, config.failure_policy)
    }

    pub fn authenticate(&self) -> AuthenticateStage {
        AuthenticateStage::new(self.state.resolver())
    }

    pub fn require_admin(&self) -> RequireAdminStage {
        RequireAdminStage::new(self.state.resolver(), self.state.config.admin.email.clone())
    }

    pub fn validate(&self, schema: Schema) -> ValidateStage {
        ValidateStage::new(schema, self.state.config.security.max_body_size)
    }

    fn mount(
        mut self,
        method: &'static str,
        path: &'static str,
        pipeline: Pipeline,
        method_router: MethodRouter<AppState>,
    ) -> Self {
        self.contracts.push(RouteContract {
            method,
            path,
            stages: pipeline.stage_names(),
            style: pipeline.style(),
        });
        self.router = self
            .router
            .route(path, method_router.layer(from_fn_with_state(pipeline, run_pipeline)));
        self
    }

    pub fn get<H, T>(self, path: &'static str, pipeline: Pipeline, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.mount("GET", path, pipeline, routing::get(handler))
    }

    pub fn post<H, T>(self, path: &'static str, pipeline: Pipeline, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.mount("POST", path, pipeline, routing::post(handler))
    }

    pub fn put<H, T>(self, path: &'static str, pipeline: Pipeline, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.mount("PUT", path, pipeline, routing::put(handler))
    }

    pub fn patch<H, T>(self, path: &'static str, pipeline: Pipeline, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.mount("PATCH", path, pipeline, routing::patch(handler))
    }

    pub fn delete<H, T>(self, path: &'static str, pipeline: Pipeline, handler: H) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.mount("DELETE", path, pipeline, routing::delete(handler))
    }

    pub fn contracts(&self) -> &[RouteContract] {
        &self.contracts
    }

    pub fn into_router(self) -> Router {
        self.router.with_state(self.state)
    }
}

/// Mount every storefront and admin route.
pub fn register(routes: Routes) -> Routes {
    let open = |routes: &Routes, style| routes.pipeline(style).build();

    let health = open(&routes, Bare);
    let routes = routes.get("/api/health", health, health::health);

    // Accounts
    let signup = routes
        .pipeline(Bare)
        .stage(routes.rate_limit(RateScope::Auth))
        .stage(routes.validate(schemas::signup()))
        .build();
    let signin = routes
        .pipeline(Enveloped)
        .stage(routes.rate_limit(RateScope::Auth))
        .stage(routes.validate(schemas::signin()))
        .build();
    let signout = routes.pipeline(Enveloped).stage(routes.authenticate()).build();
    let reset_password = routes
        .pipeline(Bare)
        .stage(routes.rate_limit(RateScope::Auth))
        .stage(routes.validate(schemas::reset_password()))
        .build();
    let routes = routes
        .post("/api/auth/signup", signup, auth::signup)
        .post("/api/auth/signin", signin, auth::signin)
        .delete("/api/auth/session", signout, auth::signout)
        .post("/api/auth/reset-password", reset_password, auth::reset_password);

    let show_profile = routes.pipeline(Bare).stage(routes.authenticate()).build();
    let update_profile = routes
        .pipeline(Bare)
        .stage(routes.authenticate())
        .stage(routes.validate(schemas::profile()))
        .build();
    let orders = routes.pipeline(Bare).stage(routes.authenticate()).build();
    let routes = routes
        .get("/api/user/profile", show_profile, profile::show)
        .patch("/api/user/profile", update_profile, profile::update)
        .get("/api/orders", orders, orders::list);

    let list_wishlist = routes.pipeline(Bare).stage(routes.authenticate()).build();
    let wishlist_body = |routes: &Routes| {
        routes
            .pipeline(Bare)
            .stage(routes.authenticate())
            .stage(routes.validate(schemas::wishlist()))
            .build()
    };
    let add_wishlist = wishlist_body(&routes);
    let remove_wishlist = wishlist_body(&routes);
    let routes = routes
        .get("/api/wishlist", list_wishlist, wishlist::list)
        .post("/api/wishlist", add_wishlist, wishlist::add)
        .delete("/api/wishlist", remove_wishlist, wishlist::remove);

    // Catalogue
    let list_products = routes
        .pipeline(Enveloped)
        .stage(routes.rate_limit(RateScope::Default))
        .build();
    let show_product = open(&routes, Enveloped);
    let related = open(&routes, Bare);
    let categories = open(&routes, Bare);
    let routes = routes
        .get("/api/products", list_products, products::list)
        .get("/api/products/{id}", show_product, products::show)
        .get("/api/products/{id}/related", related, products::related)
        .get("/api/categories", categories, categories::list);

    let checkout = routes
        .pipeline(Enveloped)
        .stage(routes.authenticate())
        .stage(routes.validate(schemas::checkout()))
        .stage(routes.rate_limit(RateScope::Checkout))
        .build();
    let routes = routes.post("/api/checkout", checkout, checkout::create);

    crate::admin::register(routes)
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    register(Routes::new(state)).into_router()
}

/// Every mounted route with its stages and response style.
pub fn contract_table(state: AppState) -> Vec<RouteContract> {
    register(Routes::new(state)).contracts
}
