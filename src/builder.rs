//! Fluent route composition.
//!
//! ```text
//! validate(schemas) ──pre──▶ Initial ──check──▶ AfterCheck ──get/post/..──▶ Bound
//!                              │                                           ▲
//!                              └────────────────get/post/..────────────────┘
//! ```
//!
//! [`RouteBuilder`] collects one schema set, pre-steps and checks. `pre` is
//! only available before the first `check`. A verb call (`get`, `post`, ...)
//! freezes what has been collected into a [`RouteDescriptor`], registers the
//! handler behind the validation middleware, and returns a [`Bound`] view on
//! which only further verbs can be called.
//!
//! The builder owns its pre-step and check lists behind `Arc`s. A verb call
//! captures those `Arc`s, not copies of the lists. Adding a step afterwards
//! goes through [`Arc::make_mut`], which detaches the builder's list from the
//! captured one first, so already-registered routes keep the steps they were
//! registered with while routes registered later see the addition:
//!
//! ```ignore
//! let mut orders = router.validate(schemas).pre(auth).check(b);
//! orders.post("/orders", create);          // pre: [auth], checks: [b]
//! orders.check(c).get("/orders", list);    // pre: [auth], checks: [b, c]
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use axum::handler::Handler;
use axum::http::Method;
use axum::middleware::from_fn_with_state;
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;

use crate::checks::{Check, CheckHandle};
use crate::pipeline::{guard, PreStep, PreStepHandle, RouteDescriptor};
use crate::schema::SchemaConfig;
use crate::types::PluginConfig;

/// Builder state: pre-steps may still be added.
#[derive(Debug)]
pub struct Initial;

/// Builder state: at least one check was added; pre-steps are closed.
#[derive(Debug)]
pub struct AfterCheck;

mod sealed {
    pub trait Open {}
    impl Open for super::Initial {}
    impl Open for super::AfterCheck {}
}

/// An axum router whose routes can be registered with validation.
pub struct GuardedRouter<S = ()> {
    router: Router<S>,
    config: Arc<PluginConfig>,
}

impl<S> GuardedRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(config: PluginConfig) -> Self {
        Self::from_router(Router::new(), config)
    }

    /// Register further routes on an existing router.
    pub fn from_router(router: Router<S>, config: PluginConfig) -> Self {
        Self {
            router,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Replace the configuration for routes registered from now on.
    pub fn set_config(&mut self, config: PluginConfig) {
        self.config = Arc::new(config);
    }

    /// Start a route with `schemas`.
    pub fn validate(&mut self, schemas: SchemaConfig) -> RouteBuilder<'_, S, Initial> {
        RouteBuilder::new(self, Some(Arc::new(schemas)))
    }

    /// Start a route without schemas, for pre-steps and checks only.
    pub fn routes(&mut self) -> RouteBuilder<'_, S, Initial> {
        RouteBuilder::new(self, None)
    }

    /// Add a route with no validation.
    pub fn route(&mut self, path: &str, method_router: MethodRouter<S>) -> &mut Self {
        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, method_router);
        self
    }

    pub fn into_router(self) -> Router<S> {
        self.router
    }
}

impl<S> Default for GuardedRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(PluginConfig::default())
    }
}

/// What a builder has collected so far.
#[derive(Clone, Default)]
struct Steps {
    schemas: Option<Arc<SchemaConfig>>,
    pre_steps: Arc<Vec<PreStepHandle>>,
    checks: Arc<Vec<CheckHandle>>,
}

impl Steps {
    fn freeze(&self, method: Method, path: &str, config: &Arc<PluginConfig>) -> RouteDescriptor {
        RouteDescriptor {
            method,
            path: path.to_string(),
            schemas: self.schemas.clone(),
            pre_steps: Arc::clone(&self.pre_steps),
            checks: Arc::clone(&self.checks),
            config: Arc::clone(config),
        }
    }
}

/// Collects schemas, pre-steps and checks for one or more routes.
pub struct RouteBuilder<'r, S, Stage = Initial> {
    router: &'r mut GuardedRouter<S>,
    steps: Steps,
    _stage: PhantomData<Stage>,
}

impl<'r, S> RouteBuilder<'r, S, Initial> {
    fn new(router: &'r mut GuardedRouter<S>, schemas: Option<Arc<SchemaConfig>>) -> Self {
        Self {
            router,
            steps: Steps {
                schemas,
                ..Steps::default()
            },
            _stage: PhantomData,
        }
    }

    /// Append a pre-step.
    pub fn pre(mut self, step: impl PreStep + 'static) -> Self {
        Arc::make_mut(&mut self.steps.pre_steps).push(Arc::new(step));
        self
    }
}

impl<'r, S, Stage: sealed::Open> RouteBuilder<'r, S, Stage> {
    /// Append a check. Pre-steps can no longer be added afterwards.
    pub fn check(self, check: impl Check + 'static) -> RouteBuilder<'r, S, AfterCheck> {
        self.checks([Arc::new(check) as CheckHandle])
    }

    /// Append several checks, keeping their order.
    pub fn checks<I>(mut self, checks: I) -> RouteBuilder<'r, S, AfterCheck>
    where
        I: IntoIterator<Item = CheckHandle>,
    {
        Arc::make_mut(&mut self.steps.checks).extend(checks);
        RouteBuilder {
            router: self.router,
            steps: self.steps,
            _stage: PhantomData,
        }
    }

    /// Number of checks collected so far.
    pub fn check_count(&self) -> usize {
        self.steps.checks.len()
    }

    /// Number of pre-steps collected so far.
    pub fn pre_step_count(&self) -> usize {
        self.steps.pre_steps.len()
    }

    fn bind(&mut self) -> Bound<'_, S> {
        Bound {
            router: &mut *self.router,
            steps: &self.steps,
        }
    }
}

macro_rules! verbs {
    ($($(#[$doc:meta])* $name:ident => $method:ident;)*) => {
        impl<'r, S, Stage> RouteBuilder<'r, S, Stage>
        where
            S: Clone + Send + Sync + 'static,
            Stage: sealed::Open,
        {
            $(
                $(#[$doc])*
                pub fn $name<H, T>(&mut self, path: &str, handler: H) -> Bound<'_, S>
                where
                    H: Handler<T, S>,
                    T: 'static,
                {
                    self.bind().register(Method::$method, MethodFilter::$method, path, handler)
                }
            )*
        }

        impl<'b, S> Bound<'b, S>
        where
            S: Clone + Send + Sync + 'static,
        {
            $(
                $(#[$doc])*
                pub fn $name<H, T>(self, path: &str, handler: H) -> Self
                where
                    H: Handler<T, S>,
                    T: 'static,
                {
                    self.register(Method::$method, MethodFilter::$method, path, handler)
                }
            )*
        }
    };
}

verbs! {
    /// Register `handler` for `GET path` with the collected validation.
    get => GET;
    /// Register `handler` for `POST path` with the collected validation.
    post => POST;
    /// Register `handler` for `PUT path` with the collected validation.
    put => PUT;
    /// Register `handler` for `PATCH path` with the collected validation.
    patch => PATCH;
    /// Register `handler` for `DELETE path` with the collected validation.
    delete => DELETE;
}

/// A builder after its first verb call: only verbs remain.
///
/// Every verb registered through the same `Bound` shares one set of steps.
pub struct Bound<'b, S> {
    router: &'b mut GuardedRouter<S>,
    steps: &'b Steps,
}

impl<'b, S> Bound<'b, S>
where
    S: Clone + Send + Sync + 'static,
{
    fn register<H, T>(self, method: Method, filter: MethodFilter, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        let descriptor = Arc::new(self.steps.freeze(method, path, &self.router.config));
        let method_router = on(filter, handler).route_layer(from_fn_with_state(descriptor, guard));
        self.router.route(path, method_router);
        self
    }
}
