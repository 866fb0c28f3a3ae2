//! Immutable route tables: patterns, guards and first-match lookup.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::RequestContext;
use crate::error::EtudeError;
use crate::handler::SharedHandler;
use crate::http::{Method, Response};
use crate::routing::pattern::RoutePattern;
use crate::xsrf::XsrfGuard;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

type GuardFn = dyn Fn(&RequestContext) -> Result<(), EtudeError> + Send + Sync;

/// A policy checked before a route's handler runs.
#[derive(Clone)]
pub enum Guard {
    /// Reject anonymous requests with `401`.
    LoginRequired,
    /// Reject unsafe requests whose form token does not match the XSRF cookie.
    Xsrf,
    Custom(Arc<GuardFn>),
}

impl Guard {
    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<(), EtudeError> + Send + Sync + 'static,
    {
        Guard::Custom(Arc::new(check))
    }

    pub fn check(&self, ctx: &RequestContext, xsrf: &XsrfGuard) -> Result<(), EtudeError> {
        match self {
            Guard::LoginRequired => {
                if ctx.principal().is_authenticated() {
                    Ok(())
                } else {
                    Err(EtudeError::Unauthorized("Login required".to_string()))
                }
            }
            Guard::Xsrf => xsrf.check(ctx.request(), ctx.session()),
            Guard::Custom(check) => check(ctx),
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::LoginRequired => f.write_str("LoginRequired"),
            Guard::Xsrf => f.write_str("Xsrf"),
            Guard::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A (method, pattern) binding.
pub struct Route {
    pub method: Method,
    pub pattern: RoutePattern,
    pub handler: SharedHandler,
    pub guards: Vec<Guard>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("guards", &self.guards)
            .finish_non_exhaustive()
    }
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

/// Ordered, immutable list of routes.
///
/// Lookup is first-match-wins in registration order, so a literal route that
/// overlaps a parameterised one must be registered first.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
    generation: u64,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    pub fn find(&self, method: Method, path: &str) -> Result<RouteMatch<'_>, EtudeError> {
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                route
                    .pattern
                    .matches(path)
                    .map(|params| RouteMatch { route, params })
            })
            .ok_or_else(|| EtudeError::RouteNotFound {
                method,
                path: path.to_string(),
            })
    }

    /// Unique, increasing id assigned when the table was built.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

struct PendingRoute {
    method: Method,
    pattern: String,
    handler: SharedHandler,
    guards: Vec<Guard>,
}

/// Collects routes; validation happens in [`build`](Self::build).
///
/// ```rust
/// use etude_core::prelude::*;
///
/// let table = RouteTable::builder()
///     .get("/users/new", |_: &mut RequestContext| Ok(Response::text("form")))
///     .get("/users/{id}", |ctx: &mut RequestContext| {
///         Ok(Response::text(format!("user {}", ctx.param("id").unwrap_or("?"))))
///     })
///     .post("/users", |_: &mut RequestContext| Ok(Response::redirect("/")))
///     .login_required()
///     .xsrf()
///     .build()
///     .unwrap();
/// assert_eq!(table.len(), 3);
/// ```
#[derive(Default)]
pub struct RouteTableBuilder {
    routes: Vec<PendingRoute>,
    errors: Vec<EtudeError>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F>(self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<Response, EtudeError> + Send + Sync + 'static,
    {
        self.route_shared(method, pattern, Arc::new(handler))
    }

    pub fn route_shared(mut self, method: Method, pattern: &str, handler: SharedHandler) -> Self {
        self.routes.push(PendingRoute {
            method,
            pattern: pattern.to_string(),
            handler,
            guards: Vec::new(),
        });
        self
    }

    pub fn get<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<Response, EtudeError> + Send + Sync + 'static,
    {
        self.route(Method::Get, pattern, handler)
    }

    pub fn post<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<Response, EtudeError> + Send + Sync + 'static,
    {
        self.route(Method::Post, pattern, handler)
    }

    pub fn put<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<Response, EtudeError> + Send + Sync + 'static,
    {
        self.route(Method::Put, pattern, handler)
    }

    pub fn delete<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<Response, EtudeError> + Send + Sync + 'static,
    {
        self.route(Method::Delete, pattern, handler)
    }

    pub fn patch<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<Response, EtudeError> + Send + Sync + 'static,
    {
        self.route(Method::Patch, pattern, handler)
    }

    /// Attach a guard to the most recently registered route.
    pub fn guard(mut self, guard: Guard) -> Self {
        match self.routes.last_mut() {
            Some(route) => route.guards.push(guard),
            None => self.errors.push(EtudeError::Config(
                "guard attached before any route was registered".to_string(),
            )),
        }
        self
    }

    pub fn login_required(self) -> Self {
        self.guard(Guard::LoginRequired)
    }

    pub fn xsrf(self) -> Self {
        self.guard(Guard::Xsrf)
    }

    /// Validate every pattern and reject duplicate (method, pattern) pairs.
    pub fn build(self) -> Result<RouteTable, EtudeError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(self.routes.len());
        for pending in self.routes {
            let pattern = RoutePattern::parse(&pending.pattern)?;
            if !seen.insert((pending.method, pattern.normalized())) {
                return Err(EtudeError::DuplicateRoute {
                    method: pending.method,
                    pattern: pending.pattern,
                });
            }
            routes.push(Route {
                method: pending.method,
                pattern,
                handler: pending.handler,
                guards: pending.guards,
            });
        }

        Ok(RouteTable {
            routes,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        })
    }
}
