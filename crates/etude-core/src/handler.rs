//! The handler trait and the by-name registry used by route manifests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::EtudeError;
use crate::http::Response;

/// A request handler bound to a route.
///
/// Any `Fn(&mut RequestContext) -> Result<Response, EtudeError>` is a handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: &mut RequestContext) -> Result<Response, EtudeError>;
}

impl<F> Handler for F
where
    F: Fn(&mut RequestContext) -> Result<Response, EtudeError> + Send + Sync + 'static,
{
    fn call(&self, ctx: &mut RequestContext) -> Result<Response, EtudeError> {
        self(ctx)
    }
}

pub type SharedHandler = Arc<dyn Handler>;

/// Handlers registered by name, for route tables built from a manifest.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, SharedHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any earlier registration.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) -> Result<Response, EtudeError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Result<SharedHandler, EtudeError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| EtudeError::UnknownHandler(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
