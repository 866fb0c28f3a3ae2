use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::EtudeError;
use crate::handler::HandlerRegistry;
use crate::identity::{IdentityStore, InMemoryUserStore, UserStore};
use crate::routing::{ManifestWatcher, RouteManifest, RouteTableBuilder, Router};
use crate::server;
use crate::testing::TestClient;

/// The main Etude application: config, live route table and dispatcher.
///
/// ```rust,no_run
/// use etude_core::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     init_logging();
///
///     let routes = RouteTable::builder()
///         .get("/", |_: &mut RequestContext| Ok(Response::text("hello")));
///     let app = App::new(Config::from_env()?, routes)?;
///     app.run().await?;
///     Ok(())
/// }
/// ```
pub struct App {
    pub config: Config,
    router: Arc<Router>,
    registry: Option<Arc<HandlerRegistry>>,
    dispatcher: Dispatcher,
}

impl App {
    /// Build an app over code-defined routes with an in-memory user store.
    pub fn new(config: Config, routes: RouteTableBuilder) -> Result<Self, EtudeError> {
        Self::with_users(config, Arc::new(InMemoryUserStore::new()), routes)
    }

    pub fn with_users(
        config: Config,
        users: Arc<dyn UserStore>,
        routes: RouteTableBuilder,
    ) -> Result<Self, EtudeError> {
        let router = Arc::new(Router::new(routes.build()?));
        let dispatcher = Dispatcher::from_config(&config, Arc::clone(&router), users)?;
        Ok(App {
            config,
            router,
            registry: None,
            dispatcher,
        })
    }

    /// Build an app whose routes come from `config.routes_manifest`.
    ///
    /// In development the manifest is watched and reloaded by [`run`](Self::run).
    pub fn from_manifest(
        config: Config,
        users: Arc<dyn UserStore>,
        registry: HandlerRegistry,
    ) -> Result<Self, EtudeError> {
        let path = config
            .routes_manifest
            .clone()
            .ok_or_else(|| EtudeError::Config("ROUTES_MANIFEST is not set".to_string()))?;
        let table = RouteManifest::load(&path)?.build(&registry)?;
        tracing::info!(path = ?path, routes = table.len(), "Loaded route manifest");

        let router = Arc::new(Router::new(table));
        let dispatcher = Dispatcher::from_config(&config, Arc::clone(&router), users)?;
        Ok(App {
            config,
            router,
            registry: Some(Arc::new(registry)),
            dispatcher,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn identity(&self) -> &IdentityStore {
        self.dispatcher.identity()
    }

    /// Live route table holder; publish a new table here to hot swap routes.
    pub fn route_table(&self) -> &Arc<Router> {
        &self.router
    }

    /// The axum router serving this app.
    pub fn router(&self) -> axum::Router {
        server::axum_router(self.dispatcher.clone(), self.config.max_body_size)
    }

    /// In-process client sharing this app's dispatcher.
    pub fn test_client(&self) -> TestClient {
        TestClient::new(self.dispatcher.clone())
    }

    /// Serve until Ctrl+C.
    pub async fn run(self) -> Result<(), EtudeError> {
        let addr = self.config.server_addr();

        // Held for the lifetime of the server; dropping it stops the watch.
        let _watcher = match (&self.registry, &self.config.routes_manifest) {
            (Some(registry), Some(path)) if self.config.is_dev() => Some(
                ManifestWatcher::new(path, Arc::clone(registry), Arc::clone(&self.router))
                    .run()
                    .map_err(|e| EtudeError::Config(format!("Cannot watch route manifest: {}", e)))?,
            ),
            _ => None,
        };

        tracing::info!(
            environment = %self.config.environment,
            xsrf = self.config.xsrf_enabled,
            routes = self.router.snapshot().len(),
            "Etude server starting on http://{}",
            addr
        );

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        server::serve_until(listener, self.router(), server::shutdown_signal()).await
    }
}
