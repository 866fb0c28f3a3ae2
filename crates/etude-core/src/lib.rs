//! Etude: request dispatch with signed cookies instead of server-side
//! sessions.
//!
//! A [`Dispatcher`] matches a request against an ordered, hot-swappable route
//! table, resolves the signed identity cookie, enforces XSRF tokens and runs
//! the handler; [`App`] binds it to axum. See [`prelude`] for the common
//! imports.

pub mod app;
pub mod config;
pub mod context;
pub mod cookie;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod http;
pub mod identity;
pub mod logging;
pub mod prelude;
pub mod routing;
pub mod server;
pub mod session;
pub mod signing;
pub mod testing;
pub mod xsrf;

pub use app::App;
pub use config::Config;
pub use dispatch::{Dispatched, Dispatcher, Stage};
pub use error::EtudeError;
pub use testing::TestClient;
