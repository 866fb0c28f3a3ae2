//! Etude prelude: the types a handler module needs, in one import.
//!
//! ```rust
//! use etude_core::prelude::*;
//! ```

// ── Core types ─────────────────────────────────────────────────
pub use crate::App;
pub use crate::Config;
pub use crate::EtudeError;
pub use crate::dispatch::{Dispatcher, Stage};

// ── Routing ────────────────────────────────────────────────────
pub use crate::handler::{Handler, HandlerRegistry};
pub use crate::routing::{Guard, RouteManifest, RouteTable, RouteTableBuilder, Router};

// ── Request / response ─────────────────────────────────────────
pub use crate::context::RequestContext;
pub use crate::http::{FormData, Method, Request, Response};

// ── Cookies, identity, XSRF ────────────────────────────────────
pub use crate::cookie::{CookieJar, CookieOptions, SameSite};
pub use crate::identity::{IdentityStore, InMemoryUserStore, Principal, User, UserStore};
pub use crate::session::SessionView;
pub use crate::signing::{SignedCookieCodec, SigningKey};
pub use crate::xsrf::{escape_html, xsrf_form_field};

// ── Logging ────────────────────────────────────────────────────
pub use crate::logging::{init_logging, init_logging_json, init_logging_pretty};

pub use serde::{Deserialize, Serialize};
