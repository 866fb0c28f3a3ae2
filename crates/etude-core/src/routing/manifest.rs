//! Route tables described in TOML.
//!
//! ```toml
//! [[route]]
//! method = "GET"
//! pattern = "/"
//! handler = "index"
//!
//! [[route]]
//! method = "POST"
//! pattern = "/home/update"
//! handler = "update"
//! guards = ["login_required", "xsrf"]
//! ```
//!
//! Handler names resolve against a [`HandlerRegistry`], so handlers are always
//! registered explicitly in code; the manifest only decides which URL reaches
//! which of them. Entries keep file order, which is the matching order.

use std::path::Path;

use serde::Deserialize;

use crate::error::EtudeError;
use crate::handler::HandlerRegistry;
use crate::http::Method;
use crate::routing::table::{Guard, RouteTable, RouteTableBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardName {
    LoginRequired,
    Xsrf,
}

impl From<GuardName> for Guard {
    fn from(name: GuardName) -> Self {
        match name {
            GuardName::LoginRequired => Guard::LoginRequired,
            GuardName::Xsrf => Guard::Xsrf,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestRoute {
    pub method: Method,
    pub pattern: String,
    pub handler: String,
    #[serde(default)]
    pub guards: Vec<GuardName>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteManifest {
    #[serde(default, rename = "route")]
    pub routes: Vec<ManifestRoute>,
}

impl RouteManifest {
    /// Parse a manifest. One that declares no routes is rejected: editors
    /// often truncate a file before writing it back.
    pub fn from_toml(source: &str) -> Result<Self, EtudeError> {
        let manifest: Self = toml::from_str(source)
            .map_err(|e| EtudeError::Config(format!("Invalid route manifest: {}", e)))?;
        if manifest.routes.is_empty() {
            return Err(EtudeError::Config(
                "Invalid route manifest: no [[route]] entries".to_string(),
            ));
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, EtudeError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }

    /// Resolve handler names and produce an unbuilt table.
    pub fn to_builder(&self, registry: &HandlerRegistry) -> Result<RouteTableBuilder, EtudeError> {
        let mut builder = RouteTable::builder();
        for entry in &self.routes {
            let handler = registry.get(&entry.handler)?;
            builder = builder.route_shared(entry.method, &entry.pattern, handler);
            for guard in &entry.guards {
                builder = builder.guard((*guard).into());
            }
        }
        Ok(builder)
    }

    pub fn build(&self, registry: &HandlerRegistry) -> Result<RouteTable, EtudeError> {
        self.to_builder(registry)?.build()
    }
}
