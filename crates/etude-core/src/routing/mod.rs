//! URL routing.
//!
//! # Data Flow
//! ```text
//! RouteTableBuilder (code)        RouteManifest (TOML) + HandlerRegistry
//!         \                                 /
//!          → build(): parse patterns, reject duplicate (method, pattern)
//!          → RouteTable (ordered, immutable, tagged with a generation)
//!          → Router: ArcSwap<RouteTable>
//!
//! On manifest change (development):
//!     ManifestWatcher detects change
//!     → rebuild off to the side
//!     → atomic swap of Arc<RouteTable>
//! ```

pub mod manifest;
pub mod pattern;
pub mod router;
pub mod table;
pub mod watcher;

pub use manifest::{GuardName, ManifestRoute, RouteManifest};
pub use pattern::RoutePattern;
pub use router::Router;
pub use table::{Guard, Route, RouteMatch, RouteTable, RouteTableBuilder};
pub use watcher::{ManifestWatcher, reload_from_manifest};
