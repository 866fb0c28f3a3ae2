use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::EtudeError;
use crate::routing::table::{RouteTable, RouteTableBuilder};

/// Holder of the live route table.
///
/// Readers take a [`snapshot`](Self::snapshot) and keep using it for the whole
/// request. A reload builds the replacement off to the side and publishes it
/// with a single pointer swap, so a request sees either the old table or the
/// new one, never a mix.
#[derive(Debug)]
pub struct Router {
    table: ArcSwap<RouteTable>,
}

impl Router {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// Replace the live table. Returns the generation now being served.
    pub fn publish(&self, table: RouteTable) -> u64 {
        let generation = table.generation();
        let routes = table.len();
        self.table.store(Arc::new(table));
        tracing::info!(generation, routes, "Route table published");
        generation
    }

    /// Build `builder` and publish it. On error the current table stays live.
    pub fn reload(&self, builder: RouteTableBuilder) -> Result<u64, EtudeError> {
        match builder.build() {
            Ok(table) => Ok(self.publish(table)),
            Err(e) => {
                tracing::error!(
                    "Route table rebuild failed: {}. Keeping current routes.",
                    e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::http::{Method, Response};

    fn ok(_: &mut RequestContext) -> Result<Response, crate::error::EtudeError> {
        Ok(Response::text("ok"))
    }

    #[test]
    fn failed_reload_keeps_current_table() {
        let router = Router::new(RouteTable::builder().get("/a", ok).build().unwrap());
        let before = router.snapshot().generation();

        let bad = RouteTable::builder().get("/b", ok).get("/b", ok);
        assert!(router.reload(bad).is_err());
        assert_eq!(router.snapshot().generation(), before);
        assert!(router.snapshot().find(Method::Get, "/a").is_ok());
    }

    #[test]
    fn reload_swaps_whole_table() {
        let router = Router::new(RouteTable::builder().get("/a", ok).build().unwrap());
        let old = router.snapshot();
        let generation = router
            .reload(RouteTable::builder().get("/b", ok))
            .unwrap();

        let new = router.snapshot();
        assert_eq!(new.generation(), generation);
        assert!(new.find(Method::Get, "/a").is_err());
        assert!(new.find(Method::Get, "/b").is_ok());
        // A snapshot taken earlier is unaffected.
        assert!(old.find(Method::Get, "/a").is_ok());
    }
}
