//! One request/response cycle.
//!
//! ```text
//! Received ──find──▶ Matched ──guards──▶ Authorized ──handler──▶ Invoked ──flush──▶ Responded
//!     │                 │                     │                     │
//!     └──── 404 ────────┴──── 401/403 ────────┴──── 4xx/500 ────────┴──▶ Failed(status)
//! ```
//!
//! The route table is snapshotted once per request. Cookies queued by the
//! framework (identity clearing, XSRF issuance) survive a failure; cookies
//! queued by a failing handler do not.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::Instrument;

use crate::config::Config;
use crate::context::RequestContext;
use crate::cookie::CookieJar;
use crate::error::EtudeError;
use crate::http::{Request, Response};
use crate::identity::{IdentityStore, UserStore};
use crate::routing::Router;
use crate::session::{ManagedCookies, SessionView};
use crate::signing::{SignedCookieCodec, SigningKey};
use crate::xsrf::{XSRF_COOKIE, XsrfGuard};

/// Where a request ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Matched,
    Authorized,
    Invoked,
    Responded,
    Failed(u16),
}

impl Stage {
    pub fn is_failed(&self) -> bool {
        matches!(self, Stage::Failed(_))
    }
}

/// A response together with the terminal stage that produced it.
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    pub stage: Stage,
}

/// Drives requests through the router, guards and handlers.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    codec: SignedCookieCodec,
    managed: ManagedCookies,
    identity: Arc<IdentityStore>,
    xsrf: XsrfGuard,
}

impl Dispatcher {
    pub fn new(
        router: Arc<Router>,
        codec: SignedCookieCodec,
        identity: Arc<IdentityStore>,
        xsrf: XsrfGuard,
    ) -> Self {
        let managed = ManagedCookies::new()
            .with(identity.identity_cookie_name())
            .with(XSRF_COOKIE);
        Self {
            router,
            codec,
            managed,
            identity,
            xsrf,
        }
    }

    /// Wire the codec, identity store and XSRF guard from `config`.
    pub fn from_config(
        config: &Config,
        router: Arc<Router>,
        users: Arc<dyn UserStore>,
    ) -> Result<Self, EtudeError> {
        let codec = SignedCookieCodec::new(SigningKey::new(&config.secret_key)?);
        let identity = IdentityStore::new(users, codec.clone(), config.identity_max_age())
            .secure(config.cookie_secure);
        let xsrf = XsrfGuard::new(codec.clone(), config.xsrf_enabled).secure(config.cookie_secure);
        Ok(Self::new(router, codec, Arc::new(identity), xsrf))
    }

    /// Treat an additional cookie name as signed, so it shows up in the
    /// session view.
    pub fn manage_cookie(mut self, name: impl Into<String>) -> Self {
        self.managed.register(name);
        self
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn codec(&self) -> &SignedCookieCodec {
        &self.codec
    }

    pub fn identity(&self) -> &Arc<IdentityStore> {
        &self.identity
    }

    /// Dispatch and return only the response.
    pub fn dispatch(&self, req: Request) -> Response {
        self.handle(req).response
    }

    /// Dispatch and report the terminal stage alongside the response.
    pub fn handle(&self, req: Request) -> Dispatched {
        let request_id = req
            .header("x-request-id")
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = tracing::info_span!(
            "dispatch",
            method = %req.method,
            path = %req.path,
            request_id = %request_id,
            status = tracing::field::Empty,
        );
        let _enter = span.enter();

        let dispatched = self.run(req);
        span.record("status", dispatched.response.status);
        tracing::debug!(stage = ?dispatched.stage, "Request finished");
        dispatched
    }

    /// [`handle`](Self::handle) for async transports: runs the synchronous
    /// cycle on the blocking pool.
    pub async fn handle_async(&self, req: Request) -> Dispatched {
        let dispatcher = self.clone();
        let span = tracing::Span::current();
        match tokio::task::spawn_blocking(move || dispatcher.handle(req))
            .instrument(span)
            .await
        {
            Ok(dispatched) => dispatched,
            Err(e) => {
                tracing::error!("Dispatch task failed: {}", e);
                let err = EtudeError::Internal(e.to_string());
                Dispatched {
                    response: err.to_response(),
                    stage: Stage::Failed(err.status_code()),
                }
            }
        }
    }

    fn run(&self, req: Request) -> Dispatched {
        let mut stage = Stage::Received;
        tracing::trace!(?stage);

        // Every response, a 404 included, hands out the XSRF token.
        let mut jar = CookieJar::new();
        let session = SessionView::from_request(&req, &self.codec, &self.managed);
        let xsrf_token = match self.xsrf.ensure_token(&session, &mut jar) {
            Ok(t) => t,
            Err(e) => return fail(e, jar),
        };

        let table = self.router.snapshot();
        let matched = match table.find(req.method, &req.path) {
            Ok(m) => m,
            Err(e) => return fail(e, jar),
        };
        stage = Stage::Matched;
        tracing::trace!(?stage, generation = table.generation(), pattern = %matched.route.pattern);

        let presented = req.cookie(self.identity.identity_cookie_name()).is_some();
        let principal = match self.identity.identify(&session, presented, &mut jar) {
            Ok(p) => p,
            Err(e) => return fail(e, jar),
        };

        let route = matched.route;
        let mut ctx = RequestContext::new(
            req,
            matched.params,
            session,
            principal,
            xsrf_token,
            jar,
            Arc::clone(&self.identity),
        );

        for guard in &route.guards {
            if let Err(e) = guard.check(&ctx, &self.xsrf) {
                tracing::info!(guard = ?guard, "Guard rejected request");
                return fail(e, ctx.into_jar());
            }
        }
        stage = Stage::Authorized;
        tracing::trace!(?stage);

        let framework_jar = ctx.cookies().clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| route.handler.call(&mut ctx)));
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(EtudeError::HandlerFault(panic_message(panic.as_ref()))),
        };
        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                ctx.replace_jar(framework_jar);
                return fail(e, ctx.into_jar());
            }
        };
        stage = Stage::Invoked;
        tracing::trace!(?stage, status = response.status);

        for value in ctx.into_jar().flush() {
            response.headers.push(("Set-Cookie".to_string(), value));
        }
        stage = Stage::Responded;
        Dispatched { response, stage }
    }
}

fn fail(err: EtudeError, jar: CookieJar) -> Dispatched {
    let status = err.status_code();
    if err.is_server_fault() {
        tracing::error!(status, "Request failed: {}", err);
    } else {
        tracing::debug!(status, "Request rejected: {}", err);
    }
    let mut response = err.to_response();
    for value in jar.flush() {
        response.headers.push(("Set-Cookie".to_string(), value));
    }
    Dispatched {
        response,
        stage: Stage::Failed(status),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::CookieOptions;
    use crate::identity::InMemoryUserStore;
    use crate::routing::RouteTable;

    fn dispatcher(table: RouteTable) -> Dispatcher {
        let codec = SignedCookieCodec::new(SigningKey::new("dispatch-test").unwrap());
        let identity = IdentityStore::new(
            Arc::new(InMemoryUserStore::new()),
            codec.clone(),
            std::time::Duration::from_secs(3600),
        );
        Dispatcher::new(
            Arc::new(Router::new(table)),
            codec.clone(),
            Arc::new(identity),
            XsrfGuard::new(codec, true),
        )
    }

    #[test]
    fn unknown_route_fails_with_404() {
        let d = dispatcher(RouteTable::builder().build().unwrap());
        let out = d.handle(Request::get("/nowhere"));
        assert_eq!(out.stage, Stage::Failed(404));
        assert_eq!(out.response.status, 404);
        let cookies = out.response.set_cookies();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("xsrf="));
    }

    #[test]
    fn successful_request_reaches_responded() {
        let table = RouteTable::builder()
            .get("/hello/{name}", |ctx: &mut RequestContext| {
                Ok(Response::text(format!("hi {}", ctx.param("name").unwrap_or(""))))
            })
            .build()
            .unwrap();
        let out = dispatcher(table).handle(Request::get("/hello/ann"));
        assert_eq!(out.stage, Stage::Responded);
        assert_eq!(out.response.body_text(), "hi ann");
        // First visit gets an XSRF cookie.
        let cookies = out.response.set_cookies();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("xsrf="));
    }

    #[test]
    fn panic_becomes_500_and_drops_handler_cookies() {
        let table = RouteTable::builder()
            .get("/boom", |ctx: &mut RequestContext| {
                ctx.cookies().add("flavour", "oat", CookieOptions::default())?;
                panic!("kaboom");
            })
            .build()
            .unwrap();
        let out = dispatcher(table).handle(Request::get("/boom"));
        assert_eq!(out.stage, Stage::Failed(500));
        assert!(!out.response.body_text().contains("kaboom"));
        let cookies = out.response.set_cookies();
        assert!(cookies.iter().all(|c| !c.starts_with("flavour=")));
        assert!(cookies.iter().any(|c| c.starts_with("xsrf=")));
    }

    #[test]
    fn handler_error_keeps_its_status() {
        let table = RouteTable::builder()
            .get("/nope", |_: &mut RequestContext| {
                Err(EtudeError::BadRequest("missing field".to_string()))
            })
            .build()
            .unwrap();
        let out = dispatcher(table).handle(Request::get("/nope"));
        assert_eq!(out.stage, Stage::Failed(400));
    }

    #[test]
    fn login_required_rejects_anonymous() {
        let table = RouteTable::builder()
            .get("/home", |_: &mut RequestContext| Ok(Response::text("home")))
            .login_required()
            .build()
            .unwrap();
        let out = dispatcher(table).handle(Request::get("/home"));
        assert_eq!(out.stage, Stage::Failed(401));
    }

    #[test]
    fn forged_identity_cookie_is_cleared() {
        let table = RouteTable::builder()
            .get("/", |ctx: &mut RequestContext| {
                assert!(!ctx.principal().is_authenticated());
                Ok(Response::text("index"))
            })
            .build()
            .unwrap();
        let out = dispatcher(table).handle(Request::get("/").with_cookie("login", "forged.token"));
        assert_eq!(out.stage, Stage::Responded);
        assert!(
            out.response
                .set_cookies()
                .iter()
                .any(|c| c.starts_with("login=;") && c.contains("Max-Age=0"))
        );
    }

    #[test]
    fn panic_message_extracts_strings() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "handler panicked");
    }
}
