//! In-process test client.
//!
//! Drives a [`Dispatcher`] directly, without a socket, and remembers cookies
//! between requests the way a browser would.
//!
//! ```rust
//! use etude_core::prelude::*;
//! use etude_core::testing::TestClient;
//!
//! let app = App::new(
//!     Config::default(),
//!     RouteTable::builder().get("/", |_: &mut RequestContext| Ok(Response::text("hi"))),
//! )
//! .unwrap();
//! let mut client = app.test_client();
//!
//! let res = client.get("/");
//! assert_eq!(res.status, 200);
//! assert!(client.xsrf_token().is_some());
//! ```

use ::cookie::Cookie;
use ::cookie::time::Duration;

use crate::dispatch::{Dispatched, Dispatcher};
use crate::http::{Request, Response};
use crate::xsrf::{XSRF_COOKIE, XSRF_FIELD};

/// A cookie-keeping client over a dispatcher.
pub struct TestClient {
    dispatcher: Dispatcher,
    cookies: Vec<(String, String)>,
}

impl TestClient {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            cookies: Vec::new(),
        }
    }

    pub fn get(&mut self, path: &str) -> Response {
        self.send(Request::get(path))
    }

    /// POST a urlencoded form.
    pub fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> Response {
        let mut req = Request::post(path)
            .with_header("Content-Type", "application/x-www-form-urlencoded");
        for (name, value) in fields {
            req = req.with_form_field(*name, *value);
        }
        self.send(req)
    }

    /// POST a form carrying the current XSRF token, as a rendered page would.
    pub fn submit_form(&mut self, path: &str, fields: &[(&str, &str)]) -> Response {
        let token = self.xsrf_token().unwrap_or_default();
        let mut all: Vec<(&str, &str)> = fields.to_vec();
        all.push((XSRF_FIELD, token.as_str()));
        self.post_form(path, &all)
    }

    pub fn send(&mut self, req: Request) -> Response {
        self.send_dispatched(req).response
    }

    /// Send and also report the dispatcher stage.
    pub fn send_dispatched(&mut self, mut req: Request) -> Dispatched {
        for (name, value) in &self.cookies {
            req = req.with_cookie(name, value);
        }
        let dispatched = self.dispatcher.handle(req);
        for header in dispatched.response.set_cookies() {
            self.store(header);
        }
        dispatched
    }

    /// Raw value of a stored cookie.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.retain(|(k, _)| k != name);
        self.cookies.push((name.to_string(), value.to_string()));
    }

    pub fn remove_cookie(&mut self, name: &str) {
        self.cookies.retain(|(k, _)| k != name);
    }

    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    /// The XSRF token behind the stored `xsrf` cookie.
    pub fn xsrf_token(&self) -> Option<String> {
        let raw = self.cookie(XSRF_COOKIE)?;
        self.dispatcher.codec().decode::<String>(raw).ok()
    }

    fn store(&mut self, set_cookie: &str) {
        let Ok(cookie) = Cookie::parse(set_cookie) else {
            return;
        };
        if cookie.max_age() == Some(Duration::ZERO) {
            self.remove_cookie(cookie.name());
        } else {
            self.set_cookie(cookie.name(), cookie.value_trimmed());
        }
    }
}
