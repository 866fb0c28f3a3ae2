//! Read-only, per-request view of the signed cookies the codec manages.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::Request;
use crate::signing::SignedCookieCodec;

/// Names of the cookies whose values are signed tokens.
#[derive(Debug, Clone, Default)]
pub struct ManagedCookies {
    names: Vec<String>,
}

impl ManagedCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.register(name);
        self
    }

    pub fn register(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Read-only view of every signed cookie on the incoming request.
///
/// Built once per request. A cookie that fails to decode (forged, expired,
/// signed with another key) is simply left out, as if the client never sent
/// it. Changes go through the [`CookieJar`](crate::cookie::CookieJar) and
/// show up here on the next request.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    entries: HashMap<String, Value>,
}

impl SessionView {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_request(
        req: &Request,
        codec: &SignedCookieCodec,
        managed: &ManagedCookies,
    ) -> Self {
        let mut entries = HashMap::new();
        let mut seen = HashSet::new();
        for (name, raw) in req.cookies() {
            if !managed.contains(&name) || !seen.insert(name.clone()) {
                continue;
            }
            match codec.decode::<Value>(&raw) {
                Ok(value) => {
                    entries.insert(name, value);
                }
                Err(reason) => {
                    tracing::debug!(cookie = %name, %reason, "Ignoring invalid signed cookie");
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Deserialize the payload of `name`; a shape mismatch reads as absent.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.entries
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::SigningKey;

    fn codec(secret: &str) -> SignedCookieCodec {
        SignedCookieCodec::new(SigningKey::new(secret).unwrap())
    }

    #[test]
    fn decodes_only_managed_and_valid_cookies() {
        let c = codec("secret");
        let good = c.encode(&serde_json::json!({"n": 1})).unwrap();
        let foreign = codec("other").encode(&"x").unwrap();
        let req = Request::get("/")
            .with_cookie("prefs", &good)
            .with_cookie("forged", &foreign)
            .with_cookie("plain", &good);

        let managed = ManagedCookies::new().with("prefs").with("forged");
        let view = SessionView::from_request(&req, &c, &managed);

        assert_eq!(view.len(), 1);
        assert_eq!(view.get("prefs"), Some(&serde_json::json!({"n": 1})));
        assert!(!view.contains("forged"));
        assert!(!view.contains("plain"));
    }

    #[test]
    fn get_as_mismatch_is_none() {
        let c = codec("secret");
        let token = c.encode(&"hello").unwrap();
        let req = Request::get("/").with_cookie("greeting", &token);
        let view = SessionView::from_request(&req, &c, &ManagedCookies::new().with("greeting"));
        assert_eq!(view.get_as::<String>("greeting").as_deref(), Some("hello"));
        assert_eq!(view.get_as::<u32>("greeting"), None);
    }
}
