use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::cookie::CookieJar;
use crate::error::EtudeError;
use crate::http::{FormData, Request};
use crate::identity::{IdentityStore, Principal, User};
use crate::session::SessionView;
use crate::xsrf::xsrf_form_field;

/// Everything a handler sees for one request.
///
/// The session view and principal reflect the cookies the client sent; they
/// never change during the request. Anything the handler wants the client to
/// remember goes into [`cookies`](Self::cookies).
pub struct RequestContext {
    request: Request,
    params: HashMap<String, String>,
    session: SessionView,
    principal: Principal,
    xsrf_token: Option<String>,
    jar: CookieJar,
    identity: Arc<IdentityStore>,
}

impl RequestContext {
    pub(crate) fn new(
        request: Request,
        params: HashMap<String, String>,
        session: SessionView,
        principal: Principal,
        xsrf_token: Option<String>,
        jar: CookieJar,
        identity: Arc<IdentityStore>,
    ) -> Self {
        Self {
            request,
            params,
            session,
            principal,
            xsrf_token,
            jar,
            identity,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// A captured route parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn form(&self) -> &FormData {
        &self.request.form
    }

    /// Deserialize the form into `T`.
    pub fn form_as<T: DeserializeOwned>(&self) -> Result<T, EtudeError> {
        let pairs: Vec<(&str, &str)> = self.request.form.iter().collect();
        let encoded = serde_urlencoded::to_string(&pairs)
            .map_err(|e| EtudeError::BadRequest(format!("Malformed form: {}", e)))?;
        serde_urlencoded::from_str(&encoded)
            .map_err(|e| EtudeError::BadRequest(format!("Invalid form: {}", e)))
    }

    pub fn session(&self) -> &SessionView {
        &self.session
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user(&self) -> Option<&User> {
        self.principal.user()
    }

    /// The client's XSRF token, `None` when enforcement is disabled.
    pub fn xsrf_token(&self) -> Option<&str> {
        self.xsrf_token.as_deref()
    }

    /// Hidden form field carrying the XSRF token, or an empty string when
    /// enforcement is disabled.
    pub fn xsrf_field(&self) -> String {
        self.xsrf_token
            .as_deref()
            .map(xsrf_form_field)
            .unwrap_or_default()
    }

    /// Outgoing cookies for this response.
    pub fn cookies(&mut self) -> &mut CookieJar {
        &mut self.jar
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    /// Set the identity cookie for `user`. Takes effect on the next request.
    pub fn login(&mut self, user: &User) -> Result<(), EtudeError> {
        self.identity.login(user, &mut self.jar)
    }

    /// Clear the identity cookie. Takes effect on the next request.
    pub fn logout(&mut self) -> Result<(), EtudeError> {
        self.identity.logout(&mut self.jar)
    }

    pub(crate) fn into_jar(self) -> CookieJar {
        self.jar
    }

    /// Swap the outgoing jar, returning what was queued.
    pub(crate) fn replace_jar(&mut self, jar: CookieJar) -> CookieJar {
        std::mem::replace(&mut self.jar, jar)
    }
}
