//! Users and the signed identity cookie.
//!
//! Logging in sets a cookie holding `{uid, sec}`: the user id plus the user's
//! current secret fragment, signed by the codec. Validation checks the
//! signature and then re-reads the user to compare the fragment, so rotating
//! a user's secret ([`IdentityStore::revoke_sessions`]) invalidates every
//! cookie issued before it without any server-side block-list.

pub mod password;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cookie::{CookieDirective, CookieJar, CookieOptions, SameSite};
use crate::error::EtudeError;
use crate::session::SessionView;
use crate::signing::SignedCookieCodec;
use crate::xsrf::{generate_secure_token, tokens_match};

pub use password::{hash_password, verify_password};
pub use store::{InMemoryUserStore, NewUser, User, UserStore};

/// Default name of the identity cookie.
pub const IDENTITY_COOKIE: &str = "login";

/// Payload of the identity cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub uid: i64,
    pub sec: String,
}

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Authenticated(User),
    Anonymous,
}

impl Principal {
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Authenticated(user) => Some(user),
            Principal::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::Authenticated(_))
    }
}

/// Issues and validates identity cookies on top of a [`UserStore`].
#[derive(Clone)]
pub struct IdentityStore {
    users: Arc<dyn UserStore>,
    codec: SignedCookieCodec,
    cookie_name: String,
    max_age: Duration,
    secure: bool,
}

impl IdentityStore {
    pub fn new(users: Arc<dyn UserStore>, codec: SignedCookieCodec, max_age: Duration) -> Self {
        Self {
            users,
            codec,
            cookie_name: IDENTITY_COOKIE.to_string(),
            max_age,
            secure: false,
        }
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Mark issued cookies `Secure`.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn identity_cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Register a user with a hashed password and a fresh secret fragment.
    pub fn create_user(&self, name: &str, password: &str) -> Result<User, EtudeError> {
        if name.trim().is_empty() {
            return Err(EtudeError::BadRequest("user name must not be empty".to_string()));
        }
        let user = self.users.create_user(NewUser {
            name: name.to_string(),
            password_hash: hash_password(password)?,
            secret: generate_secure_token(),
        })?;
        tracing::info!(user_id = user.id, "User created");
        Ok(user)
    }

    pub fn find_by_name(&self, name: &str) -> Result<User, EtudeError> {
        self.users
            .find_user_by_name(name)?
            .ok_or_else(|| EtudeError::UserNotFound(name.to_string()))
    }

    /// Check a name/password pair.
    pub fn authenticate(&self, name: &str, password: &str) -> Result<User, EtudeError> {
        let invalid = || EtudeError::Unauthorized("Invalid user name or password".to_string());
        let user = self.users.find_user_by_name(name)?.ok_or_else(invalid)?;
        if verify_password(password, &user.password_hash)? {
            Ok(user)
        } else {
            tracing::warn!(user_id = user.id, "Password mismatch");
            Err(invalid())
        }
    }

    fn cookie_options(&self) -> CookieOptions {
        CookieOptions::default()
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
    }

    /// Build the identity cookie for `user`.
    pub fn issue_identity_cookie(&self, user: &User) -> Result<CookieDirective, EtudeError> {
        let claims = IdentityClaims {
            uid: user.id,
            sec: user.secret.clone(),
        };
        let token = self.codec.encode_with_expiry(&claims, self.max_age)?;
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        CookieDirective::new(
            self.cookie_name.clone(),
            token,
            self.cookie_options().max_age(max_age),
        )
    }

    /// Queue the identity cookie for `user`.
    pub fn login(&self, user: &User, jar: &mut CookieJar) -> Result<(), EtudeError> {
        jar.push(self.issue_identity_cookie(user)?);
        tracing::info!(user_id = user.id, "Identity cookie issued");
        Ok(())
    }

    /// Queue removal of the identity cookie.
    pub fn logout(&self, jar: &mut CookieJar) -> Result<(), EtudeError> {
        jar.delete_with(self.cookie_name.clone(), self.cookie_options())
    }

    /// Resolve a raw identity cookie value to a principal.
    ///
    /// Forged, expired or malformed tokens, unknown users, and tokens carrying
    /// a secret fragment the user no longer has all resolve to
    /// [`Principal::Anonymous`]. Only store failures are errors.
    pub fn validate_identity_cookie(&self, token: &str) -> Result<Principal, EtudeError> {
        match self.codec.decode::<IdentityClaims>(token) {
            Ok(claims) => self.validate_claims(&claims),
            Err(reason) => {
                tracing::debug!(%reason, "Identity cookie rejected");
                Ok(Principal::Anonymous)
            }
        }
    }

    fn validate_claims(&self, claims: &IdentityClaims) -> Result<Principal, EtudeError> {
        let Some(user) = self.users.find_user_by_id(claims.uid)? else {
            tracing::debug!(user_id = claims.uid, "Identity cookie names unknown user");
            return Ok(Principal::Anonymous);
        };
        if tokens_match(&user.secret, &claims.sec) {
            Ok(Principal::Authenticated(user))
        } else {
            tracing::info!(user_id = user.id, "Identity cookie carries a revoked secret");
            Ok(Principal::Anonymous)
        }
    }

    /// Resolve the principal of a request.
    ///
    /// `presented` tells whether the client sent an identity cookie at all.
    /// When it did but the cookie does not resolve to a user, a removal is
    /// queued so the client stops sending it.
    pub fn identify(
        &self,
        session: &SessionView,
        presented: bool,
        jar: &mut CookieJar,
    ) -> Result<Principal, EtudeError> {
        let principal = match session.get_as::<IdentityClaims>(&self.cookie_name) {
            Some(claims) => self.validate_claims(&claims)?,
            None => Principal::Anonymous,
        };
        if presented && !principal.is_authenticated() {
            self.logout(jar)?;
        }
        Ok(principal)
    }

    /// Rotate the user's secret fragment, invalidating all identity cookies.
    pub fn revoke_sessions(&self, user_id: i64) -> Result<(), EtudeError> {
        self.users
            .update_user_secret(user_id, &generate_secure_token())?;
        tracing::info!(user_id, "Identity cookies revoked");
        Ok(())
    }
}
