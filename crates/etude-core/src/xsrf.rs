//! Cross-site request forgery protection.
//!
//! The token lives in two places: signed inside the `xsrf` cookie, and raw in
//! the `xsrf` hidden field of every form the page renders. A state-changing
//! request passes only when both carry the same token. A third-party site can
//! make the browser send the cookie but cannot read it to fill in the field.

use crate::cookie::{CookieJar, CookieOptions, SameSite};
use crate::error::EtudeError;
use crate::http::Request;
use crate::session::SessionView;
use crate::signing::SignedCookieCodec;

/// Cookie carrying the signed token.
pub const XSRF_COOKIE: &str = "xsrf";
/// Form field carrying the raw token.
pub const XSRF_FIELD: &str = "xsrf";

/// Generate a cryptographically secure random token (hex-encoded).
pub fn generate_secure_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Compare two tokens without short-circuiting on the first differing byte.
pub fn tokens_match(expected: &str, submitted: &str) -> bool {
    if expected.len() != submitted.len() {
        return false;
    }
    expected
        .bytes()
        .zip(submitted.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Render the hidden form field carrying `token`.
pub fn xsrf_form_field(token: &str) -> String {
    format!(
        r#"<input type="hidden" value="{}" name="{}" />"#,
        escape_html(token),
        XSRF_FIELD
    )
}

/// Escape text for use in HTML content or a quoted attribute.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Issues and checks XSRF tokens.
#[derive(Debug, Clone)]
pub struct XsrfGuard {
    codec: SignedCookieCodec,
    enabled: bool,
    secure: bool,
}

impl XsrfGuard {
    pub fn new(codec: SignedCookieCodec, enabled: bool) -> Self {
        Self {
            codec,
            enabled,
            secure: false,
        }
    }

    /// Mark the issued cookie `Secure`.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The token carried by the request's cookie, if that cookie is valid.
    pub fn token_from(&self, session: &SessionView) -> Option<String> {
        session.get_as::<String>(XSRF_COOKIE)
    }

    /// Return the client's current token, issuing a fresh one into `jar` when
    /// the request arrived without a valid `xsrf` cookie.
    ///
    /// Returns `Ok(None)` when enforcement is disabled.
    pub fn ensure_token(
        &self,
        session: &SessionView,
        jar: &mut CookieJar,
    ) -> Result<Option<String>, EtudeError> {
        if !self.enabled {
            return Ok(None);
        }
        if let Some(token) = self.token_from(session) {
            return Ok(Some(token));
        }

        let token = generate_secure_token();
        let value = self.codec.encode(&token)?;
        jar.add(
            XSRF_COOKIE,
            value,
            CookieOptions::default()
                .http_only(true)
                .secure(self.secure)
                .same_site(SameSite::Strict),
        )?;
        tracing::debug!("Issued new XSRF token");
        Ok(Some(token))
    }

    /// Reject an unsafe request whose form token does not match its cookie.
    pub fn check(&self, req: &Request, session: &SessionView) -> Result<(), EtudeError> {
        if !self.enabled || req.method.is_safe() {
            return Ok(());
        }

        let Some(expected) = self.token_from(session) else {
            tracing::warn!(path = %req.path, "XSRF check failed: no valid xsrf cookie");
            return Err(EtudeError::XsrfInvalid);
        };
        let Some(submitted) = req.form.get_first(XSRF_FIELD) else {
            tracing::warn!(path = %req.path, "XSRF check failed: form field missing");
            return Err(EtudeError::XsrfInvalid);
        };

        if tokens_match(&expected, submitted) {
            Ok(())
        } else {
            tracing::warn!(path = %req.path, "XSRF check failed: token mismatch");
            Err(EtudeError::XsrfInvalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ManagedCookies;
    use crate::signing::SigningKey;

    fn guard() -> XsrfGuard {
        XsrfGuard::new(
            SignedCookieCodec::new(SigningKey::new("test-secret").unwrap()),
            true,
        )
    }

    fn view(req: &Request, guard: &XsrfGuard) -> SessionView {
        SessionView::from_request(req, &guard.codec, &ManagedCookies::new().with(XSRF_COOKIE))
    }

    #[test]
    fn generated_tokens_are_hex_and_unique() {
        let a = generate_secure_token();
        let b = generate_secure_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn tokens_match_requires_exact_equality() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
        assert!(!tokens_match("abc", ""));
    }

    #[test]
    fn form_field_escapes_value() {
        assert_eq!(
            xsrf_form_field(r#"a"b<"#),
            r#"<input type="hidden" value="a&quot;b&lt;" name="xsrf" />"#
        );
    }

    #[test]
    fn ensure_token_issues_once() {
        let g = guard();
        let mut jar = CookieJar::new();
        let token = g
            .ensure_token(&SessionView::empty(), &mut jar)
            .unwrap()
            .unwrap();
        let cookie = jar.get(XSRF_COOKIE).unwrap().value().to_string();

        let req = Request::get("/").with_cookie(XSRF_COOKIE, &cookie);
        let mut second = CookieJar::new();
        let again = g.ensure_token(&view(&req, &g), &mut second).unwrap();
        assert_eq!(again.as_deref(), Some(token.as_str()));
        assert!(second.is_empty());
    }

    #[test]
    fn disabled_guard_passes_everything() {
        let g = XsrfGuard::new(
            SignedCookieCodec::new(SigningKey::new("k").unwrap()),
            false,
        );
        let mut jar = CookieJar::new();
        assert_eq!(g.ensure_token(&SessionView::empty(), &mut jar).unwrap(), None);
        assert!(jar.is_empty());
        assert!(g.check(&Request::post("/x"), &SessionView::empty()).is_ok());
    }

    #[test]
    fn check_compares_cookie_and_field() {
        let g = guard();
        let mut jar = CookieJar::new();
        let token = g
            .ensure_token(&SessionView::empty(), &mut jar)
            .unwrap()
            .unwrap();
        let cookie = jar.get(XSRF_COOKIE).unwrap().value().to_string();

        let ok = Request::post("/save")
            .with_cookie(XSRF_COOKIE, &cookie)
            .with_form_field(XSRF_FIELD, token.clone());
        assert!(g.check(&ok, &view(&ok, &g)).is_ok());

        let wrong = Request::post("/save")
            .with_cookie(XSRF_COOKIE, &cookie)
            .with_form_field(XSRF_FIELD, "0".repeat(64));
        assert!(matches!(
            g.check(&wrong, &view(&wrong, &g)),
            Err(EtudeError::XsrfInvalid)
        ));

        // Copying the raw token into the cookie does not help: it is not signed.
        let unsigned = Request::post("/save")
            .with_cookie(XSRF_COOKIE, &token)
            .with_form_field(XSRF_FIELD, token.clone());
        assert!(g.check(&unsigned, &view(&unsigned, &g)).is_err());

        let safe = Request::get("/save");
        assert!(g.check(&safe, &SessionView::empty()).is_ok());
    }
}
