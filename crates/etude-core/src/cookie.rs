//! Outgoing cookie directives and the per-response cookie jar.
//!
//! Every directive is serialized into its own `Set-Cookie` value. Folding
//! several cookies into one header line makes user agents keep only the
//! last one, so [`CookieJar::flush`] always returns one entry per cookie.
//!
//! ```rust
//! use etude_core::cookie::{CookieJar, CookieOptions};
//!
//! let mut jar = CookieJar::new();
//! jar.add("theme", "dark", CookieOptions::default()).unwrap();
//! jar.add("lang", "nl", CookieOptions::default().max_age(3600)).unwrap();
//! jar.delete("login").unwrap();
//!
//! let headers = jar.flush();
//! assert_eq!(headers.len(), 3);
//! assert_eq!(headers[1], "lang=nl; Path=/; Max-Age=3600");
//! ```

use chrono::{DateTime, Utc};
use cookie::Cookie;
use cookie::time::{Duration, OffsetDateTime};

use crate::error::EtudeError;

pub use cookie::SameSite;

/// A serialized directive must stay strictly below this many bytes.
pub const MAX_COOKIE_SIZE: usize = 4096;

/// Attributes attached to a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            expires: None,
            path: Some("/".to_string()),
            domain: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }
}

impl CookieOptions {
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

/// One validated `Set-Cookie` directive.
///
/// Construction fails when the name is not an RFC 6265 token, when the value
/// holds bytes outside the cookie-octet set, or when the serialized form would
/// reach [`MAX_COOKIE_SIZE`].
#[derive(Debug, Clone, PartialEq)]
pub struct CookieDirective {
    cookie: Cookie<'static>,
    options: CookieOptions,
    serialized: String,
}

impl CookieDirective {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        options: CookieOptions,
    ) -> Result<Self, EtudeError> {
        let name = name.into();
        let value = value.into();

        // `cookie` writes whatever it is given; the checks are ours.
        if !is_token(&name) {
            return Err(EtudeError::InvalidCookie {
                name,
                reason: "name must be a non-empty token",
            });
        }
        if !value.bytes().all(is_cookie_octet) {
            return Err(EtudeError::InvalidCookie {
                name,
                reason: "value contains characters not allowed in a cookie",
            });
        }
        for attr in [options.path.as_deref(), options.domain.as_deref()]
            .into_iter()
            .flatten()
        {
            if attr.bytes().any(|b| b == b';' || b.is_ascii_control()) {
                return Err(EtudeError::InvalidCookie {
                    name,
                    reason: "attribute contains `;` or control characters",
                });
            }
        }

        let cookie = match build_cookie(name.clone(), value, &options) {
            Some(cookie) => cookie,
            None => {
                return Err(EtudeError::InvalidCookie {
                    name,
                    reason: "expiry is out of range",
                });
            }
        };
        let serialized = cookie.to_string();
        if serialized.len() >= MAX_COOKIE_SIZE {
            return Err(EtudeError::CookieTooLarge {
                name,
                size: serialized.len(),
                limit: MAX_COOKIE_SIZE,
            });
        }

        Ok(Self {
            cookie,
            options,
            serialized,
        })
    }

    /// A directive telling the client to drop `name` at the given path.
    pub fn removal(name: impl Into<String>, options: CookieOptions) -> Result<Self, EtudeError> {
        let options = CookieOptions {
            max_age: Some(0),
            expires: None,
            ..options
        };
        Self::new(name, "", options)
    }

    pub fn name(&self) -> &str {
        self.cookie.name()
    }

    pub fn value(&self) -> &str {
        self.cookie.value()
    }

    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    pub fn is_removal(&self) -> bool {
        self.cookie.max_age() == Some(Duration::ZERO)
    }

    /// The exact `Set-Cookie` header value.
    pub fn header_value(&self) -> &str {
        &self.serialized
    }
}

fn build_cookie(name: String, value: String, options: &CookieOptions) -> Option<Cookie<'static>> {
    let mut builder = Cookie::build((name, value))
        .secure(options.secure)
        .http_only(options.http_only);
    if let Some(path) = &options.path {
        builder = builder.path(path.clone());
    }
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(same_site);
    }

    let mut cookie = builder.build();
    match options.max_age {
        Some(age) if age <= 0 => {
            cookie.set_max_age(Duration::ZERO);
            cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        }
        Some(age) => cookie.set_max_age(Duration::seconds(age)),
        None => {}
    }
    if let Some(at) = options.expires {
        if options.max_age.is_none_or(|age| age > 0) {
            cookie.set_expires(OffsetDateTime::from_unix_timestamp(at.timestamp()).ok()?);
        }
    }
    Some(cookie)
}

// RFC 6265 section 4.1.1 / RFC 7230 token characters.
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

/// Accumulates the cookie directives of a single response.
///
/// Names are distinct: adding a name that is already queued replaces the
/// earlier directive.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    directives: Vec<CookieDirective>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a cookie. Nothing is queued when validation fails.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        options: CookieOptions,
    ) -> Result<(), EtudeError> {
        let directive = CookieDirective::new(name, value, options)?;
        self.push(directive);
        Ok(())
    }

    /// Queue an already validated directive.
    pub fn push(&mut self, directive: CookieDirective) {
        self.directives.retain(|d| d.name() != directive.name());
        self.directives.push(directive);
    }

    /// Queue a removal for a cookie set with the default path.
    pub fn delete(&mut self, name: impl Into<String>) -> Result<(), EtudeError> {
        self.delete_with(name, CookieOptions::default())
    }

    /// Queue a removal; `options` must carry the path/domain the cookie was set with.
    pub fn delete_with(
        &mut self,
        name: impl Into<String>,
        options: CookieOptions,
    ) -> Result<(), EtudeError> {
        let directive = CookieDirective::removal(name, options)?;
        self.push(directive);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CookieDirective> {
        self.directives.iter().find(|d| d.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CookieDirective> {
        self.directives.iter()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// One `Set-Cookie` value per directive, in insertion order.
    pub fn flush(self) -> Vec<String> {
        self.directives.into_iter().map(|d| d.serialized).collect()
    }
}

/// Split a request `Cookie` header into `(name, value)` pairs.
///
/// Malformed pairs are skipped and surrounding double quotes are stripped.
/// When a name repeats the first occurrence wins, matching how user agents
/// order the most specific cookie first.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for cookie in Cookie::split_parse(header).filter_map(Result::ok) {
        let name = cookie.name();
        if !is_token(name) || pairs.iter().any(|(n, _)| n == name) {
            continue;
        }
        pairs.push((name.to_string(), cookie.value_trimmed().to_string()));
    }
    pairs
}
