//! Tamper-evident cookie values.
//!
//! A token is `base64url(envelope) "." base64url(HMAC-SHA256(key, base64url(envelope)))`
//! where the envelope is the JSON `{"d": <payload>, "e": <unix expiry>?}`.
//! Both segments use the unpadded URL-safe alphabet, so a token never holds
//! `;`, `,`, `=` or whitespace and can be used as a cookie value verbatim.
//!
//! All session state lives in these tokens; the only server-side state is the
//! [`SigningKey`], loaded once from configuration and shared read-only.

use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::error::EtudeError;

type HmacSha256 = Hmac<Sha256>;

/// Why a token was rejected. Callers treat every variant as "cookie absent".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not of the form payload.signature")]
    Malformed,
    #[error("signature does not match payload")]
    BadSignature,
    #[error("payload could not be decoded")]
    BadPayload,
    #[error("token has expired")]
    Expired,
}

/// The process-wide signing secret, keyed into an HMAC state once.
#[derive(Clone)]
pub struct SigningKey {
    keyed: HmacSha256,
}

impl SigningKey {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, EtudeError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(EtudeError::Config("signing secret must not be empty".to_string()));
        }
        let keyed = HmacSha256::new_from_slice(secret)
            .map_err(|e| EtudeError::Config(format!("unusable signing secret: {}", e)))?;
        Ok(Self { keyed })
    }

    fn mac(&self) -> HmacSha256 {
        self.keyed.clone()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    d: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    e: Option<i64>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    d: T,
    #[serde(default)]
    e: Option<i64>,
}

/// Encodes payloads into signed tokens and decodes them back.
#[derive(Debug, Clone)]
pub struct SignedCookieCodec {
    key: SigningKey,
}

impl SignedCookieCodec {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Sign `payload` without an expiry.
    pub fn encode<T: Serialize>(&self, payload: &T) -> Result<String, EtudeError> {
        self.seal(payload, None)
    }

    /// Sign `payload`; the token stops decoding once `ttl` has elapsed.
    pub fn encode_with_expiry<T: Serialize>(
        &self,
        payload: &T,
        ttl: Duration,
    ) -> Result<String, EtudeError> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl);
        self.seal(payload, Some(expires))
    }

    fn seal<T: Serialize>(&self, payload: &T, expires: Option<i64>) -> Result<String, EtudeError> {
        let json = serde_json::to_vec(&EnvelopeRef {
            d: payload,
            e: expires,
        })
        .map_err(|e| EtudeError::Internal(format!("Failed to serialize cookie payload: {}", e)))?;

        let body = URL_SAFE_NO_PAD.encode(json);
        let mut mac = self.key.mac();
        mac.update(body.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", body, signature))
    }

    /// Verify and decode a token.
    ///
    /// The signature is checked in constant time before the payload bytes are
    /// even base64-decoded; expiry is checked last.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let (body, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        if body.is_empty() || signature.contains('.') {
            return Err(TokenError::Malformed);
        }
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.key.mac();
        mac.update(body.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| TokenError::BadPayload)?;
        let envelope: Envelope<T> =
            serde_json::from_slice(&json).map_err(|_| TokenError::BadPayload)?;

        if let Some(expires) = envelope.e {
            if Utc::now().timestamp() >= expires {
                return Err(TokenError::Expired);
            }
        }
        Ok(envelope.d)
    }

    /// Decode into an untyped JSON value, discarding the failure reason.
    pub fn decode_value(&self, token: &str) -> Option<serde_json::Value> {
        self.decode(token).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(secret: &str) -> SignedCookieCodec {
        SignedCookieCodec::new(SigningKey::new(secret).unwrap())
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(SigningKey::new("").is_err());
    }

    #[test]
    fn token_is_cookie_safe() {
        let token = codec("k").encode(&"a; b=c, \"d\"").unwrap();
        assert!(
            token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
        );
    }

    #[test]
    fn expired_tokens_are_rejected_after_signature_check() {
        let c = codec("k");
        let token = c.encode_with_expiry(&42u32, Duration::ZERO).unwrap();
        assert_eq!(c.decode::<u32>(&token), Err(TokenError::Expired));
        assert_eq!(
            codec("other").decode::<u32>(&token),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn live_expiry_decodes() {
        let c = codec("k");
        let token = c
            .encode_with_expiry(&"hi".to_string(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(c.decode::<String>(&token).unwrap(), "hi");
    }

    #[test]
    fn malformed_shapes() {
        let c = codec("k");
        assert_eq!(c.decode::<u8>(""), Err(TokenError::Malformed));
        assert_eq!(c.decode::<u8>("abc"), Err(TokenError::Malformed));
        assert_eq!(c.decode::<u8>(".abc"), Err(TokenError::Malformed));
        assert_eq!(c.decode::<u8>("a.b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn valid_signature_wrong_type_is_bad_payload() {
        let c = codec("k");
        let token = c.encode(&"text").unwrap();
        assert_eq!(c.decode::<u64>(&token), Err(TokenError::BadPayload));
    }
}
