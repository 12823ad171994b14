//! Session token signing and verification.
//!
//! Every authenticated Huddle request (REST and WebSocket) carries a session
//! token issued by the account service. The wire format is:
//!
//! ```text
//! Huddle-Session: {user_id}.{unix_timestamp}.{base64_signature}
//! ```
//!
//! where the signature is `HMAC-SHA256("{user_id}.{timestamp}", secret)`.
//! User ids must not contain `.`; the last two dot-separated segments are
//! always the timestamp and the signature.

/// Header name carrying the session token on REST requests.
pub const SESSION_HEADER: &str = "Huddle-Session";

/// Default maximum age of a session token (in seconds).
pub const DEFAULT_TOKEN_TTL: i64 = 24 * 60 * 60;

/// How far ahead of the verifier's clock a token timestamp may be (in seconds).
pub const MAX_CLOCK_SKEW: i64 = 60;

/// Errors produced by token operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid token format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("token expired")]
    Expired,
    #[error("token issued in the future")]
    NotYetValid,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// A parsed, not yet verified, session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub user_id: String,
    pub timestamp: i64,
    pub signature: Box<[u8]>,
}

impl SessionToken {
    /// Parse `{user_id}.{timestamp}.{base64}`.
    pub fn parse(value: &str) -> Result<Self, SignatureError> {
        let mut parts = value.rsplitn(3, '.');
        let encoded = parts.next().ok_or(SignatureError::InvalidFormat)?;
        let timestamp = parts.next().ok_or(SignatureError::InvalidFormat)?;
        let user_id = parts.next().ok_or(SignatureError::InvalidFormat)?;
        if user_id.is_empty() {
            return Err(SignatureError::InvalidFormat);
        }
        let timestamp: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::InvalidFormat)?;
        let signature = fast32::base64::RFC4648_NOPAD
            .decode_str(encoded)
            .map_err(|_| SignatureError::InvalidBase64)?
            .into_boxed_slice();
        Ok(Self {
            user_id: user_id.to_owned(),
            timestamp,
            signature,
        })
    }

    /// Verify the HMAC and the token age, returning the authenticated user id.
    pub fn verify(self, key: &[u8], max_age: i64) -> Result<String, SignatureError> {
        let data = signing_input(&self.user_id, self.timestamp);
        ring::hmac::verify(
            &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
            data.as_bytes(),
            self.signature.as_ref(),
        )?;
        check_timestamp(self.timestamp, max_age)?;
        Ok(self.user_id)
    }
}

fn signing_input(user_id: &str, timestamp: i64) -> String {
    format!("{user_id}.{timestamp}")
}

/// Issue a token for `user_id` stamped with the current time.
pub fn sign_session_token(user_id: &str, key: &[u8]) -> String {
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    sign_session_token_at(user_id, timestamp, key)
}

/// Issue a token for `user_id` with an explicit timestamp.
pub fn sign_session_token_at(user_id: &str, timestamp: i64, key: &[u8]) -> String {
    let sig = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        signing_input(user_id, timestamp).as_bytes(),
    );
    format!(
        "{}.{}.{}",
        user_id,
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(sig.as_ref())
    )
}

/// Parse and verify a token in one step.
pub fn verify_session_token(
    value: &str,
    key: &[u8],
    max_age: i64,
) -> Result<String, SignatureError> {
    SessionToken::parse(value)?.verify(key, max_age)
}

/// Check that a token timestamp is within `max_age` seconds and not more than
/// [`MAX_CLOCK_SKEW`] ahead of now.
pub fn check_timestamp(timestamp: i64, max_age: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if timestamp - now > MAX_CLOCK_SKEW {
        return Err(SignatureError::NotYetValid);
    }
    if now - timestamp > max_age {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Unix time at which a token stamped `timestamp` stops verifying.
pub fn expires_at(timestamp: i64, max_age: i64) -> i64 {
    timestamp.saturating_add(max_age)
}
