//! JWT Token Handler
//! Mission: Issue and verify signed identity tokens

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use tracing::debug;

use crate::auth::models::Claims;

/// Tokens are valid for 8 hours from issuance.
const TOKEN_LIFETIME_HOURS: i64 = 8;

/// HS512 wants a 512-bit key.
const KEY_BYTES: usize = 64;

/// Issues and verifies HS512-signed tokens with a process-lifetime key.
///
/// The signing key is generated at construction and held only in memory:
/// restarting the process invalidates every previously issued token. That is
/// a deliberate trade-off, not a bug.
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtHandler {
    /// Create a handler with a fresh random 512-bit signing key.
    pub fn new() -> Self {
        let mut secret = [0u8; KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::from_secret(&secret)
    }

    fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        // No leeway: verification flips exactly at the expiry boundary.
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token asserting `subject`, valid for the standard lifetime.
    pub fn issue(&self, subject: &str) -> anyhow::Result<String> {
        self.issue_at(subject, Utc::now())
    }

    /// Issue with an explicit issued-at instant. Login always uses `issue`;
    /// this exists so expiry behavior is testable without sleeping.
    pub fn issue_at(&self, subject: &str, issued_at: DateTime<Utc>) -> anyhow::Result<String> {
        let expiry = issued_at + Duration::hours(TOKEN_LIFETIME_HOURS);

        let claims = Claims {
            sub: subject.to_string(),
            iat: issued_at.timestamp() as usize,
            exp: expiry.timestamp() as usize,
        };

        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)?;

        debug!(subject, "Issued token");
        Ok(token)
    }

    /// Verify the signature and expiry, returning the encoded subject.
    ///
    /// Every failure mode on attacker-controlled input (malformed token,
    /// signature mismatch, elapsed expiry) is a plain `None`, never an error.
    pub fn verify(&self, token: &str) -> Option<String> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims.sub),
            Err(err) => {
                debug!(error = %err, "Token rejected");
                None
            }
        }
    }
}

impl Default for JwtHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_round_trip() {
        let handler = JwtHandler::new();

        let token = handler.issue("admin").unwrap();
        assert!(!token.is_empty());

        assert_eq!(handler.verify(&token).as_deref(), Some("admin"));
        // Verification is deterministic until the expiry boundary.
        assert_eq!(handler.verify(&token).as_deref(), Some("admin"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let handler = JwtHandler::new();

        // Issued 9 hours ago, so the 8-hour lifetime has elapsed.
        let issued_at = Utc::now() - Duration::hours(9);
        let token = handler.issue_at("admin", issued_at).unwrap();

        assert!(handler.verify(&token).is_none());
    }

    #[test]
    fn test_token_near_expiry_still_valid() {
        let handler = JwtHandler::new();

        // Issued 7 hours ago: one hour of validity left.
        let issued_at = Utc::now() - Duration::hours(7);
        let token = handler.issue_at("user", issued_at).unwrap();

        assert_eq!(handler.verify(&token).as_deref(), Some("user"));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let handler = JwtHandler::new();
        let token = handler.issue("admin").unwrap();

        // Flip one character in the signature segment.
        let (prefix, signature) = token.rsplit_once('.').unwrap();
        let mut sig: Vec<char> = signature.chars().collect();
        sig[0] = if sig[0] == 'A' { 'B' } else { 'A' };
        let tampered = format!("{}.{}", prefix, sig.into_iter().collect::<String>());

        assert_ne!(token, tampered);
        assert!(handler.verify(&tampered).is_none());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let handler = JwtHandler::new();

        assert!(handler.verify("").is_none());
        assert!(handler.verify("not-a-token").is_none());
        assert!(handler.verify("a.b.c").is_none());
        assert!(handler.verify("eyJhbGciOiJIUzUxMiJ9..").is_none());
    }

    #[test]
    fn test_different_keys_reject() {
        let handler1 = JwtHandler::new();
        let handler2 = JwtHandler::new();

        let token = handler1.issue("admin").unwrap();

        // Each process generates its own key, so another handler's tokens
        // never verify.
        assert!(handler2.verify(&token).is_none());
    }
}
