//! Bearer token inspection.
//!
//! The client never verifies signatures; it only reads the `exp` claim so an
//! expired token is reported locally instead of failing the upgrade
//! repeatedly.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{ChannelError, Result};

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    #[serde(default)]
    exp: Option<i64>,
}

/// A JWT access token as handed out by the portal.
#[derive(Clone)]
pub struct AccessToken {
    raw: String,
    expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl AccessToken {
    /// Decode the token's claims. Tokens without `exp` never expire.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let mut parts = raw.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ChannelError::malformed_token("expected three segments"));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ChannelError::malformed_token(format!("payload is not base64url: {e}")))?;
        let claim: ExpiryClaim = serde_json::from_slice(&bytes)
            .map_err(|e| ChannelError::malformed_token(format!("payload is not JSON: {e}")))?;

        let expires_at = match claim.exp {
            Some(exp) => Some(
                DateTime::from_timestamp(exp, 0)
                    .ok_or_else(|| ChannelError::malformed_token("exp out of range"))?,
            ),
            None => None,
        };

        Ok(Self { raw, expires_at })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Fail with [`ChannelError::TokenExpired`] if the token is no longer valid.
    pub fn ensure_valid(&self) -> Result<()> {
        match self.expires_at {
            Some(exp) if self.is_expired() => Err(ChannelError::TokenExpired(exp)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_with(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_valid_token() {
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        let token = AccessToken::parse(token_with(&format!(r#"{{"sub":"42","exp":{exp}}}"#))).unwrap();
        assert_eq!(token.expires_at().map(|t| t.timestamp()), Some(exp));
        assert!(!token.is_expired());
        assert!(token.ensure_valid().is_ok());
    }

    #[test]
    fn test_expired_token() {
        let exp = (Utc::now() - Duration::minutes(5)).timestamp();
        let token = AccessToken::parse(token_with(&format!(r#"{{"exp":{exp}}}"#))).unwrap();
        assert!(token.is_expired());
        assert!(matches!(
            token.ensure_valid(),
            Err(ChannelError::TokenExpired(_))
        ));
    }

    #[test]
    fn test_token_without_exp_never_expires() {
        let token = AccessToken::parse(token_with(r#"{"sub":"42"}"#)).unwrap();
        assert_eq!(token.expires_at(), None);
        assert!(token.ensure_valid().is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        for raw in ["", "abc", "a.b", "a.b.c.d", "a.!!!.c"] {
            assert!(
                matches!(AccessToken::parse(raw), Err(ChannelError::MalformedToken(_))),
                "{raw:?} should be rejected"
            );
        }
        let not_json = format!("x.{}.y", URL_SAFE_NO_PAD.encode("not json"));
        assert!(AccessToken::parse(not_json).is_err());
    }

    #[test]
    fn test_debug_hides_raw_token() {
        let raw = token_with(r#"{"sub":"42"}"#);
        let token = AccessToken::parse(raw.clone()).unwrap();
        assert!(!format!("{token:?}").contains(&raw));
        assert_eq!(token.as_str(), raw);
    }
}
