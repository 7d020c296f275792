//! Identity verification for incoming connections.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AuthError;
use crate::storage::UserProfile;

/// A verified user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

impl From<&Identity> for UserProfile {
    fn from(identity: &Identity) -> Self {
        UserProfile {
            id: identity.user_id.clone(),
            name: identity.name.clone(),
            avatar: identity.avatar.clone(),
        }
    }
}

/// Resolves a bearer token to a user.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Verifier backed by a fixed token table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` for `identity`, replacing any previous owner.
    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<(String, Identity)> for StaticTokenVerifier {
    fn from_iter<I: IntoIterator<Item = (String, Identity)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Pulls the token out of a handshake request.
///
/// A non-empty `token` query parameter wins over an `Authorization: Bearer`
/// header. A malformed query value is ignored.
pub fn extract_token(query: Option<&str>, authorization: Option<&str>) -> Option<String> {
    let from_query = query
        .and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "token")
                .and_then(|(_, value)| decode_query_value(value))
        })
        .filter(|token| !token.is_empty());

    from_query.or_else(|| {
        authorization
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Decodes `%XX` escapes and `+` as in `application/x-www-form-urlencoded`.
fn decode_query_value(value: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut input = value.bytes();
    while let Some(byte) = input.next() {
        match byte {
            b'%' => {
                let hi = char::from(input.next()?).to_digit(16)?;
                let lo = char::from(input.next()?).to_digit(16)?;
                bytes.push(u8::try_from(hi * 16 + lo).ok()?);
            }
            b'+' => bytes.push(b' '),
            other => bytes.push(other),
        }
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            user_id: "u-alice".into(),
            name: "Alice".into(),
            avatar: String::new(),
        }
    }

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticTokenVerifier::new().with_token("secret", alice());

        assert_eq!(verifier.verify("secret").await, Ok(alice()));
        assert_eq!(verifier.verify("wrong").await, Err(AuthError::InvalidToken));
        assert_eq!(verifier.verify("").await, Err(AuthError::MissingToken));
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(
            extract_token(Some("a=1&token=abc"), None).as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_token(None, Some("Bearer xyz")).as_deref(),
            Some("xyz")
        );
        assert_eq!(
            extract_token(Some("token=q"), Some("Bearer h")).as_deref(),
            Some("q")
        );
        assert_eq!(extract_token(Some("token="), None), None);
        assert_eq!(extract_token(Some("other=1"), Some("Basic zzz")), None);
        assert_eq!(extract_token(None, None), None);
    }

    #[test]
    fn test_empty_query_token_falls_back_to_header() {
        assert_eq!(
            extract_token(Some("token="), Some("Bearer h")).as_deref(),
            Some("h")
        );
        assert_eq!(
            extract_token(Some("token=%zz"), Some("Bearer h")).as_deref(),
            Some("h")
        );
        assert_eq!(extract_token(Some("token="), Some("Bearer  ")), None);
    }

    #[test]
    fn test_query_token_is_percent_decoded() {
        assert_eq!(
            extract_token(Some("token=a%2Bb%3D%3D"), None).as_deref(),
            Some("a+b==")
        );
        assert_eq!(
            extract_token(Some("token=two+words"), None).as_deref(),
            Some("two words")
        );
        assert_eq!(extract_token(Some("token=%E2%9C%93"), None).as_deref(), Some("✓"));
        assert_eq!(extract_token(Some("token=%4"), None), None);
    }
}
