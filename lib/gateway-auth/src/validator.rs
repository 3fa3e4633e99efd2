//! JWT parsing and verification
//!
//! Tokens are HMAC-SHA256 signed with a shared secret; the signing key is
//! derived once from the base64-encoded secret at startup and reused for
//! every validation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use gateway_core::AuthError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Claims carried by gateway tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id.
    pub sub: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiration, seconds since the epoch.
    pub exp: i64,
    /// "access" or "refresh".
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Whether the token carries the given role. Accepts both bare role
    /// names and Spring-style `ROLE_`-prefixed authorities.
    pub fn has_role(&self, role: &str) -> bool {
        let prefixed = format!("ROLE_{}", role);
        self.roles
            .iter()
            .any(|r| r.eq_ignore_ascii_case(role) || r.eq_ignore_ascii_case(&prefixed))
    }
}

/// Token-type tag distinguishing access from refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl std::str::FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenType::Access),
            "refresh" => Ok(TokenType::Refresh),
            other => Err(format!("unknown token type: {}", other)),
        }
    }
}

/// Validates bearer tokens against the shared-secret signing key.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    expected_type: Option<TokenType>,
}

impl JwtValidator {
    /// Build a validator from the base64-encoded shared secret.
    pub fn new(base64_secret: &str, expected_type: Option<TokenType>) -> anyhow::Result<Self> {
        let key_bytes = BASE64
            .decode(base64_secret)
            .map_err(|e| anyhow::anyhow!("JWT secret is not valid base64: {}", e))?;
        if key_bytes.is_empty() {
            anyhow::bail!("JWT secret must not be empty");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            decoding_key: DecodingKey::from_secret(&key_bytes),
            validation,
            expected_type,
        })
    }

    /// Validate the `Authorization` header value, if any.
    pub fn authenticate_header(&self, header: Option<&str>) -> Result<Claims, AuthError> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingOrMalformedToken)?;
        self.validate(token)
    }

    /// Validate a raw token: signature, then structure, then expiry, then
    /// the optional token-type tag.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            let err = match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::MalformedToken,
            };
            warn!(error = %e, "token validation failed");
            err
        })?;

        let claims = data.claims;

        if let Some(expected) = self.expected_type {
            let actual = claims.token_type.as_deref().unwrap_or("unknown");
            if !actual.eq_ignore_ascii_case(expected.as_str()) {
                return Err(AuthError::WrongTokenType {
                    expected: expected.as_str().to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        debug!(sub = %claims.sub, "token validated");
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "dGhpcy1pcy1hLXRlc3Qtc2VjcmV0LWtleS0zMi1ieXRlcyE=";

    fn encoding_key(base64_secret: &str) -> EncodingKey {
        let bytes = BASE64.decode(base64_secret).unwrap();
        EncodingKey::from_secret(&bytes)
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn token(sub: &str, exp_offset: i64, token_type: Option<&str>, roles: &[&str]) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            iat: now(),
            exp: now() + exp_offset,
            token_type: token_type.map(|t| t.to_string()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        encode(&Header::default(), &claims, &encoding_key(SECRET)).unwrap()
    }

    fn validator() -> JwtValidator {
        JwtValidator::new(SECRET, None).unwrap()
    }

    #[test]
    fn test_valid_token_yields_subject() {
        let claims = validator()
            .validate(&token("alice", 3600, Some("access"), &[]))
            .unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.token_type.as_deref(), Some("access"));
    }

    #[test]
    fn test_expired_token() {
        let err = validator()
            .validate(&token("alice", -3600, Some("access"), &[]))
            .unwrap_err();
        assert_eq!(err, AuthError::ExpiredToken);
    }

    #[test]
    fn test_invalid_signature() {
        let other_secret = "YW5vdGhlci1zZWNyZXQta2V5LXRoYXQtZGlmZmVycyE=";
        let claims = Claims {
            sub: "alice".to_string(),
            iat: now(),
            exp: now() + 3600,
            token_type: None,
            roles: vec![],
        };
        let forged = encode(&Header::default(), &claims, &encoding_key(other_secret)).unwrap();
        let err = validator().validate(&forged).unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature);
    }

    #[test]
    fn test_malformed_token() {
        let err = validator().validate("not-a-jwt").unwrap_err();
        assert_eq!(err, AuthError::MalformedToken);
    }

    #[test]
    fn test_wrong_token_type() {
        let strict = JwtValidator::new(SECRET, Some(TokenType::Access)).unwrap();
        let err = strict
            .validate(&token("alice", 3600, Some("refresh"), &[]))
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::WrongTokenType {
                expected: "access".to_string(),
                actual: "refresh".to_string(),
            }
        );

        // Matching type passes.
        assert!(strict
            .validate(&token("alice", 3600, Some("access"), &[]))
            .is_ok());
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let v = validator();
        assert_eq!(
            v.authenticate_header(None).unwrap_err(),
            AuthError::MissingOrMalformedToken
        );
        assert_eq!(
            v.authenticate_header(Some("Basic dXNlcjpwYXNz")).unwrap_err(),
            AuthError::MissingOrMalformedToken
        );
        assert_eq!(
            v.authenticate_header(Some("Bearer ")).unwrap_err(),
            AuthError::MissingOrMalformedToken
        );
    }

    #[test]
    fn test_bearer_header_accepted() {
        let header = format!("Bearer {}", token("bob", 3600, None, &[]));
        let claims = validator().authenticate_header(Some(&header)).unwrap();
        assert_eq!(claims.sub, "bob");
    }

    #[test]
    fn test_roles() {
        let claims = validator()
            .validate(&token("admin", 3600, None, &["ROLE_ADMIN"]))
            .unwrap();
        assert!(claims.has_role("ADMIN"));
        assert!(!claims.has_role("SUPERUSER"));

        let bare = validator()
            .validate(&token("admin", 3600, None, &["ADMIN"]))
            .unwrap();
        assert!(bare.has_role("ADMIN"));
    }

    #[test]
    fn test_bad_secret_rejected_at_startup() {
        assert!(JwtValidator::new("%%%not-base64%%%", None).is_err());
        assert!(JwtValidator::new("", None).is_err());
    }
}
