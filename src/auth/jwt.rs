//! JWT token generation and validation
//! Implements access token + refresh token pattern

use crate::{config::AppConfig, error::AppError, models::user::User};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Only algorithm accepted when signing or verifying.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Role embedded in access tokens until role management exists.
pub const DEFAULT_ROLE: &str = "user";

const ACCESS_TOKEN_TYPE: &str = "access";
const REFRESH_TOKEN_TYPE: &str = "refresh";

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Issued at
    pub iat: i64,

    /// Expiration
    pub exp: i64,

    /// JWT ID (unique token identifier)
    pub jti: String,

    /// Token type, always "access"
    pub token_type: String,

    pub email: String,
    pub name: String,
    pub role: String,
}

/// JWT claims for refresh tokens
///
/// Unknown fields are rejected so that an access token, which carries
/// profile claims, can never be decoded as a refresh token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Issued at
    pub iat: i64,

    /// Expiration
    pub exp: i64,

    /// JWT ID (unique token identifier)
    pub jti: String,

    /// Token type, always "refresh"
    pub token_type: String,
}

/// Freshly issued access + refresh tokens
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// JWT service
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

/// Token lifetime in seconds as a `Duration`, rejecting values chrono cannot hold
fn ttl(kind: &str, secs: u64) -> Result<Duration, AppError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| AppError::Config(format!("{} token lifetime out of range: {}s", kind, secs)))
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, AppError> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal("Token expiry overflows the calendar".to_string()))
}

impl JwtService {
    /// Create JWT service from a raw secret and token lifetimes in seconds
    pub fn new(
        secret: &str,
        access_token_exp_secs: u64,
        refresh_token_exp_secs: u64,
    ) -> Result<Self, AppError> {
        // Ensure secret is at least 32 bytes for HS256
        if secret.len() < 32 {
            return Err(AppError::Config("JWT secret too short (min 32 chars)".to_string()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_ttl: ttl("access", access_token_exp_secs)?,
            refresh_token_ttl: ttl("refresh", refresh_token_exp_secs)?,
        })
    }

    /// Create JWT service from config
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.security.jwt_secret.expose_secret(),
            config.security.access_token_exp_secs,
            config.security.refresh_token_exp_secs,
        )
    }

    /// Issue a short-lived access token carrying denormalized profile claims
    pub fn generate_access_token(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AppError> {
        let expires_at = expiry(now, self.access_token_ttl)?;

        let claims = AccessClaims {
            sub: user.id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: DEFAULT_ROLE.to_string(),
        };

        let token = self.sign(&claims, "access")?;
        Ok((token, expires_at))
    }

    /// Issue a long-lived refresh token carrying only the subject
    pub fn generate_refresh_token(
        &self,
        user_id: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AppError> {
        let expires_at = expiry(now, self.refresh_token_ttl)?;

        let claims = RefreshClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
        };

        let token = self.sign(&claims, "refresh")?;
        Ok((token, expires_at))
    }

    /// Generate token pair
    pub fn generate_token_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        let now = Utc::now();
        let (access_token, access_expires_at) = self.generate_access_token(user, now)?;
        let (refresh_token, refresh_expires_at) = self.generate_refresh_token(&user.id, now)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Validate access token specifically
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        let claims: AccessClaims = self.decode_claims(token)?;

        if claims.token_type != ACCESS_TOKEN_TYPE {
            tracing::debug!("Token type mismatch: expected 'access', got '{}'", claims.token_type);
            return Err(AppError::InvalidToken);
        }

        ensure_not_expired(claims.exp)?;
        Ok(claims)
    }

    /// Validate refresh token specifically
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        let claims: RefreshClaims = self.decode_claims(token)?;

        if claims.token_type != REFRESH_TOKEN_TYPE {
            tracing::debug!("Token type mismatch: expected 'refresh', got '{}'", claims.token_type);
            return Err(AppError::InvalidToken);
        }

        ensure_not_expired(claims.exp)?;
        Ok(claims)
    }

    fn sign<T: Serialize>(&self, claims: &T, kind: &str) -> Result<String, AppError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key).map_err(|e| {
            tracing::error!(kind, "Failed to encode token: {:?}", e);
            AppError::Internal(format!("Failed to encode {} token: {}", kind, e))
        })
    }

    /// Verify signature, algorithm and expiry, then decode into the given claim shape
    fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> Result<T, AppError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token validation failed: {:?}", e);
                AppError::InvalidToken
            })
    }
}

/// Tokens are valid strictly before their expiry second.
fn ensure_not_expired(exp: i64) -> Result<(), AppError> {
    if Utc::now().timestamp() >= exp {
        tracing::debug!(exp, "Token expired");
        return Err(AppError::InvalidToken);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_32_characters_long!";

    fn service() -> JwtService {
        JwtService::new(SECRET, 900, 604800).unwrap()
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            password_hash: String::new(),
            hobby: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let service = service();
        let user = user();

        let pair = service.generate_token_pair(&user).unwrap();
        let claims = service.validate_access_token(&pair.access_token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.name, user.name);
        assert_eq!(claims.role, DEFAULT_ROLE);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_generate_and_validate_refresh_token() {
        let service = service();
        let user = user();

        let pair = service.generate_token_pair(&user).unwrap();
        let claims = service.validate_refresh_token(&pair.refresh_token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.exp - claims.iat, 604800);
        assert!(pair.refresh_expires_at > pair.access_expires_at);
    }

    #[test]
    fn test_token_shapes_are_not_interchangeable() {
        let service = service();
        let pair = service.generate_token_pair(&user()).unwrap();

        assert!(service.validate_refresh_token(&pair.access_token).is_err());
        assert!(service.validate_access_token(&pair.refresh_token).is_err());
    }

    #[test]
    fn test_token_ids_are_unique() {
        let service = service();
        let user = user();

        let first = service.generate_token_pair(&user).unwrap();
        let second = service.generate_token_pair(&user).unwrap();

        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn test_invalid_token_fails() {
        let service = service();
        assert!(service.validate_access_token("invalid_token").is_err());
        assert!(service.validate_refresh_token("invalid_token").is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtService::new("short", 900, 604800).is_err());
    }

    #[test]
    fn test_out_of_range_lifetime_rejected() {
        assert!(matches!(
            JwtService::new(SECRET, u64::MAX, 604800),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            JwtService::new(SECRET, 900, i64::MAX as u64),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_expiry_past_calendar_end_is_error() {
        // 在 chrono 可表示范围内，但叠加当前时间后溢出
        let service = JwtService::new(SECRET, 900, (i64::MAX / 1000) as u64).unwrap();
        let user_id = Uuid::new_v4();

        assert!(matches!(
            service.generate_refresh_token(&user_id, Utc::now()),
            Err(AppError::Internal(_))
        ));
    }
}
