//! Session token generation and validation.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::UserRole;
use crate::models::UserProfile;

/// JWT claims for session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user UUID)
    pub sub: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl SessionClaims {
    /// The identity carried by these claims.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.sub.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

/// Default session token duration: 24 hours
pub const SESSION_TOKEN_DURATION_SECS: u64 = 24 * 60 * 60;

/// HMAC family used to sign session tokens.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SigningAlgorithm {
    #[default]
    Hs256,
    Hs384,
    Hs512,
}

impl SigningAlgorithm {
    fn to_jwt(self) -> Algorithm {
        match self {
            SigningAlgorithm::Hs256 => Algorithm::HS256,
            SigningAlgorithm::Hs384 => Algorithm::HS384,
            SigningAlgorithm::Hs512 => Algorithm::HS512,
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    token_duration: u64,
}

/// Result of generating a session token.
#[derive(Debug, Clone)]
pub struct SessionTokenResult {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration signing with HS256.
    pub fn new(secret: &[u8]) -> Result<Self, JwtError> {
        Self::with_algorithm(secret, SigningAlgorithm::default())
    }

    /// Create a new JWT configuration with an explicit signing algorithm.
    /// An empty secret is rejected so a misconfigured server never starts.
    pub fn with_algorithm(secret: &[u8], algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::MissingSecret);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: algorithm.to_jwt(),
            token_duration: SESSION_TOKEN_DURATION_SECS,
        })
    }

    /// Override the lifetime of issued tokens.
    pub fn with_token_duration(mut self, secs: u64) -> Self {
        self.token_duration = secs;
        self
    }

    pub fn token_duration(&self) -> u64 {
        self.token_duration
    }

    /// Generate a session token for a user.
    pub fn generate_session_token(
        &self,
        user: &UserProfile,
    ) -> Result<SessionTokenResult, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let exp = now
            .checked_add(self.token_duration)
            .ok_or(JwtError::ExpiryOverflow)?;

        let claims = SessionClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(SessionTokenResult {
            token,
            expires_at: exp,
        })
    }

    /// Validate and decode a session token.
    pub fn validate_session_token(&self, token: &str) -> Result<SessionClaims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(
                |e| match e.kind() {
                    ErrorKind::ExpiredSignature => JwtError::Expired,
                    _ => JwtError::Decoding(e),
                },
            )?;

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// No signing secret configured
    MissingSecret,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature, malformed token or wrong algorithm
    Decoding(jsonwebtoken::errors::Error),
    /// Signature is valid but the token is past its expiry
    Expired,
    /// System time error
    TimeError,
    /// Token lifetime pushes the expiry past the representable range
    ExpiryOverflow,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::MissingSecret => write!(f, "JWT signing secret is not configured"),
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::Expired => write!(f, "Token has expired"),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::ExpiryOverflow => write!(f, "Token lifetime is too long"),
        }
    }
}

impl std::error::Error for JwtError {}
