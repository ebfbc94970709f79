// Verifikasi access token HS256 yang diterbitkan auth provider
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::models::claims::{Principal, TokenClaims};

#[derive(Debug, Error, PartialEq)]
pub enum JwtError {
    #[error("JWT secret kosong")]
    MissingSecret,

    #[error("Token sudah expired")]
    Expired,

    #[error("Token tidak valid")]
    InvalidToken,

    #[error("Hanya access token yang diterima")]
    NotAccessToken,

    #[error("Role tidak dikenal: {0}")]
    UnknownRole(String),
}

/// Key dan aturan validasi dibangun sekali saat startup
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Result<Self, JwtError> {
        if secret.trim().is_empty() {
            return Err(JwtError::MissingSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, JwtError> {
        let data = decode::<TokenClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::InvalidToken,
            }
        })?;

        if !data.claims.is_access_token() {
            return Err(JwtError::NotAccessToken);
        }
        Ok(data.claims)
    }

    /// Token -> principal yang dipakai workflow
    pub fn principal(&self, token: &str) -> Result<Principal, JwtError> {
        let claims = self.verify(token)?;
        claims
            .principal()
            .ok_or(JwtError::UnknownRole(claims.role))
    }
}

pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
