//! Authentication service for the catalog.
//!
//! Provides password hashing with Argon2 and JWT token management.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::models::UserRole;
use crate::error::{AppError, Result};

/// JWT claims for authentication tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: i64,
    pub role: UserRole,
    /// Expiration timestamp (Unix time)
    pub exp: usize,
    /// Issued at timestamp (Unix time)
    pub iat: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Authentication service handling password hashing and JWT tokens.
pub struct AuthService {
    jwt_secret: String,
    token_ttl_secs: usize,
    argon2: Argon2<'static>,
}

impl AuthService {
    /// Creates a service issuing tokens valid for `token_ttl_hours`.
    pub fn new(jwt_secret: String, token_ttl_hours: u64) -> Self {
        Self {
            jwt_secret,
            token_ttl_secs: (token_ttl_hours as usize).saturating_mul(60 * 60),
            argon2: Argon2::default(),
        }
    }

    /// Hashes a password using Argon2.
    ///
    /// Returns the PHC-formatted hash string.
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
        Ok(hash.to_string())
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;

        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    pub fn create_token(&self, user_id: i64, role: UserRole) -> Result<String> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| AppError::Internal(format!("System time error: {}", e)))?
            .as_secs() as usize;

        let claims = Claims {
            sub: user_id,
            role,
            exp: now + self.token_ttl_secs,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token creation failed: {}", e)))
    }

    /// Verifies a JWT token and returns the claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            AppError::Unauthorized
        })?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> AuthService {
        AuthService::new("test-secret-key-for-testing".to_string(), 24)
    }

    #[test]
    fn test_password_hash_and_verify() {
        let service = test_service();

        let hash = service.hash_password("correct horse").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(service.verify_password("correct horse", &hash).unwrap());
        assert!(!service.verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn test_same_password_gets_fresh_salt() {
        let service = test_service();

        let first = service.hash_password("password1").unwrap();
        let second = service.hash_password("password1").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_token_carries_role_and_ttl() {
        let service = AuthService::new("secret".to_string(), 2);

        let token = service.create_token(42, UserRole::Admin).unwrap();
        let claims = service.verify_token(&token).unwrap();

        assert_eq!(claims.sub, 42);
        assert!(claims.is_admin());
        assert_eq!(claims.exp - claims.iat, 2 * 60 * 60);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let service = test_service();
        assert!(matches!(
            service.verify_token("invalid-token"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_token_from_different_secret_rejected() {
        let service1 = AuthService::new("secret1".to_string(), 24);
        let service2 = AuthService::new("secret2".to_string(), 24);

        let token = service1.create_token(1, UserRole::User).unwrap();

        assert!(service2.verify_token(&token).is_err());
    }

    #[test]
    fn test_malformed_hash_is_internal_error() {
        let service = test_service();
        assert!(matches!(
            service.verify_password("x", "not-a-phc-string"),
            Err(AppError::Internal(_))
        ));
    }
}
