//! Authentication: Argon2id passwords and HS256 access/refresh tokens.
//!
//! Only a digest of the latest refresh token is stored on the account; a
//! refresh request must present that exact token, and the pair is rotated.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use oiyn_common::auth::{ACCESS_TOKEN, Claims, REFRESH_TOKEN};
use oiyn_common::config::AuthConfig;
use oiyn_common::id::generate_id;
use oiyn_common::models::user::User;
use serde::Serialize;
use sha2::{Digest, Sha256};

pub use oiyn_common::auth::validate_token;

/// Token pair returned on signup, login, and refresh.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn generate_token(
    user: &User,
    token_type: &str,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        name: user.display_name(),
        role: user.role,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_secs as i64)).timestamp(),
        token_type: token_type.to_string(),
        jti: generate_id().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Generate both access and refresh tokens.
pub fn generate_token_pair(
    user: &User,
    config: &AuthConfig,
) -> Result<TokenPair, jsonwebtoken::errors::Error> {
    Ok(TokenPair {
        access_token: generate_token(
            user,
            ACCESS_TOKEN,
            &config.jwt_secret,
            config.access_token_ttl_secs,
        )?,
        refresh_token: generate_token(
            user,
            REFRESH_TOKEN,
            &config.jwt_secret,
            config.refresh_token_ttl_secs,
        )?,
        expires_in: config.access_token_ttl_secs,
        token_type: "Bearer".to_string(),
    })
}

/// SHA-256 hex digest of a token, as stored on the account.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oiyn_common::models::user::Role;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: generate_id(),
            email: "dana@oiyn.kz".into(),
            password_hash: String::new(),
            first_name: "Dana".into(),
            last_name: "K".into(),
            city: None,
            photo_url: None,
            about: None,
            role: Role::Admin,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            access_token_ttl_secs: 60,
            refresh_token_ttl_secs: 600,
        }
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn token_pair_carries_role_and_type() {
        let user = user();
        let pair = generate_token_pair(&user, &config()).unwrap();

        let access = validate_token(&pair.access_token, "test-secret").unwrap();
        assert_eq!(access.sub, user.id.to_string());
        assert_eq!(access.role, Role::Admin);
        assert_eq!(access.token_type, ACCESS_TOKEN);

        let refresh = validate_token(&pair.refresh_token, "test-secret").unwrap();
        assert_eq!(refresh.token_type, REFRESH_TOKEN);
        assert_ne!(access.jti, refresh.jti);

        assert!(validate_token(&pair.access_token, "other-secret").is_err());
    }

    #[test]
    fn digest_is_stable_hex() {
        let d = token_digest("abc");
        assert_eq!(d.len(), 64);
        assert_eq!(d, token_digest("abc"));
        assert_ne!(d, token_digest("abd"));
    }
}
