use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::db::models::OwnerProfile;
use crate::error::AppResult;

/// Bearer-token claims: the identity provider's stable subject plus the
/// profile fields it vouches for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl Claims {
    pub fn profile(&self) -> OwnerProfile {
        OwnerProfile {
            email: self.email.clone(),
            name: self.name.clone(),
            first_name: self.given_name.clone(),
            last_name: self.family_name.clone(),
            picture_url: self.picture.clone(),
        }
    }
}

pub struct AuthService;

impl AuthService {
    /// Issue a token for `subject`. Used by tests and local tooling; in
    /// production tokens come from the identity provider.
    pub fn create_jwt(config: &JwtConfig, subject: &str, profile: &OwnerProfile) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(config.expiration_hours);
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
            email: profile.email.clone(),
            name: profile.name.clone(),
            given_name: profile.first_name.clone(),
            family_name: profile.last_name.clone(),
            picture: profile.picture_url.clone(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Decode and validate a JWT, returning the claims
    pub fn decode_jwt(config: &JwtConfig, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

/// User id as known to the token broker. Subjects of the form
/// `issuer|user_id` carry the broker id after the last `|`.
pub fn external_user_id(subject: &str) -> &str {
    subject.rsplit('|').next().unwrap_or(subject)
}
