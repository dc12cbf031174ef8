use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{Owner, OwnerProfile};
use crate::db::repository::OwnerRepository;
use crate::error::AppError;
use crate::services::auth::AuthService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/me", get(me).put(update_me))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerResponse {
    pub id: String,
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub picture_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Owner> for OwnerResponse {
    fn from(owner: Owner) -> Self {
        Self {
            id: owner.id,
            subject: owner.subject,
            email: owner.email,
            name: owner.name,
            first_name: owner.first_name,
            last_name: owner.last_name,
            picture_url: owner.picture_url,
            created_at: owner.created_at.to_rfc3339(),
            updated_at: owner.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub picture_url: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get current owner info
async fn me(AuthUser(owner): AuthUser) -> Json<OwnerResponse> {
    Json(owner.into())
}

/// Override profile fields. Omitted fields keep their current value.
async fn update_me(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    Json(request): Json<UpdateMeRequest>,
) -> Result<Json<OwnerResponse>, AppError> {
    let profile = OwnerProfile {
        email: request.email.or(owner.email),
        name: request.name.or(owner.name),
        first_name: request.first_name.or(owner.first_name),
        last_name: request.last_name.or(owner.last_name),
        picture_url: request.picture_url.or(owner.picture_url),
    };

    let updated = OwnerRepository::update_profile(&state.db, &owner.id, &profile).await?;
    Ok(Json(updated.into()))
}

// ============================================================================
// Auth Middleware / Extractor
// ============================================================================

/// Extractor for the authenticated owner.
///
/// Verifies the bearer token and maps its subject onto an owner row, creating
/// it on first sight and refreshing the profile when the token carries changes.
pub struct AuthUser(pub Owner);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
            tracing::debug!("Authorization header doesn't start with 'Bearer '");
            return Err(AppError::Unauthorized);
        }

        let token = auth_header[7..].trim();
        if token.is_empty() {
            tracing::debug!("Empty bearer token in Authorization header");
            return Err(AppError::Unauthorized);
        }

        let claims = AuthService::decode_jwt(&state.config.jwt, token)?;
        let owner = OwnerRepository::upsert_from_identity(&state.db, &claims.sub, &claims.profile())
            .await?;

        tracing::debug!("Authenticated owner: {}", owner.id);
        Ok(AuthUser(owner))
    }
}
