//! Bearer-token boundary. Tokens are minted by the account service; this
//! crate verifies them and resolves the caller's account, provisioning it
//! on first sight when the token carries the profile claims.

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::Span;
use uuid::Uuid;

use crate::models::user::Role;
use crate::state::AppState;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: Uuid,
    pub role: Role,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_email_verified: Option<bool>,
}

pub const EMAIL_NOT_VERIFIED: &str = "Please verify your email address to access this feature";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub email_verified: bool,
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthUser);

/// An authenticated caller whose email address is verified, unless the
/// deployment turned the check off.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedUser(pub AuthUser);

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::AuthError("Invalid token".to_string())
        })
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::AuthError("No token provided".to_string()))?;

        let app_state = AppState::from_ref(state);
        let claims = verify_token(token, &app_state.config.jwt_secret)?;

        Span::current().record("user_id", tracing::field::display(claims.id));

        let user = app_state.users.resolve(&claims).await?;
        Ok(AuthUser {
            id: user.id,
            role: user.role,
            email_verified: user.is_email_verified,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden(
                "You do not have permission to perform this action".to_string(),
            ));
        }
        Ok(AdminUser(user))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let app_state = AppState::from_ref(state);
        if app_state.config.require_email_verification && !user.email_verified {
            return Err(AppError::Forbidden(EMAIL_NOT_VERIFIED.to_string()));
        }
        Ok(VerifiedUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims() -> Claims {
        Claims {
            id: Uuid::new_v4(),
            role: Role::User,
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
            name: None,
            email: None,
            is_email_verified: None,
        }
    }

    #[test]
    fn accepts_token_signed_with_secret() {
        let claims = claims();
        let token = token_for(&claims, "s3cret");
        let verified = verify_token(&token, "s3cret").unwrap();
        assert_eq!(verified.id, claims.id);
        assert_eq!(verified.role, Role::User);
    }

    #[test]
    fn rejects_foreign_signature() {
        let token = token_for(&claims(), "other");
        assert!(matches!(
            verify_token(&token, "s3cret"),
            Err(AppError::AuthError(_))
        ));
    }

    #[test]
    fn profile_claims_are_optional() {
        let mut claims = claims();
        claims.email = Some("arta@umib.net".into());
        claims.is_email_verified = Some(true);
        let token = token_for(&claims, "s3cret");

        let verified = verify_token(&token, "s3cret").unwrap();
        assert_eq!(verified.email.as_deref(), Some("arta@umib.net"));
        assert_eq!(verified.is_email_verified, Some(true));
        assert!(verified.name.is_none());
    }

    #[test]
    fn rejects_expired_token() {
        let mut claims = claims();
        claims.exp = (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp() as usize;
        let token = token_for(&claims, "s3cret");
        assert!(verify_token(&token, "s3cret").is_err());
    }
}
