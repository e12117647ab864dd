//! Accounts as this service knows them: resolved from bearer-token claims,
//! provisioned on first sight, and editable through the profile endpoints.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::Claims;
use crate::clock::Clock;
use crate::models::user::{is_allowed_domain, UpdateProfileRequest, User};
use crate::repository::UserRepository;
use crate::utils::error::AppError;

pub const USER_NOT_FOUND: &str = "User not found";
pub const EMAIL_IN_USE: &str = "Email already in use";

pub struct UserService {
    users: Arc<dyn UserRepository>,
    clock: Arc<dyn Clock>,
    allowed_domains: Vec<String>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        clock: Arc<dyn Clock>,
        allowed_domains: Vec<String>,
    ) -> Self {
        Self {
            users,
            clock,
            allowed_domains,
        }
    }

    /// The account behind a verified token.
    ///
    /// An unknown id is provisioned when the token carries a name and an
    /// email; otherwise the caller is rejected with "User not found". A
    /// token asserting a verified email marks the stored account verified.
    pub async fn resolve(&self, claims: &Claims) -> Result<User, AppError> {
        if let Some(user) = self.users.find_by_id(claims.id).await? {
            if claims.is_email_verified == Some(true) && !user.is_email_verified {
                return self.mark_verified(user).await;
            }
            return Ok(user);
        }

        let name = claims.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let email = claims
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        let (name, email) = match (name, email) {
            (Some(name), Some(email)) => (name, email),
            _ => return Err(AppError::AuthError(USER_NOT_FOUND.to_string())),
        };
        self.check_domain(&email)?;

        let user = User::new(
            claims.id,
            name.to_string(),
            email,
            claims.role,
            claims.is_email_verified.unwrap_or(false),
            self.clock.now(),
        );
        let user = self.users.create(&user).await?;
        info!(user_id = %user.id, verified = user.is_email_verified, "Account provisioned from token");
        Ok(user)
    }

    pub async fn profile(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))
    }

    pub async fn update_profile(
        &self,
        id: Uuid,
        patch: UpdateProfileRequest,
    ) -> Result<User, AppError> {
        let patch = patch.normalized();
        patch.validate()?;

        let mut user = self.profile(id).await?;

        if let Some(email) = patch.email.as_deref().filter(|e| *e != user.email) {
            self.check_domain(email)?;
            if let Some(holder) = self.users.find_by_email(email).await? {
                if holder.id != id {
                    return Err(AppError::ValidationError(EMAIL_IN_USE.to_string()));
                }
            }
        }

        patch.apply(&mut user);
        user.updated_at = self.clock.now();

        let user = self
            .users
            .update(&user)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;
        info!(user_id = %id, "Profile updated");
        Ok(user)
    }

    async fn mark_verified(&self, mut user: User) -> Result<User, AppError> {
        user.is_email_verified = true;
        user.updated_at = self.clock.now();
        let id = user.id;
        let user = self
            .users
            .update(&user)
            .await?
            .ok_or_else(|| AppError::AuthError(USER_NOT_FOUND.to_string()))?;
        info!(user_id = %id, "Email verification recorded");
        Ok(user)
    }

    fn check_domain(&self, email: &str) -> Result<(), AppError> {
        if is_allowed_domain(email, &self.allowed_domains) {
            return Ok(());
        }
        Err(AppError::ValidationError(format!(
            "Only university email addresses are allowed. Accepted domains: {}",
            self.allowed_domains.join(", ")
        )))
    }
}
