use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::parse_column;
use crate::models::user::{Role, User};
use crate::repository::UserRepository;
use crate::services::users::EMAIL_IN_USE;
use crate::utils::error::AppError;

const EMAIL_INDEX: &str = "users_email_key";

const USER_COLUMNS: &str = "id, name, email, role, is_email_verified, location, phone, bio, \
    interests, preferred_language, created_at, updated_at";

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    is_email_verified: bool,
    location: String,
    phone: String,
    bio: String,
    interests: String,
    preferred_language: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role: parse_column::<Role>("role", &row.role)?,
            is_email_verified: row.is_email_verified,
            location: row.location,
            phone: row.phone,
            bio: row.bio,
            interests: row.interests,
            preferred_language: row.preferred_language,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn select_sql(suffix: &str) -> String {
    format!("SELECT {} FROM users {}", USER_COLUMNS, suffix)
}

fn map_write_error(err: sqlx::Error) -> AppError {
    if AppError::violated_unique_index(&err) == Some(EMAIL_INDEX) {
        AppError::ValidationError(EMAIL_IN_USE.to_string())
    } else {
        AppError::DatabaseError(err)
    }
}

pub struct PostgresUserRepo {
    pool: PgPool,
}

impl PostgresUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&select_sql("WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&select_sql("WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        // Two first requests with the same token race here; the loser reads
        // the winner's row.
        let inserted = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (id) DO NOTHING RETURNING {}",
            USER_COLUMNS, USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.is_email_verified)
        .bind(&user.location)
        .bind(&user.phone)
        .bind(&user.bio)
        .bind(&user.interests)
        .bind(&user.preferred_language)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        match inserted {
            Some(row) => User::try_from(row),
            None => self.find_by_id(user.id).await?.ok_or_else(|| {
                AppError::InternalServerError("account vanished after insert".to_string())
            }),
        }
    }

    async fn update(&self, user: &User) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET name = $2, email = $3, location = $4, phone = $5, bio = $6, \
             interests = $7, preferred_language = $8, is_email_verified = $9, updated_at = $10 \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.location)
        .bind(&user.phone)
        .bind(&user.bio)
        .bind(&user.interests)
        .bind(&user.preferred_language)
        .bind(user.is_email_verified)
        .bind(user.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?
        .map(User::try_from)
        .transpose()
    }
}
