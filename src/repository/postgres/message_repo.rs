use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::parse_column;
use crate::models::message::{ContactMessage, Department, MessageStatus};
use crate::repository::MessageRepository;
use crate::utils::error::AppError;

const MESSAGE_COLUMNS: &str =
    "id, name, email, subject, message, department, status, created_at, updated_at";

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    name: String,
    email: String,
    subject: String,
    message: String,
    department: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for ContactMessage {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(ContactMessage {
            id: row.id,
            name: row.name,
            email: row.email,
            subject: row.subject,
            message: row.message,
            department: parse_column::<Department>("department", &row.department)?,
            status: parse_column::<MessageStatus>("status", &row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct PostgresMessageRepo {
    pool: PgPool,
}

impl PostgresMessageRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepo {
    async fn create(&self, message: &ContactMessage) -> Result<ContactMessage, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            MESSAGE_COLUMNS, MESSAGE_COLUMNS
        ))
        .bind(message.id)
        .bind(&message.name)
        .bind(&message.email)
        .bind(&message.subject)
        .bind(&message.message)
        .bind(message.department.as_str())
        .bind(message.status.as_str())
        .bind(message.created_at)
        .bind(message.updated_at)
        .fetch_one(&self.pool)
        .await?;
        ContactMessage::try_from(row)
    }

    async fn list(&self) -> Result<Vec<ContactMessage>, AppError> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM messages ORDER BY created_at DESC",
            MESSAGE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ContactMessage::try_from)
        .collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactMessage>, AppError> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM messages WHERE id = $1",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(ContactMessage::try_from)
        .transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<ContactMessage>, AppError> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE messages SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .map(ContactMessage::try_from)
        .transpose()
    }
}
