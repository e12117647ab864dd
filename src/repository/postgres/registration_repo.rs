use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::event_repo::{select_event_sql, EventRow};
use super::parse_column;
use crate::models::event::Event;
use crate::models::registration::{
    Occupancy, PaymentStatus, Registration, RegistrationFilter, RegistrationStatus,
};
use crate::repository::{Admission, RegistrationRepository};
use crate::services::eligibility::ALREADY_REGISTERED;
use crate::utils::error::AppError;

const TICKET_CODE_INDEX: &str = "registrations_ticket_code_key";
const ACTIVE_REGISTRATION_INDEX: &str = "registrations_active_event_user_key";

const REGISTRATION_COLUMNS: &str = "id, event_id, user_id, registration_date, status, \
    ticket_code, qr_code, payment_status, payment_amount, cancellation_date, \
    cancellation_reason, created_at, updated_at";

#[derive(FromRow)]
struct RegistrationRow {
    id: Uuid,
    event_id: Uuid,
    user_id: Uuid,
    registration_date: DateTime<Utc>,
    status: String,
    ticket_code: String,
    qr_code: String,
    payment_status: String,
    payment_amount: Decimal,
    cancellation_date: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = AppError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        Ok(Registration {
            id: row.id,
            event_id: row.event_id,
            user_id: row.user_id,
            registration_date: row.registration_date,
            status: parse_column::<RegistrationStatus>("status", &row.status)?,
            ticket_code: row.ticket_code,
            qr_code: row.qr_code,
            payment_status: parse_column::<PaymentStatus>("payment_status", &row.payment_status)?,
            payment_amount: row.payment_amount,
            cancellation_date: row.cancellation_date,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn select_sql(suffix: &str) -> String {
    format!("SELECT {} FROM registrations {}", REGISTRATION_COLUMNS, suffix)
}

fn collect(rows: Vec<RegistrationRow>) -> Result<Vec<Registration>, AppError> {
    rows.into_iter().map(Registration::try_from).collect()
}

/// The error a unique violation on `index` stands for when inserting a
/// registration.
fn insert_conflict(index: &str) -> Option<AppError> {
    match index {
        TICKET_CODE_INDEX => Some(AppError::TicketCodeCollision),
        ACTIVE_REGISTRATION_INDEX => Some(AppError::DuplicateRegistration(
            ALREADY_REGISTERED.to_string(),
        )),
        _ => None,
    }
}

fn map_insert_error(err: sqlx::Error) -> AppError {
    let conflict = AppError::violated_unique_index(&err).and_then(insert_conflict);
    match conflict {
        Some(conflict) => conflict,
        None => AppError::DatabaseError(err),
    }
}

pub struct PostgresRegistrationRepo {
    pool: PgPool,
}

impl PostgresRegistrationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationRepository for PostgresRegistrationRepo {
    async fn create_guarded(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        admit: Admission<'_>,
    ) -> Result<Registration, AppError> {
        let mut tx = self.pool.begin().await?;

        // The row lock serializes registrations per event until commit.
        let event = sqlx::query_as::<_, EventRow>(&select_event_sql("WHERE id = $1 FOR UPDATE"))
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(Event::try_from)
            .transpose()?;

        let has_active_registration: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM registrations \
             WHERE event_id = $1 AND user_id = $2 AND status <> 'cancelled')",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let registered_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status = 'registered'",
        )
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;

        let occupancy = Occupancy {
            has_active_registration,
            registered_count,
        };
        debug!(%event_id, %user_id, ?occupancy, "Admission check under event lock");

        let registration = admit(event.as_ref(), occupancy)?.into_registration();

        let row = sqlx::query_as::<_, RegistrationRow>(&format!(
            "INSERT INTO registrations ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING {}",
            REGISTRATION_COLUMNS, REGISTRATION_COLUMNS
        ))
        .bind(registration.id)
        .bind(registration.event_id)
        .bind(registration.user_id)
        .bind(registration.registration_date)
        .bind(registration.status.as_str())
        .bind(&registration.ticket_code)
        .bind(&registration.qr_code)
        .bind(registration.payment_status.as_str())
        .bind(registration.payment_amount)
        .bind(registration.cancellation_date)
        .bind(&registration.cancellation_reason)
        .bind(registration.created_at)
        .bind(registration.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        tx.commit().await?;
        Registration::try_from(row)
    }

    async fn find_by_ticket_code(
        &self,
        ticket_code: &str,
    ) -> Result<Option<Registration>, AppError> {
        sqlx::query_as::<_, RegistrationRow>(&select_sql("WHERE ticket_code = $1"))
            .bind(ticket_code)
            .fetch_optional(&self.pool)
            .await?
            .map(Registration::try_from)
            .transpose()
    }

    async fn find_registered(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Registration>, AppError> {
        sqlx::query_as::<_, RegistrationRow>(&select_sql(
            "WHERE event_id = $1 AND user_id = $2 AND status = 'registered'",
        ))
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Registration::try_from)
        .transpose()
    }

    async fn has_active(&self, event_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM registrations \
             WHERE event_id = $1 AND user_id = $2 AND status <> 'cancelled')",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn cancel(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<Option<Registration>, AppError> {
        sqlx::query_as::<_, RegistrationRow>(&format!(
            "UPDATE registrations SET status = 'cancelled', cancellation_date = $2, \
             cancellation_reason = $3, updated_at = $2 \
             WHERE id = $1 AND status = 'registered' RETURNING {}",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?
        .map(Registration::try_from)
        .transpose()
    }

    async fn mark_attended(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Registration>, AppError> {
        sqlx::query_as::<_, RegistrationRow>(&format!(
            "UPDATE registrations SET status = 'attended', updated_at = $2 \
             WHERE id = $1 AND status = 'registered' RETURNING {}",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .map(Registration::try_from)
        .transpose()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Registration>, AppError> {
        let rows = sqlx::query_as::<_, RegistrationRow>(&select_sql(
            "WHERE user_id = $1 ORDER BY registration_date DESC",
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn list_active_by_event(&self, event_id: Uuid) -> Result<Vec<Registration>, AppError> {
        let rows = sqlx::query_as::<_, RegistrationRow>(&select_sql(
            "WHERE event_id = $1 AND status <> 'cancelled' ORDER BY registration_date DESC",
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn count(&self, event_id: Uuid, filter: RegistrationFilter) -> Result<i64, AppError> {
        let query = match filter {
            RegistrationFilter::NotCancelled => sqlx::query_scalar(
                "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status <> 'cancelled'",
            )
            .bind(event_id),
            RegistrationFilter::Status(status) => sqlx::query_scalar(
                "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status = $2",
            )
            .bind(event_id)
            .bind(status.as_str()),
            RegistrationFilter::Payment(payment) => sqlx::query_scalar(
                "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND payment_status = $2",
            )
            .bind(event_id)
            .bind(payment.as_str()),
        };
        let count: i64 = query.fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_code_conflict_asks_for_a_new_code() {
        assert!(matches!(
            insert_conflict("registrations_ticket_code_key"),
            Some(AppError::TicketCodeCollision)
        ));
    }

    #[test]
    fn live_registration_conflict_is_a_duplicate() {
        match insert_conflict("registrations_active_event_user_key") {
            Some(AppError::DuplicateRegistration(msg)) => assert_eq!(msg, ALREADY_REGISTERED),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn other_indexes_stay_database_errors() {
        assert!(insert_conflict("registrations_pkey").is_none());
        assert!(matches!(
            map_insert_error(sqlx::Error::RowNotFound),
            AppError::DatabaseError(_)
        ));
    }

    #[test]
    fn index_names_match_the_schema() {
        let schema = include_str!("../../../migrations/20250101000000_init.sql");
        assert!(schema.contains(&format!("UNIQUE INDEX IF NOT EXISTS {}", TICKET_CODE_INDEX)));
        assert!(schema.contains(&format!(
            "UNIQUE INDEX IF NOT EXISTS {}",
            ACTIVE_REGISTRATION_INDEX
        )));
    }
}
