//! PostgreSQL-backed stores. Enum columns are stored as TEXT and parsed on
//! the way out, so a bad value surfaces as a decode error instead of a panic.

use sqlx::PgPool;
use std::str::FromStr;

use crate::utils::error::AppError;

mod event_repo;
mod message_repo;
mod registration_repo;
mod user_repo;

pub use event_repo::PostgresEventRepo;
pub use message_repo::PostgresMessageRepo;
pub use registration_repo::PostgresRegistrationRepo;
pub use user_repo::PostgresUserRepo;

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

fn parse_column<T>(column: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(|e: String| {
        AppError::DatabaseError(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: e.into(),
        })
    })
}
