use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::parse_column;
use crate::models::event::{Event, EventFilter};
use crate::repository::EventRepository;
use crate::utils::error::AppError;

const EVENT_COLUMNS: &str = "id, organizer_id, title, description, start_date, end_date, \
    location, category, max_attendees, ticket_price, image_url, status, tags, \
    allow_cancellation, cancellation_deadline_hours, created_at, updated_at";

#[derive(FromRow)]
pub(super) struct EventRow {
    id: Uuid,
    organizer_id: Uuid,
    title: String,
    description: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    location: String,
    category: String,
    max_attendees: i32,
    ticket_price: Decimal,
    image_url: Option<String>,
    status: String,
    tags: Vec<String>,
    allow_cancellation: bool,
    cancellation_deadline_hours: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            organizer_id: row.organizer_id,
            title: row.title,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            location: row.location,
            category: row.category,
            max_attendees: row.max_attendees,
            ticket_price: row.ticket_price,
            image_url: row.image_url,
            status: parse_column("status", &row.status)?,
            tags: row.tags,
            allow_cancellation: row.allow_cancellation,
            cancellation_deadline_hours: row.cancellation_deadline_hours,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(super) fn select_event_sql(suffix: &str) -> String {
    format!("SELECT {} FROM events {}", EVENT_COLUMNS, suffix)
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
    builder.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(category) = &filter.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(from) = filter.start_from {
        builder.push(" AND start_date >= ").push_bind(from);
    }
    if let Some(until) = filter.end_until {
        builder.push(" AND end_date <= ").push_bind(until);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR location ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if !filter.tags.is_empty() {
        builder.push(" AND tags && ").push_bind(filter.tags.clone());
    }
}

pub struct PostgresEventRepo {
    pool: PgPool,
}

impl PostgresEventRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepo {
    async fn create(&self, event: &Event) -> Result<Event, AppError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "INSERT INTO events ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) RETURNING {}",
            EVENT_COLUMNS, EVENT_COLUMNS
        ))
        .bind(event.id)
        .bind(event.organizer_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(&event.location)
        .bind(&event.category)
        .bind(event.max_attendees)
        .bind(event.ticket_price)
        .bind(&event.image_url)
        .bind(event.status.as_str())
        .bind(&event.tags)
        .bind(event.allow_cancellation)
        .bind(event.cancellation_deadline_hours)
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Event::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        sqlx::query_as::<_, EventRow>(&select_event_sql("WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Event::try_from)
            .transpose()
    }

    async fn list(
        &self,
        filter: &EventFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Event>, i64), AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM events");
        push_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut page_query = QueryBuilder::<Postgres>::new(select_event_sql(""));
        push_filter(&mut page_query, filter);
        page_query
            .push(" ORDER BY start_date ASC OFFSET ")
            .push_bind(offset)
            .push(" LIMIT ")
            .push_bind(limit);

        let events = page_query
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Event::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((events, total))
    }

    async fn list_by_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, AppError> {
        sqlx::query_as::<_, EventRow>(&select_event_sql(
            "WHERE organizer_id = $1 ORDER BY start_date ASC",
        ))
        .bind(organizer_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Event::try_from)
        .collect()
    }

    async fn update(&self, event: &Event) -> Result<Event, AppError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "UPDATE events SET title = $2, description = $3, start_date = $4, end_date = $5, \
             location = $6, category = $7, max_attendees = $8, ticket_price = $9, image_url = $10, \
             status = $11, tags = $12, allow_cancellation = $13, cancellation_deadline_hours = $14, \
             updated_at = $15 WHERE id = $1 RETURNING {}",
            EVENT_COLUMNS
        ))
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(&event.location)
        .bind(&event.category)
        .bind(event.max_attendees)
        .bind(event.ticket_price)
        .bind(&event.image_url)
        .bind(event.status.as_str())
        .bind(&event.tags)
        .bind(event.allow_cancellation)
        .bind(event.cancellation_deadline_hours)
        .bind(event.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
        Event::try_from(row)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Event not found".to_string()));
        }
        Ok(())
    }
}
