use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::clock::Clock;
use crate::models::event::{
    CreateEventRequest, Event, EventFilter, EventListQuery, EventPage, EventStatus,
    UpdateEventRequest, DEFAULT_CANCELLATION_DEADLINE_HOURS, EVENT_CATEGORIES,
};
use crate::repository::EventRepository;
use crate::services::eligibility::EVENT_NOT_FOUND;
use crate::utils::error::AppError;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;

pub struct EventService {
    events: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn require_text(value: &str, message: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::ValidationError(message.to_string()));
    }
    Ok(())
}

fn check_price(price: Decimal) -> Result<(), AppError> {
    if price < Decimal::ZERO {
        return Err(AppError::ValidationError(
            "Ticket price must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn check_dates(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppError> {
    if end < start {
        return Err(AppError::ValidationError(
            "End date must be after start date".to_string(),
        ));
    }
    Ok(())
}

impl EventService {
    pub fn new(events: Arc<dyn EventRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { events, clock }
    }

    pub async fn create(&self, organizer_id: Uuid, payload: CreateEventRequest) -> Result<Event, AppError> {
        payload.validate()?;
        require_text(&payload.location, "Event location is required")?;
        require_text(&payload.category, "Event category is required")?;
        check_price(payload.ticket_price)?;

        let now = self.clock.now();
        if payload.start_date < now {
            return Err(AppError::ValidationError(
                "Start date cannot be in the past".to_string(),
            ));
        }
        check_dates(payload.start_date, payload.end_date)?;

        let event = Event {
            id: Uuid::new_v4(),
            organizer_id,
            title: payload.title.trim().to_string(),
            description: payload.description.trim().to_string(),
            start_date: payload.start_date,
            end_date: payload.end_date,
            location: payload.location.trim().to_string(),
            category: payload.category.trim().to_string(),
            max_attendees: payload.max_attendees,
            ticket_price: payload.ticket_price,
            image_url: payload.image_url,
            status: EventStatus::Upcoming,
            tags: clean_tags(payload.tags),
            allow_cancellation: payload.allow_cancellation.unwrap_or(true),
            cancellation_deadline_hours: payload
                .cancellation_deadline_hours
                .unwrap_or(DEFAULT_CANCELLATION_DEADLINE_HOURS),
            created_at: now,
            updated_at: now,
        };

        let event = self.events.create(&event).await?;
        info!(event_id = %event.id, %organizer_id, "Event created");
        Ok(event)
    }

    pub async fn list(&self, query: EventListQuery) -> Result<EventPage, AppError> {
        let page = query.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
        let limit = query
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);

        let filter = EventFilter {
            status: query.status,
            category: query.category.filter(|c| !c.trim().is_empty()),
            search: query.search.filter(|s| !s.trim().is_empty()),
            tags: query
                .tags
                .map(|raw| clean_tags(raw.split(',').map(str::to_string).collect()))
                .unwrap_or_default(),
            start_from: query.start_date,
            end_until: query.end_date,
        };

        let offset = i64::from(page - 1) * i64::from(limit);
        let (events, total) = self.events.list(&filter, offset, i64::from(limit)).await?;
        let limit = i64::from(limit);

        Ok(EventPage {
            events,
            total,
            pages: (total + limit - 1) / limit,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Event, AppError> {
        self.events
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(EVENT_NOT_FOUND.to_string()))
    }

    pub async fn update(
        &self,
        id: Uuid,
        organizer_id: Uuid,
        patch: UpdateEventRequest,
    ) -> Result<Event, AppError> {
        patch.validate()?;

        let mut event = self.get(id).await?;
        if event.organizer_id != organizer_id {
            return Err(AppError::Forbidden(
                "You are not authorized to update this event".to_string(),
            ));
        }

        if let Some(title) = patch.title {
            event.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            event.description = description.trim().to_string();
        }
        if let Some(location) = patch.location {
            require_text(&location, "Event location is required")?;
            event.location = location.trim().to_string();
        }
        if let Some(category) = patch.category {
            require_text(&category, "Event category is required")?;
            event.category = category.trim().to_string();
        }
        if let Some(max_attendees) = patch.max_attendees {
            event.max_attendees = max_attendees;
        }
        if let Some(price) = patch.ticket_price {
            check_price(price)?;
            event.ticket_price = price;
        }
        if let Some(image_url) = patch.image_url {
            event.image_url = Some(image_url);
        }
        if let Some(tags) = patch.tags {
            event.tags = clean_tags(tags);
        }
        if let Some(status) = patch.status {
            if status == EventStatus::Draft {
                return Err(AppError::ValidationError(
                    "Status must be one of upcoming, ongoing, completed, cancelled".to_string(),
                ));
            }
            event.status = status;
        }
        if let Some(allow) = patch.allow_cancellation {
            event.allow_cancellation = allow;
        }
        if let Some(hours) = patch.cancellation_deadline_hours {
            event.cancellation_deadline_hours = hours;
        }

        event.start_date = patch.start_date.unwrap_or(event.start_date);
        event.end_date = patch.end_date.unwrap_or(event.end_date);
        check_dates(event.start_date, event.end_date)?;

        event.updated_at = self.clock.now();
        let event = self.events.update(&event).await?;
        info!(event_id = %event.id, status = %event.status, "Event updated");
        Ok(event)
    }

    pub async fn delete(&self, id: Uuid, organizer_id: Uuid) -> Result<(), AppError> {
        let event = self.get(id).await?;
        if event.organizer_id != organizer_id {
            return Err(AppError::Forbidden(
                "You are not authorized to delete this event".to_string(),
            ));
        }
        self.events.delete(id).await?;
        info!(event_id = %id, "Event deleted");
        Ok(())
    }

    pub async fn organizer_events(&self, organizer_id: Uuid) -> Result<Vec<Event>, AppError> {
        self.events.list_by_organizer(organizer_id).await
    }

    pub fn categories(&self) -> &'static [&'static str] {
        &EVENT_CATEGORIES
    }
}
