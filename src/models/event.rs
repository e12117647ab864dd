use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Hours before start after which registration closes. Platform-wide, and
/// unrelated to an event's own cancellation deadline.
pub const REGISTRATION_CUTOFF_HOURS: i64 = 24;

pub const DEFAULT_CANCELLATION_DEADLINE_HOURS: i32 = 24;

pub const EVENT_CATEGORIES: [&str; 5] = ["Akademik", "Teknologjik", "Kulturor", "Sportiv", "Social"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Upcoming => "upcoming",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(EventStatus::Draft),
            "upcoming" => Ok(EventStatus::Upcoming),
            "ongoing" => Ok(EventStatus::Ongoing),
            "completed" => Ok(EventStatus::Completed),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(format!("unknown event status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub location: String,
    pub category: String,
    pub max_attendees: i32,
    pub ticket_price: Decimal,
    pub image_url: Option<String>,
    pub status: EventStatus,
    pub tags: Vec<String>,
    pub allow_cancellation: bool,
    pub cancellation_deadline_hours: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn registration_deadline(&self) -> DateTime<Utc> {
        self.start_date - chrono::Duration::hours(REGISTRATION_CUTOFF_HOURS)
    }

    pub fn cancellation_deadline(&self) -> DateTime<Utc> {
        self.start_date - chrono::Duration::hours(i64::from(self.cancellation_deadline_hours))
    }

    pub fn is_free(&self) -> bool {
        self.ticket_price <= Decimal::ZERO
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id,
            title: self.title.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            location: self.location.clone(),
            category: self.category.clone(),
            status: self.status,
        }
    }
}

/// The slice of an event embedded next to a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Uuid,
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub location: String,
    pub category: String,
    pub status: EventStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[validate(length(min = 5, max = 100, message = "Title must be between 5 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 20, message = "Description must be at least 20 characters"))]
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(length(min = 1, message = "Event location is required"))]
    pub location: String,
    #[validate(length(min = 1, message = "Event category is required"))]
    pub category: String,
    #[validate(range(min = 1, message = "Maximum attendees must be a positive integer"))]
    pub max_attendees: i32,
    pub ticket_price: Decimal,
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub allow_cancellation: Option<bool>,
    #[validate(range(min = 0, message = "Cancellation deadline must be non-negative"))]
    pub cancellation_deadline_hours: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[validate(length(min = 5, max = 100, message = "Title must be between 5 and 100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 20, message = "Description must be at least 20 characters"))]
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub category: Option<String>,
    #[validate(range(min = 1, message = "Maximum attendees must be a positive integer"))]
    pub max_attendees: Option<i32>,
    pub ticket_price: Option<Decimal>,
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<EventStatus>,
    pub allow_cancellation: Option<bool>,
    #[validate(range(min = 0, message = "Cancellation deadline must be non-negative"))]
    pub cancellation_deadline_hours: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<EventStatus>,
    pub category: Option<String>,
    pub search: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Normalized listing filter handed to the event store.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub tags: Vec<String>,
    pub start_from: Option<DateTime<Utc>>,
    pub end_until: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(status) = self.status {
            if event.status != status {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &event.category != category {
                return false;
            }
        }
        if let Some(from) = self.start_from {
            if event.start_date < from {
                return false;
            }
        }
        if let Some(until) = self.end_until {
            if event.end_date > until {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = [&event.title, &event.description, &event.location]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if !self.tags.is_empty() && !event.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub events: Vec<Event>,
    pub total: i64,
    pub pages: i64,
}
