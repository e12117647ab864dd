//! Persistence ports. Services only ever see these traits; the concrete
//! stores live in [`postgres`] and [`memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::event::{Event, EventFilter};
use crate::models::message::{ContactMessage, MessageStatus};
use crate::models::registration::{NewRegistration, Occupancy, Registration, RegistrationFilter};
use crate::models::user::User;
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

/// Decides, from the event and its occupancy as seen under the store's
/// guard, whether to insert and what to insert.
pub type Admission<'a> =
    &'a (dyn Fn(Option<&Event>, Occupancy) -> Result<NewRegistration, AppError> + Send + Sync);

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create(&self, event: &Event) -> Result<Event, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, AppError>;
    /// Returns one page of matches ordered by start date, and the total match count.
    async fn list(
        &self,
        filter: &EventFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Event>, i64), AppError>;
    async fn list_by_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, AppError>;
    async fn update(&self, event: &Event) -> Result<Event, AppError>;
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// Reads the event and its occupancy for `user_id`, runs `admit`, and
    /// inserts what it returns, all under one guard so that concurrent
    /// callers observe each other's inserts.
    ///
    /// Fails with [`AppError::TicketCodeCollision`] when the ticket code is
    /// already taken.
    async fn create_guarded(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        admit: Admission<'_>,
    ) -> Result<Registration, AppError>;

    async fn find_by_ticket_code(&self, ticket_code: &str)
        -> Result<Option<Registration>, AppError>;

    /// The user's registration for the event that is still in `registered`.
    async fn find_registered(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Registration>, AppError>;

    /// Whether the user holds a registration for the event that is not cancelled.
    async fn has_active(&self, event_id: Uuid, user_id: Uuid) -> Result<bool, AppError>;

    /// `registered -> cancelled`. Returns `None` when the registration was no
    /// longer `registered`.
    async fn cancel(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<Option<Registration>, AppError>;

    /// `registered -> attended`. Returns `None` when the registration was no
    /// longer `registered`.
    async fn mark_attended(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Registration>, AppError>;

    /// Newest first.
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Registration>, AppError>;

    /// Newest first, cancelled registrations excluded.
    async fn list_active_by_event(&self, event_id: Uuid) -> Result<Vec<Registration>, AppError>;

    async fn count(&self, event_id: Uuid, filter: RegistrationFilter) -> Result<i64, AppError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Stores a first-seen account. When an account with the same id already
    /// exists it is kept and returned unchanged.
    ///
    /// Fails with a validation error when the email belongs to another account.
    async fn create(&self, user: &User) -> Result<User, AppError>;

    /// Returns `None` when the account does not exist.
    async fn update(&self, user: &User) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: &ContactMessage) -> Result<ContactMessage, AppError>;
    /// Newest first.
    async fn list(&self) -> Result<Vec<ContactMessage>, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactMessage>, AppError>;
    async fn update_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<ContactMessage>, AppError>;
}
