use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::event::{Event, EventFilter};
use crate::models::message::{ContactMessage, MessageStatus};
use crate::models::registration::{
    Occupancy, Registration, RegistrationFilter, RegistrationStatus,
};
use crate::models::user::User;
use crate::repository::{
    Admission, EventRepository, MessageRepository, RegistrationRepository, UserRepository,
};
use crate::services::users::EMAIL_IN_USE;
use crate::utils::error::AppError;

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    registrations: Vec<Registration>,
    messages: Vec<ContactMessage>,
}

/// Process-local store backing every repository port. A single mutex
/// guards all collections, which makes each port call atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn newest_first(registrations: &mut [Registration]) {
    registrations.sort_by(|a, b| b.registration_date.cmp(&a.registration_date));
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn create(&self, event: &Event) -> Result<Event, AppError> {
        self.lock().events.insert(event.id, event.clone());
        Ok(event.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        Ok(self.lock().events.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &EventFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Event>, i64), AppError> {
        let state = self.lock();
        let mut matches: Vec<Event> = state
            .events
            .values()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        matches.sort_by_key(|event| event.start_date);

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_by_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, AppError> {
        let state = self.lock();
        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|event| event.organizer_id == organizer_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.start_date);
        Ok(events)
    }

    async fn update(&self, event: &Event) -> Result<Event, AppError> {
        let mut state = self.lock();
        match state.events.get_mut(&event.id) {
            Some(stored) => {
                *stored = event.clone();
                Ok(event.clone())
            }
            None => Err(AppError::NotFound("Event not found".to_string())),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.lock();
        if state.events.remove(&id).is_none() {
            return Err(AppError::NotFound("Event not found".to_string()));
        }
        state.registrations.retain(|r| r.event_id != id);
        Ok(())
    }
}

#[async_trait]
impl RegistrationRepository for MemoryStore {
    async fn create_guarded(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        admit: Admission<'_>,
    ) -> Result<Registration, AppError> {
        let mut state = self.lock();

        let occupancy = Occupancy {
            has_active_registration: state.registrations.iter().any(|r| {
                r.event_id == event_id
                    && r.user_id == user_id
                    && r.status != RegistrationStatus::Cancelled
            }),
            registered_count: state
                .registrations
                .iter()
                .filter(|r| r.event_id == event_id && r.status == RegistrationStatus::Registered)
                .count() as i64,
        };

        let new_registration = admit(state.events.get(&event_id), occupancy)?;

        if state
            .registrations
            .iter()
            .any(|r| r.ticket_code == new_registration.ticket_code)
        {
            return Err(AppError::TicketCodeCollision);
        }

        let registration = new_registration.into_registration();
        state.registrations.push(registration.clone());
        Ok(registration)
    }

    async fn find_by_ticket_code(
        &self,
        ticket_code: &str,
    ) -> Result<Option<Registration>, AppError> {
        Ok(self
            .lock()
            .registrations
            .iter()
            .find(|r| r.ticket_code == ticket_code)
            .cloned())
    }

    async fn find_registered(
        &self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Registration>, AppError> {
        Ok(self
            .lock()
            .registrations
            .iter()
            .find(|r| {
                r.event_id == event_id
                    && r.user_id == user_id
                    && r.status == RegistrationStatus::Registered
            })
            .cloned())
    }

    async fn has_active(&self, event_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        Ok(self.lock().registrations.iter().any(|r| {
            r.event_id == event_id
                && r.user_id == user_id
                && r.status != RegistrationStatus::Cancelled
        }))
    }

    async fn cancel(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<Option<Registration>, AppError> {
        let mut state = self.lock();
        let registration = state
            .registrations
            .iter_mut()
            .find(|r| r.id == id && r.status == RegistrationStatus::Registered);

        Ok(registration.map(|r| {
            r.status = RegistrationStatus::Cancelled;
            r.cancellation_date = Some(at);
            r.cancellation_reason = Some(reason.to_string());
            r.updated_at = at;
            r.clone()
        }))
    }

    async fn mark_attended(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Registration>, AppError> {
        let mut state = self.lock();
        let registration = state
            .registrations
            .iter_mut()
            .find(|r| r.id == id && r.status == RegistrationStatus::Registered);

        Ok(registration.map(|r| {
            r.status = RegistrationStatus::Attended;
            r.updated_at = at;
            r.clone()
        }))
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Registration>, AppError> {
        let mut registrations: Vec<Registration> = self
            .lock()
            .registrations
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut registrations);
        Ok(registrations)
    }

    async fn list_active_by_event(&self, event_id: Uuid) -> Result<Vec<Registration>, AppError> {
        let mut registrations: Vec<Registration> = self
            .lock()
            .registrations
            .iter()
            .filter(|r| r.event_id == event_id && r.status != RegistrationStatus::Cancelled)
            .cloned()
            .collect();
        newest_first(&mut registrations);
        Ok(registrations)
    }

    async fn count(&self, event_id: Uuid, filter: RegistrationFilter) -> Result<i64, AppError> {
        Ok(self
            .lock()
            .registrations
            .iter()
            .filter(|r| r.event_id == event_id && filter.matches(r))
            .count() as i64)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create(&self, user: &User) -> Result<User, AppError> {
        let mut state = self.lock();
        if let Some(existing) = state.users.get(&user.id) {
            return Ok(existing.clone());
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::ValidationError(EMAIL_IN_USE.to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn update(&self, user: &User) -> Result<Option<User>, AppError> {
        let mut state = self.lock();
        if !state.users.contains_key(&user.id) {
            return Ok(None);
        }
        if state
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(AppError::ValidationError(EMAIL_IN_USE.to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, message: &ContactMessage) -> Result<ContactMessage, AppError> {
        self.lock().messages.push(message.clone());
        Ok(message.clone())
    }

    async fn list(&self) -> Result<Vec<ContactMessage>, AppError> {
        let mut messages = self.lock().messages.clone();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactMessage>, AppError> {
        Ok(self.lock().messages.iter().find(|m| m.id == id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<ContactMessage>, AppError> {
        let mut state = self.lock();
        Ok(state.messages.iter_mut().find(|m| m.id == id).map(|m| {
            m.status = status;
            m.updated_at = at;
            m.clone()
        }))
    }
}
