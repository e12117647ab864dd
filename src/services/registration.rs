//! Registration lifecycle: admission, ticket issuance, cancellation,
//! check-in at the door and the per-event counts.
//!
//! A registration moves `registered -> cancelled` or `registered -> attended`
//! and never leaves either terminal state. Every transition is a
//! compare-and-set in the store, so two concurrent requests can never both
//! win the same transition.

use std::collections::HashMap;
use std::sync::Arc;

use tera::Tera;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::event::{Event, EventSummary};
use crate::models::registration::{
    Attendee, NewRegistration, Occupancy, PaymentStatus, Registration, RegistrationFilter,
    RegistrationStats, RegistrationStatus, TicketVerification, UserRegistration,
    DEFAULT_CANCELLATION_REASON,
};
use crate::notify::{templates, Notifier};
use crate::repository::{EventRepository, RegistrationRepository, UserRepository};
use crate::services::eligibility::{check_eligibility, EVENT_NOT_FOUND};
use crate::services::qr::{encode_ticket_qr, QrPayload};
use crate::services::ticket::{generate_ticket_code, is_well_formed};
use crate::utils::error::AppError;

/// Fresh ticket codes drawn before giving up on a registration.
const MAX_TICKET_ATTEMPTS: u32 = 3;

pub const INVALID_TICKET: &str = "Invalid ticket code";
pub const TICKET_CANCELLED: &str = "This ticket has been cancelled";
pub const TICKET_ALREADY_USED: &str = "This ticket has already been used";
pub const TICKET_VERIFIED: &str = "Ticket verified successfully";

pub struct RegistrationService {
    events: Arc<dyn EventRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    users: Arc<dyn UserRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    templates: Arc<Tera>,
    frontend_url: String,
}

impl RegistrationService {
    pub fn new(
        events: Arc<dyn EventRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        users: Arc<dyn UserRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        templates: Arc<Tera>,
        frontend_url: String,
    ) -> Self {
        Self {
            events,
            registrations,
            users,
            notifier,
            clock,
            templates,
            frontend_url,
        }
    }

    /// Admits `user_id` to `event_id` and issues a ticket.
    ///
    /// The ticket email is sent after the registration is stored; a failed
    /// send is logged and does not affect the result.
    pub async fn register(&self, event_id: Uuid, user_id: Uuid) -> Result<Registration, AppError> {
        let now = self.clock.now();

        let admit = |event: Option<&Event>,
                     occupancy: Occupancy|
         -> Result<NewRegistration, AppError> {
            let event = check_eligibility(event, occupancy, now)?;

            let ticket_code = generate_ticket_code();
            let qr_code = encode_ticket_qr(&QrPayload::new(&ticket_code, event.id, now))?;

            let payment_status = if event.is_free() {
                PaymentStatus::Completed
            } else {
                PaymentStatus::Pending
            };

            Ok(NewRegistration {
                event_id: event.id,
                user_id,
                ticket_code,
                qr_code,
                payment_status,
                payment_amount: event.ticket_price,
                registered_at: now,
            })
        };

        let mut attempt = 0;
        let registration = loop {
            attempt += 1;
            match self
                .registrations
                .create_guarded(event_id, user_id, &admit)
                .await
            {
                Ok(registration) => break registration,
                Err(AppError::TicketCodeCollision) if attempt < MAX_TICKET_ATTEMPTS => {
                    warn!(%event_id, attempt, "Ticket code already taken, drawing a new one");
                }
                Err(AppError::TicketCodeCollision) => {
                    return Err(AppError::TicketIssuanceFailed(format!(
                        "no unique ticket code after {} attempts",
                        attempt
                    )));
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            registration_id = %registration.id,
            %event_id,
            %user_id,
            payment_status = %registration.payment_status,
            "Registration created"
        );

        self.send_ticket(&registration).await;

        Ok(registration)
    }

    async fn send_ticket(&self, registration: &Registration) {
        if let Err(e) = self.try_send_ticket(registration).await {
            warn!(
                registration_id = %registration.id,
                error = %e,
                "Failed to send ticket email, registration kept"
            );
        }
    }

    async fn try_send_ticket(&self, registration: &Registration) -> Result<(), AppError> {
        let event = self
            .events
            .find_by_id(registration.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(EVENT_NOT_FOUND.to_string()))?;
        let user = self
            .users
            .find_by_id(registration.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let email = templates::ticket_email(
            &self.templates,
            registration,
            &event,
            &user,
            &self.frontend_url,
        )?;
        self.notifier.send(&user.email, &email.subject, &email.html).await
    }

    /// Cancels the caller's live registration for the event, provided the
    /// event allows cancellation and its deadline has not passed.
    pub async fn cancel(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        reason: Option<String>,
    ) -> Result<Registration, AppError> {
        let registration = match self.registrations.find_registered(event_id, user_id).await? {
            Some(registration) => registration,
            None => {
                // A cancelled or attended row means there is nothing left to cancel.
                let held_before = self
                    .registrations
                    .list_by_user(user_id)
                    .await?
                    .iter()
                    .any(|r| r.event_id == event_id);
                return Err(if held_before {
                    AppError::InvalidState("Registration is no longer active".to_string())
                } else {
                    AppError::NotFound("Registration not found".to_string())
                });
            }
        };

        let event = self
            .events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(EVENT_NOT_FOUND.to_string()))?;

        if !event.allow_cancellation {
            return Err(AppError::InvalidState(
                "Cancellation is not allowed for this event".to_string(),
            ));
        }

        let now = self.clock.now();
        if now >= event.cancellation_deadline() {
            return Err(AppError::DeadlinePassed(format!(
                "Cannot cancel registration less than {} hours before the event",
                event.cancellation_deadline_hours
            )));
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_CANCELLATION_REASON.to_string());

        let cancelled = self
            .registrations
            .cancel(registration.id, now, &reason)
            .await?
            .ok_or_else(|| AppError::InvalidState("Registration is no longer active".to_string()))?;

        info!(registration_id = %cancelled.id, %event_id, %user_id, "Registration cancelled");
        Ok(cancelled)
    }

    /// Resolves a scanned ticket code and checks the holder in.
    ///
    /// Only the first successful scan of a ticket reports it valid.
    pub async fn verify_ticket(&self, ticket_code: &str) -> Result<TicketVerification, AppError> {
        let ticket_code = ticket_code.trim();
        if !is_well_formed(ticket_code) {
            return Ok(TicketVerification::rejected(INVALID_TICKET));
        }

        let registration = match self.registrations.find_by_ticket_code(ticket_code).await? {
            Some(registration) => registration,
            None => return Ok(TicketVerification::rejected(INVALID_TICKET)),
        };

        if let Some(rejection) = rejection_for(registration.status) {
            return Ok(rejection);
        }

        match self
            .registrations
            .mark_attended(registration.id, self.clock.now())
            .await?
        {
            Some(attended) => {
                info!(registration_id = %attended.id, event_id = %attended.event_id, "Ticket verified");
                Ok(TicketVerification {
                    valid: true,
                    message: TICKET_VERIFIED.to_string(),
                    registration: Some(attended),
                })
            }
            None => {
                // Lost the race: another scan or a cancellation got there
                // first, or the registration went away with its event.
                let current = self.registrations.find_by_ticket_code(ticket_code).await?;
                Ok(match current {
                    Some(current) => rejection_for(current.status)
                        .unwrap_or_else(|| TicketVerification::rejected(TICKET_ALREADY_USED)),
                    None => TicketVerification::rejected(INVALID_TICKET),
                })
            }
        }
    }

    /// Counts for the organizer's dashboard.
    pub async fn stats(&self, event_id: Uuid, requester: Uuid) -> Result<RegistrationStats, AppError> {
        self.owned_event(
            event_id,
            requester,
            "You are not authorized to view statistics for this event",
        )
        .await?;

        let (total_registrations, attended_count, cancelled_count, pending_payments) = tokio::try_join!(
            self.registrations
                .count(event_id, RegistrationFilter::NotCancelled),
            self.registrations.count(
                event_id,
                RegistrationFilter::Status(RegistrationStatus::Attended)
            ),
            self.registrations.count(
                event_id,
                RegistrationFilter::Status(RegistrationStatus::Cancelled)
            ),
            self.registrations
                .count(event_id, RegistrationFilter::Payment(PaymentStatus::Pending)),
        )?;

        Ok(RegistrationStats {
            total_registrations,
            attended_count,
            cancelled_count,
            pending_payments,
        })
    }

    pub async fn user_registrations(&self, user_id: Uuid) -> Result<Vec<UserRegistration>, AppError> {
        let registrations = self.registrations.list_by_user(user_id).await?;

        let mut events: HashMap<Uuid, Option<EventSummary>> = HashMap::new();
        let mut listed = Vec::with_capacity(registrations.len());
        for registration in registrations {
            if !events.contains_key(&registration.event_id) {
                let summary = self
                    .events
                    .find_by_id(registration.event_id)
                    .await?
                    .map(|e| e.summary());
                events.insert(registration.event_id, summary);
            }
            let event = events.get(&registration.event_id).cloned().flatten();
            listed.push(UserRegistration {
                registration,
                event,
            });
        }
        Ok(listed)
    }

    /// Attendee list for the organizer, cancelled registrations excluded.
    pub async fn event_registrations(
        &self,
        event_id: Uuid,
        organizer_id: Uuid,
    ) -> Result<Vec<Attendee>, AppError> {
        self.owned_event(
            event_id,
            organizer_id,
            "You are not authorized to view registrations for this event",
        )
        .await?;

        let registrations = self.registrations.list_active_by_event(event_id).await?;
        let mut attendees = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let user = self
                .users
                .find_by_id(registration.user_id)
                .await?
                .map(|u| u.summary());
            attendees.push(Attendee { registration, user });
        }
        Ok(attendees)
    }

    pub async fn is_registered(&self, event_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        self.registrations.has_active(event_id, user_id).await
    }

    async fn owned_event(
        &self,
        event_id: Uuid,
        requester: Uuid,
        denial: &str,
    ) -> Result<Event, AppError> {
        let event = self
            .events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(EVENT_NOT_FOUND.to_string()))?;
        if event.organizer_id != requester {
            return Err(AppError::Forbidden(denial.to_string()));
        }
        Ok(event)
    }
}

fn rejection_for(status: RegistrationStatus) -> Option<TicketVerification> {
    match status {
        RegistrationStatus::Registered => None,
        RegistrationStatus::Cancelled => Some(TicketVerification::rejected(TICKET_CANCELLED)),
        RegistrationStatus::Attended => Some(TicketVerification::rejected(TICKET_ALREADY_USED)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::event::EventStatus;
    use crate::models::user::{Role, User};
    use crate::repository::memory::MemoryStore;
    use crate::repository::Admission;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::ExternalServiceError("smtp unavailable".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
        service: Arc<RegistrationService>,
    }

    fn start_of_test() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn harness_over(
        store: Arc<MemoryStore>,
        registrations: Arc<dyn RegistrationRepository>,
        notifier: RecordingNotifier,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new(start_of_test()));
        let notifier = Arc::new(notifier);
        let service = Arc::new(RegistrationService::new(
            store.clone(),
            registrations,
            store.clone(),
            notifier.clone(),
            clock.clone(),
            Arc::new(templates::load().unwrap()),
            "http://localhost:5173".to_string(),
        ));
        Harness {
            store,
            clock,
            notifier,
            service,
        }
    }

    fn harness_with(notifier: RecordingNotifier) -> Harness {
        let store = Arc::new(MemoryStore::new());
        harness_over(store.clone(), store, notifier)
    }

    fn harness() -> Harness {
        harness_with(RecordingNotifier::default())
    }

    impl Harness {
        async fn user(&self) -> Uuid {
            let id = Uuid::new_v4();
            let user = User::new(
                id,
                "Siti".into(),
                format!("{}@umib.net", id.simple()),
                Role::User,
                true,
                start_of_test(),
            );
            UserRepository::create(self.store.as_ref(), &user)
                .await
                .unwrap();
            id
        }

        async fn event(&self, max_attendees: i32, ticket_price: i64) -> Event {
            let start = start_of_test() + Duration::days(7);
            let event = Event {
                id: Uuid::new_v4(),
                organizer_id: self.user().await,
                title: "Robotics Workshop".into(),
                description: "Build a line follower in an afternoon".into(),
                start_date: start,
                end_date: start + Duration::hours(3),
                location: "Lab 2".into(),
                category: "Teknologi".into(),
                max_attendees,
                ticket_price: Decimal::from(ticket_price),
                image_url: None,
                status: EventStatus::Upcoming,
                tags: vec!["robotics".into()],
                allow_cancellation: true,
                cancellation_deadline_hours: 24,
                created_at: start_of_test(),
                updated_at: start_of_test(),
            };
            EventRepository::create(self.store.as_ref(), &event)
                .await
                .unwrap()
        }

        async fn save(&self, event: &Event) {
            EventRepository::update(self.store.as_ref(), event)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn register_issues_ticket_and_sends_email() {
        let h = harness();
        let event = h.event(10, 0).await;
        let user = h.user().await;

        let registration = h.service.register(event.id, user).await.unwrap();

        assert_eq!(registration.status, RegistrationStatus::Registered);
        assert_eq!(registration.payment_status, PaymentStatus::Completed);
        assert_eq!(registration.payment_amount, Decimal::ZERO);
        assert!(is_well_formed(&registration.ticket_code));
        assert!(registration.qr_code.starts_with("data:image/png;base64,"));
        assert_eq!(registration.registration_date, start_of_test());

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Robotics Workshop"));
    }

    #[tokio::test]
    async fn paid_event_leaves_payment_pending() {
        let h = harness();
        let event = h.event(10, 10).await;

        let registration = h.service.register(event.id, h.user().await).await.unwrap();

        assert_eq!(registration.payment_status, PaymentStatus::Pending);
        assert_eq!(registration.payment_amount, Decimal::from(10));
    }

    #[tokio::test]
    async fn sixth_registration_exceeds_capacity_of_five() {
        let h = harness();
        let event = h.event(5, 10).await;

        for _ in 0..5 {
            h.service.register(event.id, h.user().await).await.unwrap();
        }
        let err = h.service.register(event.id, h.user().await).await.unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded(_)));
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let h = harness();
        let err = h
            .service
            .register(Uuid::new_v4(), h.user().await)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn second_registration_by_same_user_is_rejected() {
        let h = harness();
        let event = h.event(10, 0).await;
        let user = h.user().await;

        h.service.register(event.id, user).await.unwrap();
        let err = h.service.register(event.id, user).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateRegistration(_)));
    }

    #[tokio::test]
    async fn registration_closes_a_day_before_start() {
        let h = harness();
        let event = h.event(10, 0).await;

        h.clock.set(event.start_date - Duration::hours(23));
        let err = h.service.register(event.id, h.user().await).await.unwrap_err();
        assert!(matches!(err, AppError::DeadlinePassed(_)));
    }

    #[tokio::test]
    async fn re_registering_after_cancel_issues_new_ticket() {
        let h = harness();
        let event = h.event(10, 0).await;
        let user = h.user().await;

        let first = h.service.register(event.id, user).await.unwrap();
        let cancelled = h.service.cancel(event.id, user, None).await.unwrap();
        assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
        assert_eq!(
            cancelled.cancellation_reason.as_deref(),
            Some(DEFAULT_CANCELLATION_REASON)
        );
        assert_eq!(cancelled.cancellation_date, Some(start_of_test()));

        let second = h.service.register(event.id, user).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.ticket_code, second.ticket_code);
        assert!(h.service.is_registered(event.id, user).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_keeps_the_given_reason() {
        let h = harness();
        let event = h.event(10, 0).await;
        let user = h.user().await;
        h.service.register(event.id, user).await.unwrap();

        let cancelled = h
            .service
            .cancel(event.id, user, Some("  Exam clash ".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Exam clash"));
    }

    #[tokio::test]
    async fn cancel_after_deadline_is_rejected() {
        let h = harness();
        let event = h.event(10, 0).await;
        let user = h.user().await;
        h.service.register(event.id, user).await.unwrap();

        h.clock.set(event.start_date - Duration::hours(24));
        let err = h.service.cancel(event.id, user, None).await.unwrap_err();
        assert!(matches!(err, AppError::DeadlinePassed(_)));

        h.clock.set(event.start_date - Duration::hours(25));
        assert!(h.service.cancel(event.id, user, None).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_honours_event_policy() {
        let h = harness();
        let mut event = h.event(10, 0).await;
        let user = h.user().await;
        h.service.register(event.id, user).await.unwrap();

        event.allow_cancellation = false;
        h.save(&event).await;

        let err = h.service.cancel(event.id, user, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn cancelling_twice_is_invalid_state() {
        let h = harness();
        let event = h.event(10, 0).await;
        let user = h.user().await;
        h.service.register(event.id, user).await.unwrap();
        h.service.cancel(event.id, user, None).await.unwrap();

        let err = h.service.cancel(event.id, user, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let err = h
            .service
            .cancel(event.id, h.user().await, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn ticket_verifies_exactly_once() {
        let h = harness();
        let event = h.event(10, 0).await;
        let registration = h.service.register(event.id, h.user().await).await.unwrap();

        let first = h.service.verify_ticket(&registration.ticket_code).await.unwrap();
        assert!(first.valid);
        assert_eq!(first.message, TICKET_VERIFIED);
        assert_eq!(
            first.registration.map(|r| r.status),
            Some(RegistrationStatus::Attended)
        );

        let second = h.service.verify_ticket(&registration.ticket_code).await.unwrap();
        assert!(!second.valid);
        assert_eq!(second.message, TICKET_ALREADY_USED);
    }

    #[tokio::test]
    async fn cancelled_ticket_does_not_verify() {
        let h = harness();
        let event = h.event(10, 0).await;
        let user = h.user().await;
        let registration = h.service.register(event.id, user).await.unwrap();
        h.service.cancel(event.id, user, None).await.unwrap();

        let outcome = h.service.verify_ticket(&registration.ticket_code).await.unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.message, TICKET_CANCELLED);
    }

    #[tokio::test]
    async fn unknown_ticket_changes_nothing() {
        let h = harness();
        let event = h.event(10, 0).await;
        h.service.register(event.id, h.user().await).await.unwrap();

        let outcome = h.service.verify_ticket("0123456789ABCDEF0123456789ABCDEF").await.unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.message, INVALID_TICKET);
        assert!(outcome.registration.is_none());

        let stats = h.service.stats(event.id, event.organizer_id).await.unwrap();
        assert_eq!(stats.attended_count, 0);
        assert_eq!(stats.total_registrations, 1);
    }

    #[tokio::test]
    async fn stats_count_each_bucket() {
        let h = harness();
        let mut event = h.event(10, 10).await;

        let mut users = Vec::new();
        for _ in 0..2 {
            let user = h.user().await;
            h.service.register(event.id, user).await.unwrap();
            users.push(user);
        }

        event.ticket_price = Decimal::ZERO;
        h.save(&event).await;
        let mut tickets = Vec::new();
        for _ in 0..3 {
            let user = h.user().await;
            tickets.push(h.service.register(event.id, user).await.unwrap().ticket_code);
            users.push(user);
        }

        h.service.verify_ticket(&tickets[1]).await.unwrap();
        h.service.cancel(event.id, users[4], None).await.unwrap();

        let stats = h.service.stats(event.id, event.organizer_id).await.unwrap();
        assert_eq!(stats.total_registrations, 4);
        assert_eq!(stats.attended_count, 1);
        assert_eq!(stats.cancelled_count, 1);
        assert_eq!(stats.pending_payments, 2);
    }

    #[tokio::test]
    async fn stats_are_for_the_organizer_only() {
        let h = harness();
        let event = h.event(10, 0).await;

        let err = h.service.stats(event.id, h.user().await).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = h
            .service
            .stats(Uuid::new_v4(), event.organizer_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_email_keeps_the_registration() {
        let h = harness_with(RecordingNotifier::failing());
        let event = h.event(10, 0).await;
        let user = h.user().await;

        let registration = h.service.register(event.id, user).await.unwrap();
        assert!(h.notifier.sent().is_empty());
        assert!(h
            .service
            .registrations
            .find_by_ticket_code(&registration.ticket_code)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn attendee_list_skips_cancelled_and_carries_users() {
        let h = harness();
        let event = h.event(10, 0).await;
        let staying = h.user().await;
        let leaving = h.user().await;
        h.service.register(event.id, staying).await.unwrap();
        h.service.register(event.id, leaving).await.unwrap();
        h.service.cancel(event.id, leaving, None).await.unwrap();

        let attendees = h
            .service
            .event_registrations(event.id, event.organizer_id)
            .await
            .unwrap();
        assert_eq!(attendees.len(), 1);
        assert_eq!(attendees[0].registration.user_id, staying);
        assert_eq!(attendees[0].user.as_ref().map(|u| u.id), Some(staying));

        let err = h
            .service
            .event_registrations(event.id, staying)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn user_registrations_include_event_summary() {
        let h = harness();
        let event = h.event(10, 0).await;
        let user = h.user().await;
        h.service.register(event.id, user).await.unwrap();

        let mine = h.service.user_registrations(user).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].event.as_ref().map(|e| e.id), Some(event.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_never_overbook() {
        let h = harness();
        let event_id = h.event(5, 10).await.id;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let service = h.service.clone();
            let user = h.user().await;
            handles.push(tokio::spawn(
                async move { service.register(event_id, user).await },
            ));
        }

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(e) => assert!(matches!(e, AppError::CapacityExceeded(_)), "{}", e),
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicate_registrations_admit_one() {
        let h = harness();
        let event_id = h.event(50, 0).await.id;
        let user = h.user().await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = h.service.clone();
            handles.push(tokio::spawn(
                async move { service.register(event_id, user).await },
            ));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scans_verify_once() {
        let h = harness();
        let event = h.event(10, 0).await;
        let registration = h.service.register(event.id, h.user().await).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = h.service.clone();
            let code = registration.ticket_code.clone();
            handles.push(tokio::spawn(async move {
                service.verify_ticket(&code).await
            }));
        }

        let mut valid = 0;
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            if outcome.valid {
                valid += 1;
            } else {
                assert_eq!(outcome.message, TICKET_ALREADY_USED);
            }
        }
        assert_eq!(valid, 1);
    }

    /// Delegates to the memory store, but reports a ticket-code conflict for
    /// the first `collisions` inserts and can lose a registration right after
    /// its check-in attempt.
    struct ScriptedStore {
        inner: Arc<MemoryStore>,
        collisions: AtomicU32,
        offered_codes: Mutex<Vec<String>>,
        vanish_on_attend: AtomicBool,
        vanished: AtomicBool,
    }

    impl ScriptedStore {
        fn new(inner: Arc<MemoryStore>, collisions: u32) -> Self {
            Self {
                inner,
                collisions: AtomicU32::new(collisions),
                offered_codes: Mutex::new(Vec::new()),
                vanish_on_attend: AtomicBool::new(false),
                vanished: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl RegistrationRepository for ScriptedStore {
        async fn create_guarded(
            &self,
            event_id: Uuid,
            user_id: Uuid,
            admit: Admission<'_>,
        ) -> Result<Registration, AppError> {
            let record = |event: Option<&Event>,
                          occupancy: Occupancy|
             -> Result<NewRegistration, AppError> {
                let new = admit(event, occupancy)?;
                self.offered_codes.lock().unwrap().push(new.ticket_code.clone());
                Ok(new)
            };

            let remaining = self.collisions.load(Ordering::SeqCst);
            if remaining > 0 {
                self.collisions.store(remaining - 1, Ordering::SeqCst);
                let event = EventRepository::find_by_id(self.inner.as_ref(), event_id)
                    .await?;
                record(event.as_ref(), Occupancy::default())?;
                return Err(AppError::TicketCodeCollision);
            }
            self.inner.create_guarded(event_id, user_id, &record).await
        }

        async fn find_by_ticket_code(
            &self,
            ticket_code: &str,
        ) -> Result<Option<Registration>, AppError> {
            if self.vanished.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_by_ticket_code(ticket_code).await
        }

        async fn find_registered(
            &self,
            event_id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<Registration>, AppError> {
            self.inner.find_registered(event_id, user_id).await
        }

        async fn has_active(&self, event_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
            self.inner.has_active(event_id, user_id).await
        }

        async fn cancel(
            &self,
            id: Uuid,
            at: DateTime<Utc>,
            reason: &str,
        ) -> Result<Option<Registration>, AppError> {
            self.inner.cancel(id, at, reason).await
        }

        async fn mark_attended(
            &self,
            id: Uuid,
            at: DateTime<Utc>,
        ) -> Result<Option<Registration>, AppError> {
            if self.vanish_on_attend.load(Ordering::SeqCst) {
                self.vanished.store(true, Ordering::SeqCst);
                return Ok(None);
            }
            self.inner.mark_attended(id, at).await
        }

        async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Registration>, AppError> {
            self.inner.list_by_user(user_id).await
        }

        async fn list_active_by_event(
            &self,
            event_id: Uuid,
        ) -> Result<Vec<Registration>, AppError> {
            self.inner.list_active_by_event(event_id).await
        }

        async fn count(&self, event_id: Uuid, filter: RegistrationFilter) -> Result<i64, AppError> {
            self.inner.count(event_id, filter).await
        }
    }

    fn scripted_harness(collisions: u32) -> (Harness, Arc<ScriptedStore>) {
        let store = Arc::new(MemoryStore::new());
        let scripted = Arc::new(ScriptedStore::new(store.clone(), collisions));
        let h = harness_over(store, scripted.clone(), RecordingNotifier::default());
        (h, scripted)
    }

    #[tokio::test]
    async fn ticket_code_conflict_draws_a_fresh_code() {
        let (h, scripted) = scripted_harness(2);
        let event = h.event(10, 0).await;

        let registration = h.service.register(event.id, h.user().await).await.unwrap();

        let offered = scripted.offered_codes.lock().unwrap().clone();
        assert_eq!(offered.len(), 3);
        assert_ne!(offered[0], offered[1]);
        assert_ne!(offered[1], offered[2]);
        assert_eq!(registration.ticket_code, offered[2]);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn ticket_issuance_gives_up_after_three_conflicts() {
        let (h, scripted) = scripted_harness(3);
        let event = h.event(10, 0).await;
        let user = h.user().await;

        let err = h.service.register(event.id, user).await.unwrap_err();

        assert!(matches!(err, AppError::TicketIssuanceFailed(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(scripted.offered_codes.lock().unwrap().len(), 3);
        assert!(!h.service.is_registered(event.id, user).await.unwrap());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn malformed_ticket_code_is_invalid() {
        let h = harness();
        let event = h.event(10, 0).await;
        let registration = h.service.register(event.id, h.user().await).await.unwrap();

        let lower = registration.ticket_code.to_lowercase();
        for code in ["abc", "not a ticket", lower.as_str()] {
            let outcome = h.service.verify_ticket(code).await.unwrap();
            assert!(!outcome.valid);
            assert_eq!(outcome.message, INVALID_TICKET);
        }

        let stats = h.service.stats(event.id, event.organizer_id).await.unwrap();
        assert_eq!(stats.attended_count, 0);
    }

    #[tokio::test]
    async fn ticket_gone_after_lost_check_in_is_invalid() {
        let (h, scripted) = scripted_harness(0);
        let event = h.event(10, 0).await;
        let registration = h.service.register(event.id, h.user().await).await.unwrap();
        scripted.vanish_on_attend.store(true, Ordering::SeqCst);

        let outcome = h.service.verify_ticket(&registration.ticket_code).await.unwrap();

        assert!(!outcome.valid);
        assert_eq!(outcome.message, INVALID_TICKET);
    }
}
