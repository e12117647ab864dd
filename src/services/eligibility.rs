//! Registration admission rules.
//!
//! The checks run in a fixed order and the first failure wins, so a caller
//! always learns the most fundamental reason a registration was refused.

use chrono::{DateTime, Utc};

use crate::models::event::{Event, EventStatus};
use crate::models::registration::Occupancy;
use crate::utils::error::AppError;

pub const EVENT_NOT_FOUND: &str = "Event not found";
pub const REGISTRATION_CLOSED: &str = "Cannot register for this event";
pub const REGISTRATION_DEADLINE_PASSED: &str = "Registration deadline has passed";
pub const ALREADY_REGISTERED: &str = "You are already registered for this event";
pub const EVENT_FULL: &str = "Event has reached maximum capacity";

/// Decides whether `occupancy` leaves room for one more registration on
/// `event` at `now`, handing back the admitted event.
///
/// `occupancy` must be read under the same guard that will perform the
/// insert, otherwise the duplicate and capacity checks are advisory only.
pub fn check_eligibility(
    event: Option<&Event>,
    occupancy: Occupancy,
    now: DateTime<Utc>,
) -> Result<&Event, AppError> {
    let event = event.ok_or_else(|| AppError::NotFound(EVENT_NOT_FOUND.to_string()))?;

    if event.status != EventStatus::Upcoming {
        return Err(AppError::InvalidState(REGISTRATION_CLOSED.to_string()));
    }

    if now > event.registration_deadline() {
        return Err(AppError::DeadlinePassed(
            REGISTRATION_DEADLINE_PASSED.to_string(),
        ));
    }

    if occupancy.has_active_registration {
        return Err(AppError::DuplicateRegistration(
            ALREADY_REGISTERED.to_string(),
        ));
    }

    if occupancy.registered_count >= i64::from(event.max_attendees) {
        return Err(AppError::CapacityExceeded(EVENT_FULL.to_string()));
    }

    Ok(event)
}
