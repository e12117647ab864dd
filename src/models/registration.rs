use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::event::EventSummary;
use crate::models::user::UserSummary;

pub const DEFAULT_CANCELLATION_REASON: &str = "User requested cancellation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Registered,
    Attended,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::Attended => "attended",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    /// `attended` and `cancelled` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RegistrationStatus::Registered)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(RegistrationStatus::Registered),
            "attended" => Ok(RegistrationStatus::Attended),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            other => Err(format!("unknown registration status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub registration_date: DateTime<Utc>,
    pub status: RegistrationStatus,
    pub ticket_code: String,
    pub qr_code: String,
    pub payment_status: PaymentStatus,
    pub payment_amount: Decimal,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the lifecycle manager decides before the store assigns
/// persistence timestamps.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub ticket_code: String,
    pub qr_code: String,
    pub payment_status: PaymentStatus,
    pub payment_amount: Decimal,
    pub registered_at: DateTime<Utc>,
}

impl NewRegistration {
    pub fn into_registration(self) -> Registration {
        Registration {
            id: Uuid::new_v4(),
            event_id: self.event_id,
            user_id: self.user_id,
            registration_date: self.registered_at,
            status: RegistrationStatus::Registered,
            ticket_code: self.ticket_code,
            qr_code: self.qr_code,
            payment_status: self.payment_status,
            payment_amount: self.payment_amount,
            cancellation_date: None,
            cancellation_reason: None,
            created_at: self.registered_at,
            updated_at: self.registered_at,
        }
    }
}

/// Registration counts for one event, as seen by the eligibility check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Occupancy {
    /// The requesting user already holds a non-cancelled registration.
    pub has_active_registration: bool,
    /// Registrations currently in `registered`.
    pub registered_count: i64,
}

/// Selection used by the statistics counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationFilter {
    NotCancelled,
    Status(RegistrationStatus),
    Payment(PaymentStatus),
}

impl RegistrationFilter {
    pub fn matches(&self, registration: &Registration) -> bool {
        match self {
            RegistrationFilter::NotCancelled => {
                registration.status != RegistrationStatus::Cancelled
            }
            RegistrationFilter::Status(status) => registration.status == *status,
            RegistrationFilter::Payment(payment) => registration.payment_status == *payment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStats {
    pub total_registrations: i64,
    pub attended_count: i64,
    pub cancelled_count: i64,
    pub pending_payments: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketVerification {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<Registration>,
}

impl TicketVerification {
    pub fn rejected(message: &str) -> Self {
        Self {
            valid: false,
            message: message.to_string(),
            registration: None,
        }
    }
}

/// A registration with its event attached, as listed to the attendee.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistration {
    #[serde(flatten)]
    pub registration: Registration,
    pub event: Option<EventSummary>,
}

/// A registration with its attendee attached, as listed to the organizer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    #[serde(flatten)]
    pub registration: Registration,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationState {
    pub is_registered: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRegistrationRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTicketRequest {
    #[serde(default)]
    pub ticket_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_registered_is_open() {
        assert!(!RegistrationStatus::Registered.is_terminal());
        assert!(RegistrationStatus::Attended.is_terminal());
        assert!(RegistrationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn new_registration_starts_registered() {
        let now = Utc::now();
        let registration = NewRegistration {
            event_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ticket_code: "ABC".into(),
            qr_code: "data:image/png;base64,".into(),
            payment_status: PaymentStatus::Completed,
            payment_amount: Decimal::ZERO,
            registered_at: now,
        }
        .into_registration();

        assert_eq!(registration.status, RegistrationStatus::Registered);
        assert_eq!(registration.registration_date, now);
        assert!(registration.cancellation_date.is_none());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let stats = RegistrationStats {
            total_registrations: 4,
            attended_count: 1,
            cancelled_count: 1,
            pending_payments: 2,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["totalRegistrations"], 4);
        assert_eq!(json["pendingPayments"], 2);
    }
}
