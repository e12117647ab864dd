use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Department {
    #[default]
    General,
    Technical,
    Partnerships,
    Careers,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::General => "general",
            Department::Technical => "technical",
            Department::Partnerships => "partnerships",
            Department::Careers => "careers",
        }
    }
}

impl FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Department::General),
            "technical" => Ok(Department::Technical),
            "partnerships" => Ok(Department::Partnerships),
            "careers" => Ok(Department::Careers),
            other => Err(format!("unknown department '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Unread,
    Read,
    Responded,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Unread => "unread",
            MessageStatus::Read => "read",
            MessageStatus::Responded => "responded",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(MessageStatus::Unread),
            "read" => Ok(MessageStatus::Read),
            "responded" => Ok(MessageStatus::Responded),
            other => Err(format!("unknown message status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub department: Department,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMessageRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters long"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    #[validate(length(min = 5, message = "Subject must be at least 5 characters long"))]
    pub subject: String,
    #[validate(length(min = 10, message = "Message must be at least 10 characters long"))]
    pub message: String,
    #[serde(default)]
    pub department: Department,
}

impl CreateMessageRequest {
    /// Trims every free-text field and lowercases the email.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            subject: self.subject.trim().to_string(),
            message: self.message.trim().to_string(),
            department: self.department,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMessageStatusRequest {
    pub status: MessageStatus,
}
