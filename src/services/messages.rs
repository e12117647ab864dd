use std::sync::Arc;

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::clock::Clock;
use crate::models::message::{ContactMessage, CreateMessageRequest, MessageStatus};
use crate::repository::MessageRepository;
use crate::utils::error::AppError;

const MESSAGE_NOT_FOUND: &str = "Message not found";

pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl MessageService {
    pub fn new(messages: Arc<dyn MessageRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { messages, clock }
    }

    pub async fn create(&self, payload: CreateMessageRequest) -> Result<ContactMessage, AppError> {
        let payload = payload.normalized();
        payload.validate()?;

        let now = self.clock.now();
        let message = ContactMessage {
            id: Uuid::new_v4(),
            name: payload.name,
            email: payload.email,
            subject: payload.subject,
            message: payload.message,
            department: payload.department,
            status: MessageStatus::Unread,
            created_at: now,
            updated_at: now,
        };

        let message = self.messages.create(&message).await?;
        info!(message_id = %message.id, department = message.department.as_str(), "Contact message received");
        Ok(message)
    }

    pub async fn list(&self) -> Result<Vec<ContactMessage>, AppError> {
        self.messages.list().await
    }

    pub async fn get(&self, id: Uuid) -> Result<ContactMessage, AppError> {
        self.messages
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(MESSAGE_NOT_FOUND.to_string()))
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: MessageStatus,
    ) -> Result<ContactMessage, AppError> {
        let message = self
            .messages
            .update_status(id, status, self.clock.now())
            .await?
            .ok_or_else(|| AppError::NotFound(MESSAGE_NOT_FOUND.to_string()))?;
        info!(message_id = %id, status = status.as_str(), "Contact message status changed");
        Ok(message)
    }
}
