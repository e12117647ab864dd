use std::sync::Arc;

use crate::config::Config;
use crate::services::{EventService, MessageService, RegistrationService, UserService};

/// Shared by every handler. Everything behind an `Arc`, so cloning per
/// request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub events: Arc<EventService>,
    pub registrations: Arc<RegistrationService>,
    pub messages: Arc<MessageService>,
    pub users: Arc<UserService>,
}
