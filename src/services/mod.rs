pub mod eligibility;
pub mod events;
pub mod messages;
pub mod qr;
pub mod registration;
pub mod ticket;
pub mod users;

pub use events::EventService;
pub use messages::MessageService;
pub use registration::RegistrationService;
pub use users::UserService;
