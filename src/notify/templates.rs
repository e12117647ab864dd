use tera::{Context, Tera};

use crate::models::event::Event;
use crate::models::registration::Registration;
use crate::models::user::User;
use crate::utils::error::AppError;

const TICKET_TEMPLATE: &str = "ticket.html";

pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Parses the email templates. The `.html` names keep Tera's autoescaping on.
pub fn load() -> Result<Tera, AppError> {
    let mut tera = Tera::default();
    tera.add_raw_template(TICKET_TEMPLATE, include_str!("../templates/ticket.html"))
        .map_err(|e| AppError::InternalServerError(format!("Tera parse error: {:?}", e)))?;
    Ok(tera)
}

/// The digital ticket sent right after a successful registration.
pub fn ticket_email(
    tera: &Tera,
    registration: &Registration,
    event: &Event,
    user: &User,
    frontend_url: &str,
) -> Result<RenderedEmail, AppError> {
    let mut context = Context::new();
    context.insert("name", &user.name);
    context.insert("title", &event.title);
    context.insert("date", &event.start_date.format("%A, %d %B %Y").to_string());
    context.insert("start_time", &event.start_date.format("%H:%M").to_string());
    context.insert("end_time", &event.end_date.format("%H:%M").to_string());
    context.insert("location", &event.location);
    context.insert("ticket_code", &registration.ticket_code);
    context.insert("qr_code", &registration.qr_code);
    context.insert("allow_cancellation", &event.allow_cancellation);
    context.insert("cancellation_hours", &event.cancellation_deadline_hours);
    context.insert(
        "event_url",
        &format!("{}/events/{}", frontend_url.trim_end_matches('/'), event.id),
    );

    let html = tera
        .render(TICKET_TEMPLATE, &context)
        .map_err(|e| AppError::ExternalServiceError(format!("Tera render error: {:?}", e)))?;

    Ok(RenderedEmail {
        subject: format!("Your ticket for {} - EventHub", event.title),
        html,
    })
}
