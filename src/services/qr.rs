use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use uuid::Uuid;

use crate::utils::error::AppError;

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// What a scanner reads back from the ticket image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub ticket_code: String,
    pub event_id: Uuid,
    pub timestamp: String,
}

impl QrPayload {
    pub fn new(ticket_code: &str, event_id: Uuid, issued_at: DateTime<Utc>) -> Self {
        Self {
            ticket_code: ticket_code.to_string(),
            event_id,
            timestamp: issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Renders the payload as a PNG QR code wrapped in a data URI.
pub fn encode_ticket_qr(payload: &QrPayload) -> Result<String, AppError> {
    let json = serde_json::to_string(payload)
        .map_err(|e| AppError::TicketIssuanceFailed(format!("QR payload serialization: {}", e)))?;

    let code = QrCode::new(json.as_bytes())
        .map_err(|e| AppError::TicketIssuanceFailed(format!("QR encoding: {}", e)))?;

    let image = code.render::<Luma<u8>>().min_dimensions(200, 200).build();

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| AppError::TicketIssuanceFailed(format!("QR image: {}", e)))?;

    Ok(format!(
        "{}{}",
        DATA_URI_PREFIX,
        general_purpose::STANDARD.encode(png.into_inner())
    ))
}
