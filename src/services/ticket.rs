use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes behind each ticket code.
pub const TICKET_CODE_BYTES: usize = 16;

/// Length of the rendered code.
pub const TICKET_CODE_LEN: usize = TICKET_CODE_BYTES * 2;

/// Draws a fresh ticket code: 128 bits from the OS generator, rendered as
/// upper-case hex. Callers that hit a uniqueness conflict must draw again.
pub fn generate_ticket_code() -> String {
    let mut bytes = [0u8; TICKET_CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == TICKET_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}
