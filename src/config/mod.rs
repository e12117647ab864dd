use std::env;
use std::str::FromStr;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

use crate::models::user::UNIVERSITY_DOMAINS;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_JWT_SECRET: &str = "access_secret";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_EMAIL_FROM: &str = "EventHub <noreply@eventhub.com>";
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub port: u16,
    pub jwt_secret: String,
    pub frontend_url: String,
    /// Unset means notifications are only logged.
    pub smtp: Option<SmtpConfig>,
    pub cors_allowed_origins: Option<String>,
    pub production: bool,
    /// Mail domains new accounts may use; empty admits any domain.
    pub allowed_email_domains: Vec<String>,
    /// Whether unverified accounts are kept out of registration and event
    /// management.
    pub require_email_verification: bool,
}

fn university_domains() -> Vec<String> {
    UNIVERSITY_DOMAINS.iter().map(|d| d.to_string()).collect()
}

/// `*` lifts the restriction; otherwise a comma separated list.
fn parse_domains(raw: &str) -> Vec<String> {
    if raw.trim() == "*" {
        return Vec::new();
    }
    raw.split(',')
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            port: DEFAULT_PORT,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            smtp: None,
            cors_allowed_origins: None,
            production: false,
            allowed_email_domains: university_domains(),
            require_email_verification: true,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: FromStr>(key: &str, default: T) -> T {
    match non_empty_var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Config: {} has unparseable value '{}', using default", key, raw);
            default
        }),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let smtp = non_empty_var("EMAIL_HOST").map(|host| SmtpConfig {
            host,
            port: parsed_var("EMAIL_PORT", DEFAULT_SMTP_PORT),
            username: env::var("EMAIL_USER").unwrap_or_default(),
            password: env::var("EMAIL_PASS").unwrap_or_default(),
            from: non_empty_var("EMAIL_FROM").unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
        });

        let config = Self {
            database_url: non_empty_var("DATABASE_URL"),
            max_connections: parsed_var("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            port: parsed_var("PORT", DEFAULT_PORT),
            jwt_secret: non_empty_var("JWT_ACCESS_SECRET")
                .unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string()),
            frontend_url: non_empty_var("FRONTEND_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            smtp,
            cors_allowed_origins: non_empty_var("CORS_ALLOWED_ORIGINS"),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            allowed_email_domains: non_empty_var("ALLOWED_EMAIL_DOMAINS")
                .map(|raw| parse_domains(&raw))
                .unwrap_or_else(university_domains),
            require_email_verification: parsed_var("REQUIRE_EMAIL_VERIFICATION", true),
        };

        if !config.require_email_verification {
            tracing::warn!("Config: email verification is not enforced");
        }
        if config.jwt_secret == DEFAULT_JWT_SECRET {
            tracing::warn!("Config: JWT_ACCESS_SECRET not set, using the development secret");
        }
        tracing::debug!(
            port = config.port,
            persistent = config.database_url.is_some(),
            smtp = config.smtp.is_some(),
            "Configuration loaded"
        );

        config
    }
}
