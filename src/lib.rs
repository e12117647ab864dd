pub mod auth;
pub mod clock;
pub mod config;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::notify::{templates, LogNotifier, Notifier, SmtpNotifier};
use crate::repository::memory::MemoryStore;
use crate::repository::postgres::{
    self, PostgresEventRepo, PostgresMessageRepo, PostgresRegistrationRepo, PostgresUserRepo,
};
use crate::repository::{EventRepository, MessageRepository, RegistrationRepository, UserRepository};
use crate::services::{EventService, MessageService, RegistrationService, UserService};
use crate::state::AppState;
use crate::utils::error::AppError;

const DEFAULT_LOG_FILTER: &str = "info,eventhub_server=debug,tower_http=debug";

pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// The stores, notifier and clock the services are wired with.
pub struct Backends {
    pub events: Arc<dyn EventRepository>,
    pub registrations: Arc<dyn RegistrationRepository>,
    pub users: Arc<dyn UserRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// Every store backed by one in-memory instance.
    pub fn in_memory(
        store: Arc<MemoryStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events: store.clone(),
            registrations: store.clone(),
            users: store.clone(),
            messages: store,
            notifier,
            clock,
        }
    }
}

pub fn build_state(config: Config, backends: Backends) -> Result<AppState, AppError> {
    let registrations = RegistrationService::new(
        backends.events.clone(),
        backends.registrations,
        backends.users.clone(),
        backends.notifier,
        backends.clock.clone(),
        Arc::new(templates::load()?),
        config.frontend_url.clone(),
    );
    let users = UserService::new(
        backends.users,
        backends.clock.clone(),
        config.allowed_email_domains.clone(),
    );

    Ok(AppState {
        events: Arc::new(EventService::new(backends.events, backends.clock.clone())),
        registrations: Arc::new(registrations),
        messages: Arc::new(MessageService::new(backends.messages, backends.clock)),
        users: Arc::new(users),
        config: Arc::new(config),
    })
}

/// Picks PostgreSQL when `DATABASE_URL` is set and SMTP when `EMAIL_HOST`
/// is set, falling back to the in-memory store and the logging notifier.
pub async fn bootstrap_state(config: Config) -> Result<AppState, AppError> {
    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, port = smtp.port, "Ticket emails go through SMTP");
            Arc::new(SmtpNotifier::new(smtp))
        }
        None => {
            tracing::warn!("EMAIL_HOST not set, ticket emails will only be logged");
            Arc::new(LogNotifier)
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let backends = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(database_url)
                .await?;
            tracing::info!("Successfully connected to database");

            postgres::run_migrations(&pool)
                .await
                .map_err(|e| AppError::InternalServerError(format!("Migrations failed: {}", e)))?;
            tracing::info!("Migrations run successfully");

            Backends {
                events: Arc::new(PostgresEventRepo::new(pool.clone())),
                registrations: Arc::new(PostgresRegistrationRepo::new(pool.clone())),
                users: Arc::new(PostgresUserRepo::new(pool.clone())),
                messages: Arc::new(PostgresMessageRepo::new(pool)),
                notifier,
                clock,
            }
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
            Backends::in_memory(Arc::new(MemoryStore::new()), notifier, clock)
        }
    };

    build_state(config, backends)
}

pub async fn run(config: Config) -> Result<(), AppError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = bootstrap_state(config).await?;
    let app = routes::create_routes(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::InternalServerError(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::InternalServerError(format!("Server failed: {}", e)))
}
