//! Application state for the Gigbook HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - Repositories (profiles, bookings, waitlist)
//! - Hosted providers (auth, payments, email, avatar storage)
//! - Settings derived from [`Config`]

use crate::aggregates::booking::{BookingEnvironment, DepositSettings};
use crate::aggregates::profile::ProfileEnvironment;
use crate::config::Config;
use crate::notifications::Links;
use crate::providers::{
    AvatarStorage, ConsoleMailer, HostedStorage, Mailer, PaymentGateway, ResendConfig,
    ResendMailer, StorageConfig, StripeConfig, StripeGateway,
};
use crate::repositories::{
    BookingRepository, PostgresDatabase, ProfileRepository, WaitlistRepository,
};
use anyhow::Context;
use axum::extract::FromRef;
use gigbook_auth::{AuthConfig, AuthProvider, CookieConfig, HostedAuthClient, SessionState};
use gigbook_core::environment::{Clock, SystemClock};
use sqlx::PgPool;
use std::sync::Arc;

/// Collaborators behind trait objects, swappable for in-memory versions.
#[derive(Clone)]
pub struct Services {
    /// DJ profiles
    pub profiles: Arc<dyn ProfileRepository>,
    /// Booking requests
    pub bookings: Arc<dyn BookingRepository>,
    /// Waitlist entries
    pub waitlist: Arc<dyn WaitlistRepository>,
    /// Hosted checkout
    pub payments: Arc<dyn PaymentGateway>,
    /// Transactional email
    pub mailer: Arc<dyn Mailer>,
    /// Avatar uploads
    pub storage: Arc<dyn AvatarStorage>,
    /// Hosted auth
    pub auth: Arc<dyn AuthProvider>,
    /// Wall clock
    pub clock: Arc<dyn Clock>,
}

/// Request-independent settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Absolute links for emails and redirects
    pub links: Links,
    /// Session cookie attributes
    pub cookies: CookieConfig,
    /// Deposit policy
    pub deposit: DepositSettings,
    /// Webhook signing secret
    pub webhook_secret: String,
    /// Accepted webhook timestamp skew in seconds
    pub webhook_tolerance: i64,
}

impl Settings {
    /// Settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            links: Links::new(&config.server.site_url),
            cookies: CookieConfig::new(config.server.secure_cookies),
            deposit: config.deposit.clone(),
            webhook_secret: config.payments.webhook_secret.clone(),
            webhook_tolerance: config.payments.webhook_tolerance,
        }
    }
}

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Repositories and providers
    pub services: Services,
    /// Static settings
    pub settings: Arc<Settings>,
    /// Database pool for readiness checks; `None` when running in memory
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Create application state from its parts.
    #[must_use]
    pub fn new(services: Services, settings: Settings, pool: Option<PgPool>) -> Self {
        Self {
            services,
            settings: Arc::new(settings),
            pool,
        }
    }

    /// Wire the hosted providers and Postgres repositories from `config`.
    ///
    /// An empty email API key selects the console mailer.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &Config, pool: PgPool) -> anyhow::Result<Self> {
        let timeout = Config::http_timeout();
        let database = Arc::new(PostgresDatabase::new(pool.clone()));

        let auth = HostedAuthClient::new(
            AuthConfig::new(&config.auth.url, &config.auth.anon_key, &config.server.site_url)
                .with_timeout(timeout),
        )
        .context("building auth client")?;

        let payments = StripeGateway::new(StripeConfig {
            api_base: config.payments.api_base.clone(),
            secret_key: config.payments.secret_key.clone(),
            timeout,
        })
        .context("building payment gateway")?;

        let mailer: Arc<dyn Mailer> = if config.email.api_key.trim().is_empty() {
            tracing::warn!("RESEND_API_KEY not set, emails will be logged instead of sent");
            Arc::new(ConsoleMailer)
        } else {
            Arc::new(
                ResendMailer::new(ResendConfig {
                    api_base: config.email.api_base.clone(),
                    api_key: config.email.api_key.clone(),
                    from: config.email.from.clone(),
                    timeout,
                })
                .context("building mailer")?,
            )
        };

        let storage = HostedStorage::new(StorageConfig {
            url: config.storage.url.clone(),
            service_key: config.storage.service_key.clone(),
            bucket: config.storage.bucket.clone(),
            timeout,
        })
        .context("building storage client")?;

        let services = Services {
            profiles: database.clone(),
            bookings: database.clone(),
            waitlist: database,
            payments: Arc::new(payments),
            mailer,
            storage: Arc::new(storage),
            auth: Arc::new(auth),
            clock: Arc::new(SystemClock),
        };

        Ok(Self::new(services, Settings::from_config(config), Some(pool)))
    }

    /// Environment for the booking reducer.
    #[must_use]
    pub fn booking_env(&self) -> BookingEnvironment {
        BookingEnvironment {
            bookings: self.services.bookings.clone(),
            payments: self.services.payments.clone(),
            mailer: self.services.mailer.clone(),
            clock: self.services.clock.clone(),
            links: self.settings.links.clone(),
            deposit: self.settings.deposit.clone(),
        }
    }

    /// Environment for the profile reducer.
    #[must_use]
    pub fn profile_env(&self) -> ProfileEnvironment {
        ProfileEnvironment {
            profiles: self.services.profiles.clone(),
            storage: self.services.storage.clone(),
            clock: self.services.clock.clone(),
        }
    }

    /// State for the session middleware.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        SessionState::new(self.services.auth.clone(), self.settings.cookies.clone())
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.session_state()
    }
}
