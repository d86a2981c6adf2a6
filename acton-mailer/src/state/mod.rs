//! Application state management
//!
//! Holds the loaded configuration and the mailer attached to the application.

use crate::{config::ActonMailerConfig, email::Mailer, error::MailerError};
use std::sync::{Arc, OnceLock};

/// Application state for acton-mailer applications
///
/// # Example
///
/// ```rust
/// use acton_mailer::state::ActonMailerState;
///
/// # fn example() -> anyhow::Result<()> {
/// let state = ActonMailerState::new()?;
///
/// let app: axum::Router = axum::Router::new()
///     .route("/", axum::routing::get(|| async { "Hello!" }))
///     .with_state(state);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ActonMailerState {
    config: Arc<ActonMailerConfig>,
    mailer: Arc<OnceLock<Mailer>>,
}

impl ActonMailerState {
    /// Create application state with default configuration
    ///
    /// # Errors
    ///
    /// Infallible today; kept fallible so state creation can grow setup steps.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(ActonMailerConfig::default())
    }

    /// Create application state with custom configuration
    ///
    /// # Errors
    ///
    /// Infallible today; kept fallible so state creation can grow setup steps.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use acton_mailer::{config::ActonMailerConfig, state::ActonMailerState};
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = ActonMailerConfig::load_for_service("my-app")?;
    /// let state = ActonMailerState::with_config(config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_config(config: ActonMailerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            mailer: Arc::new(OnceLock::new()),
        })
    }

    /// Get configuration reference
    #[must_use]
    pub fn config(&self) -> &ActonMailerConfig {
        &self.config
    }

    /// The mailer attached by [`extend`](crate::email::extend), if any
    #[must_use]
    pub fn mailer(&self) -> Option<&Mailer> {
        self.mailer.get()
    }

    pub(crate) fn attach_mailer(&self, mailer: Mailer) -> Result<(), MailerError> {
        self.mailer
            .set(mailer)
            .map_err(|_| MailerError::AlreadyExtended)
    }
}
