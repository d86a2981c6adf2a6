//! acton-mailer: template-driven email for axum applications
//!
//! Renders email bodies with the application's own templates, derives a
//! plain-text alternative, and hands the result to a mail transport that can
//! be swapped at runtime without restarting the process.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use acton_mailer::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ActonMailerConfig::load_for_service("my-app")?;
//!     let renderer = Arc::new(MiniJinjaRenderer::from_settings(&config.templates));
//!     let mailer = Mailer::new(config.mailer.clone(), renderer)?
//!         .with_text_options(config.text.clone());
//!
//!     let state = ActonMailerState::with_config(config)?;
//!     let app = extend(
//!         axum::Router::new().route("/welcome", axum::routing::post(welcome)),
//!         &state,
//!         mailer,
//!     )
//!     .await?
//!     .with_state(state);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//!
//! async fn welcome(mailer: RequestMailer) -> Result<&'static str, MailerError> {
//!     let locals = Locals::new()
//!         .with("to", "ana@example.com")
//!         .with("subject", "Welcome!")
//!         .with("name", "Ana");
//!     mailer.send("welcome", &locals).await?;
//!     Ok("sent")
//! }
//! ```
//!
//! # Concurrency
//!
//! Sends and transport swaps are serialized: a send runs entirely against
//! one transport, and [`Mailer::update`](email::Mailer::update) waits for
//! in-flight sends before closing the old transport.

#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod email;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod observability;
pub mod state;
pub mod template;
pub mod testing;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! # Examples
    //!
    //! ```rust
    //! use acton_mailer::prelude::*;
    //! ```

    // Configuration
    pub use crate::config::{
        ActonMailerConfig, ConsoleOptions, MailerConfig, SmtpOptions, TemplateSettings, TlsMode,
        TransportOptions,
    };

    // Email pipeline
    pub use crate::email::{
        extend, Attachment, ComposedMessage, DeliveryReceipt, Envelope, Locals, Mailer,
        RequestMailer, SendOptions, SendRequest, TextOptions, Transport, Transporter,
    };

    // Templates
    pub use crate::template::{MiniJinjaRenderer, Renderer, ViewLocals};

    // Extractors
    pub use crate::extractors::AppMailer;

    // Error types
    pub use crate::error::{MailerError, RenderError, TransportError};

    // Application state
    pub use crate::state::ActonMailerState;

    // Re-export key dependencies
    pub use axum;

    pub use serde_json::json;
}
