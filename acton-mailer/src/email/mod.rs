//! Template-driven email
//!
//! Sending a message runs one pipeline:
//!
//! 1. the named template is rendered with the caller's locals
//! 2. a plain-text body is derived from the rendered HTML
//! 3. explicit options, locals and the transport's default sender are
//!    merged into a [`ComposedMessage`] (see [`merge`])
//! 4. the message is handed to the active [`Transport`]
//!
//! The first failing step ends the pipeline and its error is returned
//! unchanged. A message is never partially sent.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use acton_mailer::config::MailerConfig;
//! use acton_mailer::email::{Locals, Mailer};
//! use acton_mailer::template::MiniJinjaRenderer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let renderer = MiniJinjaRenderer::new();
//! renderer.add_template("welcome", "<p>Hi {{ name }}</p>")?;
//!
//! let mailer = Mailer::new(MailerConfig::console("noreply@example.com"), Arc::new(renderer))?;
//!
//! let locals = Locals::new()
//!     .with("name", "Ana")
//!     .with("to", "ana@example.com")
//!     .with("subject", "Welcome!");
//! let receipt = mailer.send("welcome", &locals).await?;
//! println!("sent {}", receipt.message_id);
//! # Ok(())
//! # }
//! ```

mod composer;
mod fields;
mod locals;
mod mailer;
mod message;
mod text;
pub mod transport;
mod transporter;

pub use composer::Composer;
pub use fields::{is_accepted, merge, AcceptedField, ACCEPTED_FIELDS};
pub use locals::Locals;
pub use mailer::{extend, Mailer, RequestMailer};
pub use message::{
    Attachment, AttachmentEncoding, ComposedMessage, DeliveryReceipt, Envelope, SendOptions,
    SendRequest,
};
pub use text::{extract_text, TextOptions};
pub use transport::{
    ConsoleTransport, DefaultTransportFactory, SmtpTransport, Transport, TransportFactory,
};
pub use transporter::Transporter;
