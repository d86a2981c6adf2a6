//! Error types and error handling
//!
//! Every failure in the send pipeline is reported exactly once, as the `Err`
//! of the operation that was awaited. The mailer never logs an error on the
//! caller's behalf and never retries.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Mailer error type
#[derive(Debug, Error)]
pub enum MailerError {
    /// The host application already has a mailer attached
    #[error("application has already been extended with a mailer")]
    AlreadyExtended,

    /// A structured send request did not name a template
    #[error("send request is missing a template name")]
    MissingTemplate,

    /// Template rendering failed
    #[error(transparent)]
    Render(RenderError),

    /// A local supplied under an accepted message field has the wrong shape
    #[error("invalid value for message field `{field}`: {reason}")]
    InvalidField {
        /// Accepted field name
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Closing the active transport failed; the prior transport is still active
    #[error("failed to close mail transport: {0}")]
    TransportClose(#[source] TransportError),

    /// Building a transport from the supplied configuration failed
    #[error("failed to open mail transport: {0}")]
    TransportOpen(#[source] TransportError),

    /// The transport could not deliver the composed message
    #[error(transparent)]
    Delivery(TransportError),
}

impl IntoResponse for MailerError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::AlreadyExtended => StatusCode::CONFLICT,
            Self::Delivery(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, "Failed to send email").into_response()
    }
}

/// Errors produced by a template renderer
#[derive(Debug, Error)]
pub enum RenderError {
    /// No template with the given name exists
    #[error("email template not found: {0}")]
    NotFound(String),

    /// The template engine failed while rendering
    #[error("failed to render email template: {0}")]
    Template(#[from] minijinja::Error),

    /// Any other renderer failure
    #[error("{0}")]
    Other(String),
}

impl RenderError {
    /// Create a renderer error from a string message
    #[must_use]
    pub fn other<T: Into<String>>(msg: T) -> Self {
        Self::Other(msg.into())
    }
}

/// Errors produced by a mail transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transport configuration is incomplete or invalid
    #[error("transport configuration error: {0}")]
    Config(String),

    /// An address could not be parsed
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// The wire message could not be built
    #[error("failed to build message: {0}")]
    Build(String),

    /// An attachment could not be decoded
    #[error("invalid attachment: {0}")]
    Attachment(String),

    /// SMTP protocol or connection failure
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// The transport has been closed
    #[error("transport is closed")]
    Closed,

    /// Any other transport failure
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create an SMTP error from a string message
    #[must_use]
    pub fn smtp<T: Into<String>>(msg: T) -> Self {
        Self::Smtp(msg.into())
    }

    /// Create a configuration error from a string message
    #[must_use]
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}
