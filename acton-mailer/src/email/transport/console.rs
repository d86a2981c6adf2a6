//! Console transport for development
//!
//! Logs messages instead of delivering them.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::config::ConsoleOptions;
use crate::email::{ComposedMessage, DeliveryReceipt};
use crate::error::TransportError;

use super::Transport;

/// Console transport
///
/// Every send is logged at `info` with the message headers and receipts are
/// issued with a freshly generated Message-ID. In verbose mode both bodies
/// are logged at `debug` as well.
#[derive(Debug, Default)]
pub struct ConsoleTransport {
    verbose: bool,
    closed: AtomicBool,
}

impl ConsoleTransport {
    /// Create a console transport that logs headers only
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a console transport that also logs message bodies
    #[must_use]
    pub const fn verbose() -> Self {
        Self {
            verbose: true,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a console transport from configuration
    #[must_use]
    pub const fn with_options(options: &ConsoleOptions) -> Self {
        Self {
            verbose: options.verbose,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, message: &ComposedMessage) -> Result<DeliveryReceipt, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let message_id = message.generate_message_id();

        info!(
            message_id = %message_id,
            from = %message.from,
            to = ?message.to,
            cc = ?message.cc,
            bcc = ?message.bcc,
            subject = message.subject.as_deref().unwrap_or_default(),
            attachments = message.attachments.len(),
            "Console email sent"
        );

        if self.verbose || message.debug {
            debug!(
                sender = ?message.sender,
                reply_to = ?message.reply_to,
                in_reply_to = ?message.in_reply_to,
                references = ?message.references,
                envelope = ?message.envelope,
                "Email details"
            );
            debug!(text = %message.text, "Email text content");
            debug!(html = %message.html, "Email HTML content");
        }

        Ok(DeliveryReceipt::new(message_id)
            .accepted(message.recipients())
            .response("250 logged to console"))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "console"
    }
}
