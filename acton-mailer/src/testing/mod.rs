//! Testing utilities for acton-mailer applications
//!
//! - [`RecordingFactory`] opens [`RecordingTransport`]s that keep every
//!   message they are handed, tagged with the configuration that opened them
//! - [`StaticRenderer`] serves fixed HTML per template name
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use acton_mailer::config::MailerConfig;
//! use acton_mailer::email::{Locals, Mailer, Transporter};
//! use acton_mailer::testing::{RecordingFactory, StaticRenderer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = RecordingFactory::new();
//! let transporter = Transporter::with_factory(
//!     MailerConfig::console("noreply@example.com"),
//!     Arc::new(factory.clone()),
//! )?;
//! let renderer = StaticRenderer::new().with_template("welcome", "<p>Hi Ana</p>");
//! let mailer = Mailer::with_transporter(transporter, Arc::new(renderer));
//!
//! mailer.send("welcome", &Locals::new()).await?;
//! assert_eq!(factory.sent()[0].message.text, "Hi Ana");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::MailerConfig;
use crate::email::{ComposedMessage, DeliveryReceipt, Locals, Transport, TransportFactory};
use crate::error::{RenderError, TransportError};
use crate::template::Renderer;

/// A message handed to a recording transport
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// `from` of the configuration that opened the transport
    pub transport: String,
    /// The message as the transport received it
    pub message: ComposedMessage,
}

#[derive(Debug, Default)]
struct Behaviour {
    message_id: Option<String>,
    send_delay: Option<Duration>,
    fail_open: HashSet<String>,
    fail_close: HashSet<String>,
    fail_send: Option<String>,
}

/// Opens [`RecordingTransport`]s that share one log
///
/// Cloning is cheap; clones share the log and behaviour.
#[derive(Debug, Clone, Default)]
pub struct RecordingFactory {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    opened: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<String>>>,
    behaviour: Arc<Mutex<Behaviour>>,
}

impl RecordingFactory {
    /// Create a factory whose transports always succeed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every receipt carries this message id instead of a generated one
    #[must_use]
    pub fn with_message_id(self, message_id: impl Into<String>) -> Self {
        self.behaviour.lock().message_id = Some(message_id.into());
        self
    }

    /// Sends wait this long before they are recorded
    #[must_use]
    pub fn with_send_delay(self, delay: Duration) -> Self {
        self.behaviour.lock().send_delay = Some(delay);
        self
    }

    /// Opening a configuration with this `from` fails
    #[must_use]
    pub fn fail_open_for(self, from: impl Into<String>) -> Self {
        self.behaviour.lock().fail_open.insert(from.into());
        self
    }

    /// Closing the transport opened for this `from` fails
    #[must_use]
    pub fn fail_close_for(self, from: impl Into<String>) -> Self {
        self.behaviour.lock().fail_close.insert(from.into());
        self
    }

    /// Every send fails with an SMTP error carrying `reason`
    #[must_use]
    pub fn fail_sends(self, reason: impl Into<String>) -> Self {
        self.behaviour.lock().fail_send = Some(reason.into());
        self
    }

    /// Messages sent so far, in completion order
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// `from` of every configuration opened so far
    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// `from` of every transport closed so far
    #[must_use]
    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().clone()
    }
}

impl TransportFactory for RecordingFactory {
    fn build(&self, config: &MailerConfig) -> Result<Arc<dyn Transport>, TransportError> {
        if self.behaviour.lock().fail_open.contains(&config.from) {
            return Err(TransportError::config(format!(
                "refusing to open transport for {}",
                config.from
            )));
        }

        self.opened.lock().push(config.from.clone());

        Ok(Arc::new(RecordingTransport {
            label: config.from.clone(),
            factory: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Transport that records instead of delivering
#[derive(Debug)]
pub struct RecordingTransport {
    label: String,
    factory: RecordingFactory,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: &ComposedMessage) -> Result<DeliveryReceipt, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let (delay, message_id, fail_send) = {
            let behaviour = self.factory.behaviour.lock();
            (
                behaviour.send_delay,
                behaviour.message_id.clone(),
                behaviour.fail_send.clone(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = fail_send {
            return Err(TransportError::smtp(reason));
        }

        self.factory.sent.lock().push(SentMessage {
            transport: self.label.clone(),
            message: message.clone(),
        });

        let message_id = message_id.unwrap_or_else(|| message.generate_message_id());
        Ok(DeliveryReceipt::new(message_id).accepted(message.recipients()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.factory.behaviour.lock().fail_close.contains(&self.label) {
            return Err(TransportError::Other(format!(
                "transport for {} is busy",
                self.label
            )));
        }

        self.closed.store(true, Ordering::Release);
        self.factory.closed.lock().push(self.label.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Renderer serving fixed HTML per template name
///
/// Unknown names fail with [`RenderError::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct StaticRenderer {
    templates: Arc<HashMap<String, String>>,
    calls: Arc<Mutex<Vec<(String, Locals)>>>,
    count: Arc<AtomicUsize>,
}

impl StaticRenderer {
    /// Create a renderer with no templates
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `name`
    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>, html: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.templates).insert(name.into(), html.into());
        self
    }

    /// Every call made so far with the locals it received
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Locals)> {
        self.calls.lock().clone()
    }

    /// Number of render calls
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn render(&self, template: &str, locals: &Locals) -> Result<String, RenderError> {
        self.count.fetch_add(1, Ordering::AcqRel);
        self.calls
            .lock()
            .push((template.to_string(), locals.clone()));

        self.templates
            .get(template)
            .cloned()
            .ok_or_else(|| RenderError::NotFound(template.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_transport_records_label() {
        let factory = RecordingFactory::new().with_message_id("abc123");
        let transport = factory
            .build(&MailerConfig::console("a@example.com"))
            .unwrap();

        let receipt = transport.send(&ComposedMessage::default()).await.unwrap();

        assert_eq!(receipt.message_id, "abc123");
        assert_eq!(factory.sent()[0].transport, "a@example.com");
        assert_eq!(factory.opened(), vec!["a@example.com"]);
    }

    #[tokio::test]
    async fn test_failures() {
        let factory = RecordingFactory::new()
            .fail_open_for("bad@example.com")
            .fail_close_for("busy@example.com");

        assert!(factory
            .build(&MailerConfig::console("bad@example.com"))
            .is_err());

        let busy = factory
            .build(&MailerConfig::console("busy@example.com"))
            .unwrap();
        assert!(busy.close().await.is_err());
        assert!(factory.closed().is_empty());
    }

    #[tokio::test]
    async fn test_static_renderer() {
        let renderer = StaticRenderer::new().with_template("welcome", "<p>Hi</p>");

        assert_eq!(
            renderer.render("welcome", &Locals::new()).await.unwrap(),
            "<p>Hi</p>"
        );
        assert!(matches!(
            renderer.render("missing", &Locals::new()).await,
            Err(RenderError::NotFound(_))
        ));
        assert_eq!(renderer.call_count(), 2);
    }
}
