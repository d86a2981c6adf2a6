//! Mail transport abstraction
//!
//! A [`Transport`] accepts a fully composed message and hands it to a
//! delivery backend. Transports are opened from a [`MailerConfig`] by a
//! [`TransportFactory`] and closed once when they are replaced.

mod console;
mod smtp;

pub use console::ConsoleTransport;
pub use smtp::SmtpTransport;

use async_trait::async_trait;
use std::sync::Arc;

use super::{ComposedMessage, DeliveryReceipt};
use crate::config::{MailerConfig, TransportOptions};
use crate::error::TransportError;

/// Trait for mail delivery backends
///
/// # Examples
///
/// ```rust
/// use acton_mailer::email::{ComposedMessage, ConsoleTransport, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = ConsoleTransport::new();
///
/// let message = ComposedMessage {
///     from: "noreply@example.com".to_string(),
///     to: vec!["ana@example.com".to_string()],
///     html: "<p>Hi Ana</p>".to_string(),
///     text: "Hi Ana".to_string(),
///     ..ComposedMessage::default()
/// };
///
/// let receipt = transport.send(&message).await?;
/// assert!(!receipt.message_id.is_empty());
/// # Ok(())
/// # }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the backend rejects or cannot accept the message
    async fn send(&self, message: &ComposedMessage) -> Result<DeliveryReceipt, TransportError>;

    /// Release the backend's connections
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the backend could not be shut down cleanly
    async fn close(&self) -> Result<(), TransportError>;

    /// Short backend name used in logs
    fn name(&self) -> &'static str;
}

/// Opens transports from configuration
#[cfg_attr(test, mockall::automock)]
pub trait TransportFactory: Send + Sync {
    /// Build a transport for `config`
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the configuration is incomplete or invalid
    fn build(&self, config: &MailerConfig) -> Result<Arc<dyn Transport>, TransportError>;
}

/// Builds SMTP and console transports from [`TransportOptions`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn build(&self, config: &MailerConfig) -> Result<Arc<dyn Transport>, TransportError> {
        if config.from.trim().is_empty() {
            return Err(TransportError::config("default sender (`from`) is required"));
        }

        match &config.transport {
            TransportOptions::Smtp(options) => {
                Ok(Arc::new(SmtpTransport::new(options, &config.from)?))
            }
            TransportOptions::Console(options) => {
                Ok(Arc::new(ConsoleTransport::with_options(options)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpOptions;

    #[test]
    fn test_default_factory_builds_console() {
        let transport = DefaultTransportFactory
            .build(&MailerConfig::console("noreply@example.com"))
            .unwrap();
        assert_eq!(transport.name(), "console");
    }

    #[tokio::test]
    async fn test_default_factory_builds_smtp() {
        let config = MailerConfig::smtp(
            "App <noreply@example.com>",
            SmtpOptions::new("smtp.example.com"),
        );
        let transport = DefaultTransportFactory.build(&config).unwrap();
        assert_eq!(transport.name(), "smtp");
    }

    #[test]
    fn test_default_factory_rejects_missing_from() {
        let result = DefaultTransportFactory.build(&MailerConfig::console("  "));
        assert!(matches!(result, Err(TransportError::Config(_))));
    }

    #[test]
    fn test_default_factory_rejects_missing_host() {
        let config = MailerConfig::smtp("noreply@example.com", SmtpOptions::default());
        assert!(matches!(
            DefaultTransportFactory.build(&config),
            Err(TransportError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_transport() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(DeliveryReceipt::new("<abc123@example.com>")));

        let receipt = transport.send(&ComposedMessage::default()).await.unwrap();
        assert_eq!(receipt.message_id, "<abc123@example.com>");
    }
}
