//! Shared handle to the active mail transport
//!
//! Sends hold a read lock on the active transport for as long as the backend
//! is working on the message. [`Transporter::reconfigure`] takes the write
//! lock, so it waits for in-flight sends to finish and sends that start
//! during a swap wait for it. A send therefore always runs entirely against
//! one transport, and once `reconfigure` returns every later send uses the
//! new one.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::transport::{DefaultTransportFactory, Transport, TransportFactory};
use super::{ComposedMessage, DeliveryReceipt};
use crate::config::MailerConfig;
use crate::error::MailerError;

struct Active {
    config: MailerConfig,
    transport: Arc<dyn Transport>,
}

/// Owns one live transport configuration at a time
///
/// Cloning is cheap; clones share the same active transport.
#[derive(Clone)]
pub struct Transporter {
    factory: Arc<dyn TransportFactory>,
    active: Arc<RwLock<Active>>,
}

impl std::fmt::Debug for Transporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transporter").finish_non_exhaustive()
    }
}

impl Transporter {
    /// Open the transport described by `config`
    ///
    /// # Errors
    ///
    /// Returns `MailerError::TransportOpen` if the configuration is incomplete
    /// or invalid.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use acton_mailer::config::MailerConfig;
    /// use acton_mailer::email::Transporter;
    ///
    /// # async fn example() -> Result<(), acton_mailer::error::MailerError> {
    /// let transporter = Transporter::new(MailerConfig::console("noreply@example.com"))?;
    /// assert_eq!(transporter.default_from().await, "noreply@example.com");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: MailerConfig) -> Result<Self, MailerError> {
        Self::with_factory(config, Arc::new(DefaultTransportFactory))
    }

    /// Open transports through a custom factory
    ///
    /// # Errors
    ///
    /// Returns `MailerError::TransportOpen` if the factory cannot build a
    /// transport for `config`.
    pub fn with_factory(
        config: MailerConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<Self, MailerError> {
        let transport = factory.build(&config).map_err(MailerError::TransportOpen)?;

        debug!(
            transport = transport.name(),
            from = %config.from,
            "Mail transport opened"
        );

        Ok(Self {
            factory,
            active: Arc::new(RwLock::new(Active { config, transport })),
        })
    }

    /// Send a composed message through the active transport
    ///
    /// # Errors
    ///
    /// Returns `MailerError::Delivery` with the backend's error unchanged.
    pub async fn send(&self, message: &ComposedMessage) -> Result<DeliveryReceipt, MailerError> {
        self.dispatch(|_| Ok(message.clone())).await
    }

    /// Compose against the active default sender and send, as one step
    ///
    /// `compose` receives the active transport's default `From`. The
    /// transport cannot be swapped between composing and sending.
    ///
    /// # Errors
    ///
    /// Returns the error from `compose` unchanged (nothing is sent), or
    /// `MailerError::Delivery` if the backend fails.
    pub async fn dispatch<F>(&self, compose: F) -> Result<DeliveryReceipt, MailerError>
    where
        F: FnOnce(&str) -> Result<ComposedMessage, MailerError> + Send,
    {
        let active = self.active.read().await;
        let message = compose(&active.config.from)?;

        let receipt = active
            .transport
            .send(&message)
            .await
            .map_err(MailerError::Delivery)?;

        info!(
            message_id = %receipt.message_id,
            transport = active.transport.name(),
            "Message sent"
        );

        Ok(receipt)
    }

    /// Default sender of the active configuration
    pub async fn default_from(&self) -> String {
        self.active.read().await.config.from.clone()
    }

    /// Snapshot of the active configuration
    pub async fn config(&self) -> MailerConfig {
        self.active.read().await.config.clone()
    }

    /// Close the active transport
    ///
    /// Later sends through this handle fail with a delivery error.
    ///
    /// # Errors
    ///
    /// Returns `MailerError::TransportClose` if the backend fails to close.
    pub async fn close(&self) -> Result<(), MailerError> {
        let active = self.active.write().await;
        active
            .transport
            .close()
            .await
            .map_err(MailerError::TransportClose)?;

        debug!(transport = active.transport.name(), "Mail transport closed");
        Ok(())
    }

    /// Whether both handles drive the same active transport
    #[must_use]
    pub fn shares_transport(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.active, &other.active)
    }

    /// Replace the active transport
    ///
    /// The new transport is opened first, then the old one is closed, then the
    /// new transport and its default sender become active. If either step
    /// fails nothing is swapped and the old transport stays active.
    ///
    /// # Errors
    ///
    /// Returns `MailerError::TransportOpen` if `config` cannot be opened (the
    /// old transport is left open), or `MailerError::TransportClose` if the
    /// old transport failed to close.
    pub async fn reconfigure(&self, config: MailerConfig) -> Result<(), MailerError> {
        let mut active = self.active.write().await;

        let next = self.factory.build(&config).map_err(MailerError::TransportOpen)?;

        active
            .transport
            .close()
            .await
            .map_err(MailerError::TransportClose)?;

        info!(
            previous = active.transport.name(),
            transport = next.name(),
            from = %config.from,
            "Mail transport reconfigured"
        );

        *active = Active {
            config,
            transport: next,
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::transport::{MockTransport, MockTransportFactory};
    use crate::error::TransportError;

    fn echo_transport(id: &'static str) -> MockTransport {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(move |_| Ok(DeliveryReceipt::new(id)));
        transport.expect_close().returning(|| Ok(()));
        transport.expect_name().return_const("mock");
        transport
    }

    fn factory_of(transports: Vec<MockTransport>) -> Arc<dyn TransportFactory> {
        let mut queue = transports.into_iter();
        let mut factory = MockTransportFactory::new();
        factory.expect_build().returning(move |_| {
            queue
                .next()
                .map(|t| Arc::new(t) as Arc<dyn Transport>)
                .ok_or_else(|| TransportError::config("no more transports"))
        });
        Arc::new(factory)
    }

    #[tokio::test]
    async fn test_send_uses_active_transport() {
        let transporter = Transporter::with_factory(
            MailerConfig::console("a@example.com"),
            factory_of(vec![echo_transport("first")]),
        )
        .unwrap();

        let receipt = transporter.send(&ComposedMessage::default()).await.unwrap();
        assert_eq!(receipt.message_id, "first");
    }

    #[tokio::test]
    async fn test_reconfigure_swaps_transport_and_from() {
        let transporter = Transporter::with_factory(
            MailerConfig::console("a@example.com"),
            factory_of(vec![echo_transport("first"), echo_transport("second")]),
        )
        .unwrap();

        transporter
            .reconfigure(MailerConfig::console("b@example.com"))
            .await
            .unwrap();

        assert_eq!(transporter.default_from().await, "b@example.com");
        let receipt = transporter.send(&ComposedMessage::default()).await.unwrap();
        assert_eq!(receipt.message_id, "second");
    }

    #[tokio::test]
    async fn test_close_failure_keeps_prior_transport() {
        let mut first = MockTransport::new();
        first
            .expect_send()
            .returning(|_| Ok(DeliveryReceipt::new("first")));
        first
            .expect_close()
            .times(1)
            .returning(|| Err(TransportError::Other("busy".to_string())));
        first.expect_name().return_const("mock");

        let transporter = Transporter::with_factory(
            MailerConfig::console("a@example.com"),
            factory_of(vec![first, echo_transport("second")]),
        )
        .unwrap();

        let err = transporter
            .reconfigure(MailerConfig::console("b@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, MailerError::TransportClose(_)));
        assert_eq!(transporter.default_from().await, "a@example.com");
        let receipt = transporter.send(&ComposedMessage::default()).await.unwrap();
        assert_eq!(receipt.message_id, "first");
    }

    #[tokio::test]
    async fn test_open_failure_leaves_prior_transport_open() {
        let mut first = MockTransport::new();
        first
            .expect_send()
            .returning(|_| Ok(DeliveryReceipt::new("first")));
        first.expect_close().never();
        first.expect_name().return_const("mock");

        let transporter = Transporter::with_factory(
            MailerConfig::console("a@example.com"),
            factory_of(vec![first]),
        )
        .unwrap();

        let err = transporter
            .reconfigure(MailerConfig::console("b@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, MailerError::TransportOpen(_)));
        let receipt = transporter.send(&ComposedMessage::default()).await.unwrap();
        assert_eq!(receipt.message_id, "first");
    }

    #[tokio::test]
    async fn test_delivery_error_is_forwarded() {
        let mut failing = MockTransport::new();
        failing
            .expect_send()
            .returning(|_| Err(TransportError::smtp("550 mailbox unavailable")));
        failing.expect_name().return_const("mock");

        let transporter = Transporter::with_factory(
            MailerConfig::console("a@example.com"),
            factory_of(vec![failing]),
        )
        .unwrap();

        let err = transporter
            .send(&ComposedMessage::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "SMTP error: 550 mailbox unavailable");
    }

    #[tokio::test]
    async fn test_close_closes_active_transport() {
        let mut transport = MockTransport::new();
        transport.expect_close().times(1).returning(|| Ok(()));
        transport.expect_name().return_const("mock");

        let transporter = Transporter::with_factory(
            MailerConfig::console("a@example.com"),
            factory_of(vec![transport]),
        )
        .unwrap();

        transporter.close().await.unwrap();
        assert!(transporter.shares_transport(&transporter.clone()));
    }

    #[tokio::test]
    async fn test_compose_error_skips_send() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        transport.expect_name().return_const("mock");

        let transporter = Transporter::with_factory(
            MailerConfig::console("a@example.com"),
            factory_of(vec![transport]),
        )
        .unwrap();

        let err = transporter
            .dispatch(|_| Err(MailerError::MissingTemplate))
            .await
            .unwrap_err();
        assert!(matches!(err, MailerError::MissingTemplate));
    }
}
