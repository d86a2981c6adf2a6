//! Application and request bindings
//!
//! [`Mailer`] is the application-wide handle; [`RequestMailer`] is built for
//! every request by the middleware installed with [`extend`]. Both render
//! through their own renderer but share one [`Transporter`], so an
//! [`update`](Mailer::update) through either handle affects every later send.

use axum::Router;
use tracing::{info, warn};

use super::{
    ComposedMessage, Composer, DeliveryReceipt, Locals, SendRequest, TextOptions, Transporter,
};
use crate::config::MailerConfig;
use crate::error::MailerError;
use crate::middleware::attach_request_mailer;
use crate::state::ActonMailerState;
use crate::template::{ResponseRenderer, SharedRenderer, ViewLocals};

/// Application-wide mail handle
///
/// Renders with the application's renderer. Cloning is cheap and clones
/// share the transporter.
#[derive(Clone)]
pub struct Mailer {
    composer: Composer<SharedRenderer>,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("transporter", self.transporter())
            .field("text_options", self.composer.text_options())
            .finish_non_exhaustive()
    }
}

impl Mailer {
    /// Open the configured transport and bind it to `renderer`
    ///
    /// # Errors
    ///
    /// Returns `MailerError::TransportOpen` if the transport configuration is
    /// incomplete or invalid.
    pub fn new(config: MailerConfig, renderer: SharedRenderer) -> Result<Self, MailerError> {
        Ok(Self::with_transporter(Transporter::new(config)?, renderer))
    }

    /// Bind an existing transporter to `renderer`
    #[must_use]
    pub fn with_transporter(transporter: Transporter, renderer: SharedRenderer) -> Self {
        Self {
            composer: Composer::new(renderer, transporter),
        }
    }

    /// Set the default text derivation options
    #[must_use]
    pub fn with_text_options(mut self, text_options: TextOptions) -> Self {
        self.composer = self.composer.with_text_options(text_options);
        self
    }

    /// Render a template and send the result
    ///
    /// # Errors
    ///
    /// See [`Composer::send`].
    pub async fn send(
        &self,
        request: impl Into<SendRequest> + Send,
        locals: &Locals,
    ) -> Result<DeliveryReceipt, MailerError> {
        self.composer.send(request, locals).await
    }

    /// Same pipeline as [`send`](Self::send)
    ///
    /// # Errors
    ///
    /// See [`Composer::send`].
    pub async fn render(
        &self,
        request: impl Into<SendRequest> + Send,
        locals: &Locals,
    ) -> Result<DeliveryReceipt, MailerError> {
        self.composer.render(request, locals).await
    }

    /// Build the message a send would dispatch, without sending it
    ///
    /// # Errors
    ///
    /// See [`Composer::compose`].
    pub async fn compose(
        &self,
        request: impl Into<SendRequest> + Send,
        locals: &Locals,
    ) -> Result<ComposedMessage, MailerError> {
        self.composer.compose(request, locals).await
    }

    /// Replace the transport and default sender for every handle
    ///
    /// # Errors
    ///
    /// See [`Transporter::reconfigure`].
    pub async fn update(&self, config: MailerConfig) -> Result<(), MailerError> {
        self.composer.transporter().reconfigure(config).await
    }

    /// Shared transporter
    #[must_use]
    pub const fn transporter(&self) -> &Transporter {
        self.composer.transporter()
    }

    /// Application renderer
    #[must_use]
    pub const fn renderer(&self) -> &SharedRenderer {
        self.composer.renderer()
    }

    /// Build the handle for one request
    #[must_use]
    pub fn for_request(&self, view_locals: ViewLocals) -> RequestMailer {
        let renderer = ResponseRenderer::new(self.renderer().clone(), view_locals);
        let composer = Composer::new(renderer, self.transporter().clone())
            .with_text_options(self.composer.text_options().clone());

        RequestMailer { composer }
    }
}

/// Request-scoped mail handle
///
/// Renders with the request's [`ViewLocals`] layered under the call's
/// locals. Field merging only ever looks at the call's locals.
#[derive(Debug, Clone)]
pub struct RequestMailer {
    composer: Composer<ResponseRenderer>,
}

impl RequestMailer {
    /// Render a template and send the result
    ///
    /// # Errors
    ///
    /// See [`Composer::send`].
    pub async fn send(
        &self,
        request: impl Into<SendRequest> + Send,
        locals: &Locals,
    ) -> Result<DeliveryReceipt, MailerError> {
        self.composer.send(request, locals).await
    }

    /// Same pipeline as [`send`](Self::send)
    ///
    /// # Errors
    ///
    /// See [`Composer::send`].
    pub async fn render(
        &self,
        request: impl Into<SendRequest> + Send,
        locals: &Locals,
    ) -> Result<DeliveryReceipt, MailerError> {
        self.composer.render(request, locals).await
    }

    /// Build the message a send would dispatch, without sending it
    ///
    /// # Errors
    ///
    /// See [`Composer::compose`].
    pub async fn compose(
        &self,
        request: impl Into<SendRequest> + Send,
        locals: &Locals,
    ) -> Result<ComposedMessage, MailerError> {
        self.composer.compose(request, locals).await
    }

    /// Replace the transport and default sender for every handle
    ///
    /// # Errors
    ///
    /// See [`Transporter::reconfigure`].
    pub async fn update(&self, config: MailerConfig) -> Result<(), MailerError> {
        self.composer.transporter().reconfigure(config).await
    }

    /// The request's view locals
    #[must_use]
    pub const fn view_locals(&self) -> &ViewLocals {
        self.composer.renderer().view_locals()
    }
}

/// Attach `mailer` to the application and install the request binding
///
/// The mailer becomes reachable through [`ActonMailerState::mailer`], and
/// every request routed through the returned router gets a
/// [`RequestMailer`] extension.
///
/// # Errors
///
/// Returns `MailerError::AlreadyExtended` if `state` already has a mailer.
/// The mailer attached first stays in place. The rejected mailer's transport
/// is closed unless it is the one already attached.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use acton_mailer::config::MailerConfig;
/// use acton_mailer::email::{extend, Mailer};
/// use acton_mailer::state::ActonMailerState;
/// use acton_mailer::template::MiniJinjaRenderer;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let state = ActonMailerState::new()?;
/// let mailer = Mailer::new(
///     MailerConfig::console("noreply@example.com"),
///     Arc::new(MiniJinjaRenderer::new()),
/// )?;
///
/// let _app: axum::Router = extend(axum::Router::new(), &state, mailer.clone()).await?;
/// assert!(extend(axum::Router::<()>::new(), &state, mailer).await.is_err());
/// # Ok(())
/// # }
/// ```
pub async fn extend<S>(
    router: Router<S>,
    state: &ActonMailerState,
    mailer: Mailer,
) -> Result<Router<S>, MailerError>
where
    S: Clone + Send + Sync + 'static,
{
    if let Err(err) = state.attach_mailer(mailer.clone()) {
        release_rejected(state, &mailer).await;
        return Err(err);
    }

    info!("Application extended with mailer");

    Ok(router.layer(axum::middleware::from_fn_with_state(
        mailer,
        attach_request_mailer,
    )))
}

async fn release_rejected(state: &ActonMailerState, rejected: &Mailer) {
    let attached = state
        .mailer()
        .is_some_and(|mailer| mailer.transporter().shares_transport(rejected.transporter()));
    if attached {
        return;
    }

    if let Err(e) = rejected.transporter().close().await {
        warn!(error = %e, "Failed to close transport of rejected mailer");
    }
}
