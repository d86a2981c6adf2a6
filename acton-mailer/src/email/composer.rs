//! Template-to-message pipeline
//!
//! A [`Composer`] renders the requested template, derives the plain-text
//! body, merges explicit options and locals into the final message and hands
//! it to the [`Transporter`].

use tracing::debug;

use super::{
    extract_text, merge, ComposedMessage, DeliveryReceipt, Locals, SendOptions, SendRequest,
    TextOptions, Transporter,
};
use crate::error::MailerError;
use crate::template::Renderer;

/// Renders and sends messages through a shared transporter
#[derive(Debug, Clone)]
pub struct Composer<R> {
    renderer: R,
    transporter: Transporter,
    text_options: TextOptions,
}

impl<R: Renderer> Composer<R> {
    /// Create a composer
    #[must_use]
    pub fn new(renderer: R, transporter: Transporter) -> Self {
        Self {
            renderer,
            transporter,
            text_options: TextOptions::default(),
        }
    }

    /// Set the text derivation options used when a send does not supply its own
    #[must_use]
    pub fn with_text_options(mut self, text_options: TextOptions) -> Self {
        self.text_options = text_options;
        self
    }

    /// Render and merge without sending
    ///
    /// The default sender is taken from the transporter's configuration at
    /// the time of the call.
    ///
    /// # Errors
    ///
    /// Returns `MailerError::MissingTemplate`, `MailerError::Render` or
    /// `MailerError::InvalidField`.
    pub async fn compose(
        &self,
        request: impl Into<SendRequest> + Send,
        locals: &Locals,
    ) -> Result<ComposedMessage, MailerError> {
        let options = self.prepare(request.into(), locals).await?;
        let default_from = self.transporter.default_from().await;
        merge(&options, locals, &default_from)
    }

    /// Render, merge and send
    ///
    /// Nothing is sent unless rendering and merging both succeed.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the pipeline unchanged: a missing
    /// template name, a render error, an invalid field, or the transport's
    /// delivery error.
    pub async fn send(
        &self,
        request: impl Into<SendRequest> + Send,
        locals: &Locals,
    ) -> Result<DeliveryReceipt, MailerError> {
        let options = self.prepare(request.into(), locals).await?;
        self.transporter
            .dispatch(|default_from| merge(&options, locals, default_from))
            .await
    }

    /// Same pipeline as [`send`](Self::send)
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn render(
        &self,
        request: impl Into<SendRequest> + Send,
        locals: &Locals,
    ) -> Result<DeliveryReceipt, MailerError> {
        self.send(request, locals).await
    }

    /// Renderer used for templates
    #[must_use]
    pub const fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Shared transporter
    #[must_use]
    pub const fn transporter(&self) -> &Transporter {
        &self.transporter
    }

    /// Default text derivation options
    #[must_use]
    pub const fn text_options(&self) -> &TextOptions {
        &self.text_options
    }

    /// Render the template and fill in `html` and `text`
    async fn prepare(
        &self,
        request: SendRequest,
        locals: &Locals,
    ) -> Result<SendOptions, MailerError> {
        let mut options = request.into_options();
        let template = options
            .template
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or(MailerError::MissingTemplate)?;

        debug!(template = %template, "Rendering email template");

        let html = self
            .renderer
            .render(&template, locals)
            .await
            .map_err(MailerError::Render)?;

        if options.text.as_deref().is_none_or(|text| text.trim().is_empty()) {
            let text_options = options.text_options.as_ref().unwrap_or(&self.text_options);
            options.text = Some(extract_text(&html, text_options));
        }
        options.html = Some(html);

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailerConfig;
    use crate::email::transport::{MockTransport, MockTransportFactory, Transport};
    use crate::error::RenderError;
    use crate::template::MockRenderer;
    use std::sync::{Arc, Mutex};

    fn transporter(sent: Arc<Mutex<Vec<ComposedMessage>>>, sends: usize) -> Transporter {
        let mut factory = MockTransportFactory::new();
        factory.expect_build().returning(move |_| {
            let sent = Arc::clone(&sent);
            let mut transport = MockTransport::new();
            transport.expect_send().times(sends).returning(move |message| {
                sent.lock().unwrap().push(message.clone());
                Ok(DeliveryReceipt::new("abc123"))
            });
            transport.expect_name().return_const("mock");
            Ok(Arc::new(transport) as Arc<dyn Transport>)
        });

        Transporter::with_factory(MailerConfig::console("noreply@example.com"), Arc::new(factory))
            .unwrap()
    }

    fn renderer(html: &'static str) -> MockRenderer {
        let mut renderer = MockRenderer::new();
        renderer
            .expect_render()
            .returning(move |_, _| Ok(html.to_string()));
        renderer
    }

    #[tokio::test]
    async fn test_send_welcome() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let composer = Composer::new(renderer("<p>Hi Ana</p>"), transporter(Arc::clone(&sent), 1));

        let receipt = composer
            .send("welcome", &Locals::new().with("name", "Ana"))
            .await
            .unwrap();

        assert_eq!(receipt.message_id, "abc123");
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].html, "<p>Hi Ana</p>");
        assert_eq!(sent[0].text, "Hi Ana");
        assert_eq!(sent[0].from, "noreply@example.com");
    }

    #[tokio::test]
    async fn test_render_error_skips_transport() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut failing = MockRenderer::new();
        failing
            .expect_render()
            .returning(|name, _| Err(RenderError::NotFound(name.to_string())));

        let composer = Composer::new(failing, transporter(Arc::clone(&sent), 0));
        let err = composer.send("missing", &Locals::new()).await.unwrap_err();

        assert!(matches!(err, MailerError::Render(RenderError::NotFound(_))));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_template_name() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut renderer = MockRenderer::new();
        renderer.expect_render().never();

        let composer = Composer::new(renderer, transporter(sent, 0));
        let err = composer
            .send(SendOptions::default().to("ana@example.com"), &Locals::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MailerError::MissingTemplate));
    }

    #[tokio::test]
    async fn test_explicit_text_is_kept() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let composer = Composer::new(renderer("<p>Rendered</p>"), transporter(Arc::clone(&sent), 1));

        composer
            .send(
                SendOptions::template("welcome").text("Custom body"),
                &Locals::new().with("text", "Ignored"),
            )
            .await
            .unwrap();

        assert_eq!(sent.lock().unwrap()[0].text, "Custom body");
    }

    #[tokio::test]
    async fn test_html_local_never_replaces_rendered_body() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let composer = Composer::new(renderer("<p>Rendered</p>"), transporter(Arc::clone(&sent), 1));

        composer
            .send("welcome", &Locals::new().with("html", "<p>Injected</p>"))
            .await
            .unwrap();

        assert_eq!(sent.lock().unwrap()[0].html, "<p>Rendered</p>");
    }

    #[tokio::test]
    async fn test_explicit_html_is_overwritten_by_render() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let composer = Composer::new(renderer("<p>Rendered</p>"), transporter(Arc::clone(&sent), 1));

        let mut options = SendOptions::template("welcome");
        options.html = Some("<p>Preset</p>".to_string());
        composer.send(options, &Locals::new()).await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].html, "<p>Rendered</p>");
        assert_eq!(sent[0].text, "Rendered");
    }

    #[tokio::test]
    async fn test_per_send_text_options() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let composer = Composer::new(
            renderer("<h1>Welcome</h1><p>one two three four</p>"),
            transporter(Arc::clone(&sent), 1),
        )
        .with_text_options(TextOptions::default().with_wordwrap(80));

        composer
            .send(
                SendOptions::template("welcome").text_options(TextOptions {
                    uppercase_headings: false,
                    ..TextOptions::default().with_wordwrap(8)
                }),
                &Locals::new(),
            )
            .await
            .unwrap();

        let text = sent.lock().unwrap()[0].text.clone();
        assert!(text.starts_with("Welcome"));
        assert!(text.lines().all(|line| line.chars().count() <= 8));
    }

    #[tokio::test]
    async fn test_compose_previews_without_sending() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let composer = Composer::new(renderer("<p>Preview</p>"), transporter(Arc::clone(&sent), 0));

        let message = composer
            .compose("welcome", &Locals::new().with("to", "ana@example.com"))
            .await
            .unwrap();

        assert_eq!(message.to, vec!["ana@example.com"]);
        assert_eq!(message.text, "Preview");
        assert!(sent.lock().unwrap().is_empty());
    }
}
