//! Middleware layers for acton-mailer
//!
//! [`attach_request_mailer`] is installed by [`extend`](crate::email::extend).
//! It gives every request a [`RequestMailer`] bound to the request's
//! [`ViewLocals`], creating the view locals if an earlier layer has not.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::email::Mailer;
use crate::template::ViewLocals;

/// Insert a [`RequestMailer`](crate::email::RequestMailer) into the request extensions
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use acton_mailer::config::MailerConfig;
/// use acton_mailer::email::Mailer;
/// use acton_mailer::middleware::attach_request_mailer;
/// use acton_mailer::template::MiniJinjaRenderer;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mailer = Mailer::new(
///     MailerConfig::console("noreply@example.com"),
///     Arc::new(MiniJinjaRenderer::new()),
/// )?;
///
/// let _app: axum::Router = axum::Router::new()
///     .layer(axum::middleware::from_fn_with_state(mailer, attach_request_mailer));
/// # Ok(())
/// # }
/// ```
pub async fn attach_request_mailer(
    State(mailer): State<Mailer>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = request.extensions().get::<ViewLocals>().cloned();
    let view_locals = existing.unwrap_or_else(|| {
        let created = ViewLocals::new();
        request.extensions_mut().insert(created.clone());
        created
    });

    request
        .extensions_mut()
        .insert(mailer.for_request(view_locals));

    next.run(request).await
}
