//! Axum extractors for acton-mailer
//!
//! - [`RequestMailer`] comes from the extension installed by
//!   [`attach_request_mailer`](crate::middleware::attach_request_mailer).
//! - [`AppMailer`] reads the application mailer out of [`ActonMailerState`].
//! - [`ViewLocals`] gives handlers the request's template variables.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};

use crate::email::{Mailer, RequestMailer};
use crate::state::ActonMailerState;
use crate::template::ViewLocals;

/// Rejection for mailer extractors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailerRejection {
    /// The request did not pass through the mailer middleware
    MiddlewareMissing,
    /// The application state has no mailer attached
    NotExtended,
}

impl IntoResponse for MailerRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::MiddlewareMissing => "Mailer middleware is not installed",
            Self::NotExtended => "Application has not been extended with a mailer",
        };
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

impl<S> FromRequestParts<S> for RequestMailer
where
    S: Send + Sync,
{
    type Rejection = MailerRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(MailerRejection::MiddlewareMissing)
    }
}

/// The application-wide mailer
///
/// # Example
///
/// ```rust,no_run
/// use acton_mailer::email::Locals;
/// use acton_mailer::extractors::AppMailer;
///
/// async fn notify(AppMailer(mailer): AppMailer) -> Result<&'static str, acton_mailer::error::MailerError> {
///     mailer
///         .send("notice", &Locals::new().with("to", "ops@example.com"))
///         .await?;
///     Ok("sent")
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AppMailer(pub Mailer);

impl<S> FromRequestParts<S> for AppMailer
where
    S: Send + Sync,
    ActonMailerState: FromRef<S>,
{
    type Rejection = MailerRejection;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        ActonMailerState::from_ref(state)
            .mailer()
            .cloned()
            .map(Self)
            .ok_or(MailerRejection::NotExtended)
    }
}

impl<S> FromRequestParts<S> for ViewLocals
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }

        let created = Self::new();
        parts.extensions.insert(created.clone());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailerConfig;
    use crate::email::extend;
    use crate::template::MiniJinjaRenderer;
    use axum::{body::Body, http::Request, routing::get, Router};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn mailer() -> Mailer {
        Mailer::new(
            MailerConfig::console("noreply@example.com"),
            Arc::new(MiniJinjaRenderer::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_request_mailer_without_middleware() {
        let app: Router = Router::new().route("/", get(|_mailer: RequestMailer| async { "ok" }));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_app_mailer_from_state() {
        let state = ActonMailerState::new().unwrap();
        let router = Router::new().route("/", get(|AppMailer(_): AppMailer| async { "ok" }));
        let app = extend(router, &state, mailer()).await.unwrap().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_app_mailer_not_extended() {
        let state = ActonMailerState::new().unwrap();
        let app = Router::new()
            .route("/", get(|AppMailer(_): AppMailer| async { "ok" }))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_view_locals_shared_with_request_mailer() {
        let state = ActonMailerState::new().unwrap();
        let router = Router::new().route(
            "/",
            get(|locals: ViewLocals, mailer: RequestMailer| async move {
                locals.insert("title", "Shared");
                mailer
                    .view_locals()
                    .snapshot()
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            }),
        );
        let app = extend(router, &state, mailer()).await.unwrap().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"Shared");
    }
}
