//! Integration tests for the axum binding
//!
//! Drives `extend`, the request middleware and the extractors through a
//! router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use acton_mailer::config::MailerConfig;
use acton_mailer::email::{extend, Locals, Mailer, RequestMailer, Transporter};
use acton_mailer::error::MailerError;
use acton_mailer::extractors::AppMailer;
use acton_mailer::state::ActonMailerState;
use acton_mailer::template::{MiniJinjaRenderer, ViewLocals};
use acton_mailer::testing::RecordingFactory;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::post,
    Router,
};
use tower::ServiceExt;

const DEFAULT_FROM: &str = "noreply@example.com";

fn mailer(factory: &RecordingFactory) -> Mailer {
    let renderer = MiniJinjaRenderer::new();
    renderer
        .add_template("email", "<h1>{{ title }}</h1><p>Hello {{ name }}</p>")
        .unwrap();
    renderer.add_global("title", "Default title");

    let transporter = Transporter::with_factory(
        MailerConfig::console(DEFAULT_FROM),
        Arc::new(factory.clone()),
    )
    .unwrap();
    Mailer::with_transporter(transporter, Arc::new(renderer))
}

async fn send_via_app(AppMailer(mailer): AppMailer) -> Result<StatusCode, MailerError> {
    mailer
        .send(
            "email",
            &Locals::new()
                .with("to", "ana@example.com")
                .with("subject", "Test Email")
                .with("name", "Ana"),
        )
        .await?;
    Ok(StatusCode::SEE_OTHER)
}

async fn send_via_request(
    view_locals: ViewLocals,
    mailer: RequestMailer,
) -> Result<StatusCode, MailerError> {
    view_locals.insert("title", "Request title");
    mailer
        .send(
            "email",
            &Locals::new()
                .with("to", "bo@example.com")
                .with("subject", "Test Email")
                .with("name", "Bo"),
        )
        .await?;
    Ok(StatusCode::SEE_OTHER)
}

async fn send_missing(mailer: RequestMailer) -> Result<StatusCode, MailerError> {
    mailer.send("missing", &Locals::new()).await?;
    Ok(StatusCode::OK)
}

async fn app(factory: &RecordingFactory) -> Router {
    let state = ActonMailerState::new().unwrap();
    let router = Router::new()
        .route("/send-mail-via-app", post(send_via_app))
        .route("/send-mail-via-res", post(send_via_request))
        .route("/send-missing", post(send_missing));

    extend(router, &state, mailer(factory))
        .await
        .unwrap()
        .with_state(state)
}

fn post_to(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_send_via_app_handle() {
    let factory = RecordingFactory::new();

    let response = app(&factory)
        .await
        .oneshot(post_to("/send-mail-via-app"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let message = &factory.sent()[0].message;
    assert_eq!(message.html, "<h1>Default title</h1><p>Hello Ana</p>");
    assert_eq!(message.from, DEFAULT_FROM);
    assert_eq!(message.to, vec!["ana@example.com"]);
}

#[tokio::test]
async fn test_send_via_request_handle_sees_view_locals() {
    let factory = RecordingFactory::new();

    let response = app(&factory)
        .await
        .oneshot(post_to("/send-mail-via-res"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let message = &factory.sent()[0].message;
    assert_eq!(message.html, "<h1>Request title</h1><p>Hello Bo</p>");
    assert_eq!(message.text, "REQUEST TITLE\n\nHello Bo");
}

#[tokio::test]
async fn test_render_error_becomes_500() {
    let factory = RecordingFactory::new();

    let response = app(&factory)
        .await
        .oneshot(post_to("/send-missing"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(factory.sent().is_empty());
}

#[tokio::test]
async fn test_extend_twice_fails_and_keeps_first_mailer() {
    let state = ActonMailerState::new().unwrap();
    let first = RecordingFactory::new();
    let second = RecordingFactory::new();

    let router: Router<ActonMailerState> = extend(Router::new(), &state, mailer(&first))
        .await
        .unwrap();
    let err = extend(router, &state, mailer(&second)).await.unwrap_err();

    assert!(matches!(err, MailerError::AlreadyExtended));
    assert_eq!(second.closed(), vec![DEFAULT_FROM]);
    assert!(first.closed().is_empty());

    state
        .mailer()
        .unwrap()
        .send("email", &Locals::new().with("name", "Ana"))
        .await
        .unwrap();
    assert_eq!(first.sent().len(), 1);
    assert!(second.sent().is_empty());
}

#[tokio::test]
async fn test_extend_twice_with_same_mailer_keeps_transport_open() {
    let state = ActonMailerState::new().unwrap();
    let factory = RecordingFactory::new();
    let mailer = mailer(&factory);

    let router: Router<ActonMailerState> = extend(Router::new(), &state, mailer.clone())
        .await
        .unwrap();
    let err = extend(router, &state, mailer.clone()).await.unwrap_err();

    assert!(matches!(err, MailerError::AlreadyExtended));
    assert!(factory.closed().is_empty());
    mailer.send("email", &Locals::new().with("name", "Ana")).await.unwrap();
}
