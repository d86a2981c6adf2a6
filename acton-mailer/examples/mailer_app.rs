//! Demo application sending mail three ways
//!
//! - `POST /send-mail-via-app` uses the application-wide mailer
//! - `POST /send-mail-via-res` uses the per-request mailer, so the request's
//!   view locals reach the template
//! - `POST /send-mail-with-update` flips between two transport
//!   configurations before every send
//!
//! Both configurations use the console transport, so nothing leaves the
//! machine. Run with:
//! ```bash
//! cargo run --example mailer_app
//! curl -X POST -d 'email=ana@example.com' http://127.0.0.1:3000/send-mail-with-update
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use acton_mailer::prelude::*;
use acton_mailer::observability;
use axum::{
    extract::{Form, State},
    response::{Html, Redirect},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const EMAIL_TEMPLATE: &str = r#"<h1>{{ title }}</h1>
<p>This message was sent by {{ sent_by }}.</p>
<p>{{ app_name }} says hello.</p>"#;

#[derive(Clone)]
struct DemoState {
    mailer_state: ActonMailerState,
    use_update: Arc<AtomicBool>,
}

impl axum::extract::FromRef<DemoState> for ActonMailerState {
    fn from_ref(state: &DemoState) -> Self {
        state.mailer_state.clone()
    }
}

#[derive(Debug, Deserialize)]
struct SignupForm {
    email: Option<String>,
}

impl SignupForm {
    fn recipient(self) -> Option<String> {
        self.email.filter(|email| !email.trim().is_empty())
    }
}

fn primary_config() -> MailerConfig {
    MailerConfig::console("Demo App <noreply@example.com>")
}

fn update_config() -> MailerConfig {
    MailerConfig {
        from: "Demo App (updated) <updated@example.com>".to_string(),
        transport: TransportOptions::Console(ConsoleOptions { verbose: true }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init()?;

    let renderer = MiniJinjaRenderer::new();
    renderer.add_template("email", EMAIL_TEMPLATE)?;
    renderer.add_global("app_name", "acton-mailer demo");

    let mailer = Mailer::new(primary_config(), Arc::new(renderer))?;
    let mailer_state = ActonMailerState::new()?;

    let router = Router::new()
        .route("/", get(index))
        .route("/send-mail-via-app", post(send_via_app))
        .route("/send-mail-via-res", post(send_via_request))
        .route("/send-mail-with-update", post(send_with_update));

    let app = extend(router, &mailer_state, mailer)
        .await?
        .layer(TraceLayer::new_for_http())
        .with_state(DemoState {
            mailer_state,
            use_update: Arc::new(AtomicBool::new(false)),
        });

    info!("Starting mailer demo on http://127.0.0.1:3000");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(
        r#"<form method="post" action="/send-mail-via-app"><input name="email"><button>Via app</button></form>
<form method="post" action="/send-mail-via-res"><input name="email"><button>Via request</button></form>
<form method="post" action="/send-mail-with-update"><input name="email"><button>With update</button></form>"#,
    )
}

fn test_email(to: String, title: &str) -> Locals {
    Locals::new()
        .with("to", to)
        .with("subject", "Test Email")
        .with("title", title)
}

async fn send_via_app(
    AppMailer(mailer): AppMailer,
    Form(form): Form<SignupForm>,
) -> Result<Redirect, MailerError> {
    let Some(to) = form.recipient() else {
        return Ok(Redirect::to("/"));
    };

    let locals = test_email(to, "Send Mail Via App").with("sent_by", "the application mailer");
    mailer.send("email", &locals).await?;
    Ok(Redirect::to("/"))
}

async fn send_via_request(
    view_locals: ViewLocals,
    mailer: RequestMailer,
    Form(form): Form<SignupForm>,
) -> Result<Redirect, MailerError> {
    let Some(to) = form.recipient() else {
        return Ok(Redirect::to("/"));
    };

    view_locals.insert("sent_by", "the per-request mailer");
    mailer
        .send("email", &test_email(to, "Send Mail Via Response"))
        .await?;
    Ok(Redirect::to("/"))
}

async fn send_with_update(
    State(state): State<DemoState>,
    mailer: RequestMailer,
    Form(form): Form<SignupForm>,
) -> Result<Redirect, MailerError> {
    let Some(to) = form.recipient() else {
        return Ok(Redirect::to("/"));
    };

    let use_update = !state.use_update.fetch_xor(true, Ordering::AcqRel);
    let config = if use_update {
        update_config()
    } else {
        primary_config()
    };

    if let Err(e) = mailer.update(config).await {
        warn!(error = %e, "Keeping the previous transport");
        return Err(e);
    }

    let locals = test_email(to, "Send Mail With Update").with("sent_by", "an updated mailer");
    mailer.send("email", &locals).await?;
    Ok(Redirect::to("/"))
}
