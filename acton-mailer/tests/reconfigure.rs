//! Integration tests for transport reconfiguration
//!
//! Covers the swap itself, both failure modes, and how a swap interleaves
//! with sends that are already in flight.

use std::sync::Arc;
use std::time::Duration;

use acton_mailer::config::MailerConfig;
use acton_mailer::email::{Locals, Mailer, Transporter};
use acton_mailer::error::MailerError;
use acton_mailer::testing::{RecordingFactory, StaticRenderer};

const FIRST: &str = "first@example.com";
const SECOND: &str = "second@example.com";

fn mailer(factory: &RecordingFactory) -> Mailer {
    let transporter =
        Transporter::with_factory(MailerConfig::console(FIRST), Arc::new(factory.clone())).unwrap();
    let renderer = StaticRenderer::new().with_template("email", "<p>Hello</p>");
    Mailer::with_transporter(transporter, Arc::new(renderer))
}

#[tokio::test]
async fn test_update_switches_transport_and_default_from() {
    let factory = RecordingFactory::new();
    let mailer = mailer(&factory);

    mailer.send("email", &Locals::new()).await.unwrap();
    mailer.update(MailerConfig::console(SECOND)).await.unwrap();
    mailer.send("email", &Locals::new()).await.unwrap();

    let sent = factory.sent();
    assert_eq!(sent[0].transport, FIRST);
    assert_eq!(sent[1].transport, SECOND);
    assert_eq!(sent[1].message.from, SECOND);
    assert_eq!(factory.closed(), vec![FIRST]);
}

#[tokio::test]
async fn test_close_failure_keeps_prior_transport() {
    let factory = RecordingFactory::new().fail_close_for(FIRST);
    let mailer = mailer(&factory);

    let err = mailer
        .update(MailerConfig::console(SECOND))
        .await
        .unwrap_err();
    assert!(matches!(err, MailerError::TransportClose(_)));

    mailer.send("email", &Locals::new()).await.unwrap();

    let sent = factory.sent();
    assert_eq!(sent[0].transport, FIRST);
    assert_eq!(sent[0].message.from, FIRST);
    assert!(factory.closed().is_empty());
}

#[tokio::test]
async fn test_open_failure_keeps_prior_transport_open() {
    let factory = RecordingFactory::new().fail_open_for(SECOND);
    let mailer = mailer(&factory);

    let err = mailer
        .update(MailerConfig::console(SECOND))
        .await
        .unwrap_err();
    assert!(matches!(err, MailerError::TransportOpen(_)));
    assert!(factory.closed().is_empty());

    mailer.send("email", &Locals::new()).await.unwrap();
    assert_eq!(factory.sent()[0].transport, FIRST);
}

#[tokio::test]
async fn test_request_and_app_handles_share_the_transport() {
    let factory = RecordingFactory::new();
    let mailer = mailer(&factory);
    let request_mailer = mailer.for_request(acton_mailer::template::ViewLocals::new());

    request_mailer
        .update(MailerConfig::console(SECOND))
        .await
        .unwrap();
    mailer.send("email", &Locals::new()).await.unwrap();

    assert_eq!(factory.sent()[0].transport, SECOND);
}

#[tokio::test]
async fn test_update_waits_for_in_flight_send() {
    let factory = RecordingFactory::new().with_send_delay(Duration::from_millis(100));
    let mailer = mailer(&factory);

    let in_flight = {
        let mailer = mailer.clone();
        tokio::spawn(async move { mailer.send("email", &Locals::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    mailer.update(MailerConfig::console(SECOND)).await.unwrap();

    // The in-flight send completed on the old transport before it was closed.
    in_flight.await.unwrap().unwrap();
    let sent = factory.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].transport, FIRST);
    assert_eq!(factory.closed(), vec![FIRST]);

    mailer.send("email", &Locals::new()).await.unwrap();
    assert_eq!(factory.sent()[1].transport, SECOND);
}

#[tokio::test]
async fn test_concurrent_sends_and_updates_never_use_a_closed_transport() {
    let factory = RecordingFactory::new().with_send_delay(Duration::from_millis(5));
    let mailer = mailer(&factory);

    let mut tasks = Vec::new();
    for i in 0..20 {
        let mailer = mailer.clone();
        tasks.push(tokio::spawn(async move {
            if i % 5 == 0 {
                let from = if i % 10 == 0 { SECOND } else { FIRST };
                mailer.update(MailerConfig::console(from)).await.map(|()| None)
            } else {
                mailer.send("email", &Locals::new()).await.map(Some)
            }
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let sent = factory.sent();
    assert_eq!(sent.len(), 16);
    for record in sent {
        assert_eq!(record.message.from, record.transport);
    }
}
