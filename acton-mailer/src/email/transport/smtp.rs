//! SMTP transport
//!
//! Uses the `lettre` crate to deliver messages via SMTP servers.

use async_trait::async_trait;
use base64::Engine;
use lettre::{
    address::{Address, Envelope as SmtpEnvelope},
    message::{
        header::ContentType, Attachment as MimeAttachment, Mailbox, Mailboxes, MultiPart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::config::{SmtpOptions, TlsMode};
use crate::email::{Attachment, AttachmentEncoding, ComposedMessage, DeliveryReceipt, Envelope};
use crate::error::TransportError;

use super::Transport;

/// SMTP transport
///
/// Holds a pooled `lettre` connection until [`close`](Transport::close) is
/// called; sends after that fail with [`TransportError::Closed`].
pub struct SmtpTransport {
    inner: Mutex<Option<AsyncSmtpTransport<Tokio1Executor>>>,
    host: String,
}

impl std::fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("host", &self.host)
            .field("open", &self.inner.lock().is_some())
            .finish()
    }
}

impl SmtpTransport {
    /// Open an SMTP transport
    ///
    /// `default_from` is checked here so a bad sender is reported when the
    /// transport is opened rather than on first send.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Config` if the host is empty or TLS cannot be
    /// set up, and `TransportError::InvalidAddress` if `default_from` does not
    /// parse.
    pub fn new(options: &SmtpOptions, default_from: &str) -> Result<Self, TransportError> {
        if options.host.trim().is_empty() {
            return Err(TransportError::config("SMTP host is required"));
        }
        parse_mailbox(default_from)?;

        let mut builder = match options.tls {
            TlsMode::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&options.host)
                .map_err(|e| TransportError::config(format!("TLS parameters error: {e}")))?,
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&options.host)
                .map_err(|e| TransportError::config(format!("TLS parameters error: {e}")))?,
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&options.host),
        };

        builder = builder
            .port(options.port)
            .timeout(Some(Duration::from_secs(options.timeout_secs)));

        if let (Some(username), Some(password)) = (&options.username, &options.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            inner: Mutex::new(Some(builder.build())),
            host: options.host.clone(),
        })
    }

    /// Build the wire message
    fn build_message(message: &ComposedMessage) -> Result<Message, TransportError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&message.from)?)
            .message_id(Some(message.generate_message_id()));

        if let Some(sender) = &message.sender {
            builder = builder.sender(parse_mailbox(sender)?);
        }
        for mailbox in parse_mailboxes(&message.to)? {
            builder = builder.to(mailbox);
        }
        for mailbox in parse_mailboxes(&message.cc)? {
            builder = builder.cc(mailbox);
        }
        for mailbox in parse_mailboxes(&message.bcc)? {
            builder = builder.bcc(mailbox);
        }
        if let Some(reply_to) = &message.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }
        if let Some(subject) = &message.subject {
            builder = builder.subject(subject);
        }
        if let Some(in_reply_to) = &message.in_reply_to {
            builder = builder.in_reply_to(in_reply_to.clone());
        }
        for reference in &message.references {
            builder = builder.references(reference.clone());
        }

        let body = MultiPart::alternative_plain_html(message.text.clone(), message.html.clone());

        let result = if message.attachments.is_empty() {
            builder.multipart(body)
        } else {
            let mut mixed = MultiPart::mixed().multipart(body);
            for attachment in &message.attachments {
                mixed = mixed.singlepart(build_attachment(attachment)?);
            }
            builder.multipart(mixed)
        };

        result.map_err(|e| TransportError::Build(e.to_string()))
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &ComposedMessage) -> Result<DeliveryReceipt, TransportError> {
        let transport = self.inner.lock().clone().ok_or(TransportError::Closed)?;

        let email = Self::build_message(message)?;
        let message_id = email
            .headers()
            .get_raw("Message-ID")
            .map(str::to_string)
            .unwrap_or_default();

        let envelope = match &message.envelope {
            Some(custom) if !custom.is_empty() => override_envelope(email.envelope(), custom)?,
            _ => email.envelope().clone(),
        };

        if message.debug {
            debug!(
                host = %self.host,
                message_id = %message_id,
                envelope_from = ?envelope.from(),
                envelope_to = ?envelope.to(),
                "SMTP send"
            );
        }

        let response = transport
            .send_raw(&envelope, &email.formatted())
            .await
            .map_err(|e| TransportError::smtp(e.to_string()))?;

        let mut receipt = DeliveryReceipt::new(message_id)
            .accepted(envelope.to().iter().map(ToString::to_string));
        if let Some(line) = response.first_line() {
            receipt = receipt.response(line);
        }

        Ok(receipt)
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Dropping the last handle shuts the connection pool down.
        let closed = self.inner.lock().take();
        if closed.is_some() {
            debug!(host = %self.host, "SMTP transport closed");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .trim()
        .parse()
        .map_err(|_| TransportError::InvalidAddress(address.to_string()))
}

/// Each entry may itself be a comma separated list
fn parse_mailboxes(entries: &[String]) -> Result<Vec<Mailbox>, TransportError> {
    let mut mailboxes = Vec::new();
    for entry in entries {
        let parsed: Mailboxes = entry
            .parse()
            .map_err(|_| TransportError::InvalidAddress(entry.clone()))?;
        mailboxes.extend(parsed);
    }
    Ok(mailboxes)
}

fn parse_address(address: &str) -> Result<Address, TransportError> {
    parse_mailbox(address).map(|mailbox| mailbox.email)
}

/// Missing parts of a custom envelope come from the headers
fn override_envelope(
    derived: &SmtpEnvelope,
    custom: &Envelope,
) -> Result<SmtpEnvelope, TransportError> {
    let from = match custom.from.as_deref().filter(|from| !from.trim().is_empty()) {
        Some(from) => Some(parse_address(from)?),
        None => derived.from().cloned(),
    };

    let to = if custom.to.is_empty() {
        derived.to().to_vec()
    } else {
        parse_mailboxes(&custom.to)?
            .into_iter()
            .map(|mailbox| mailbox.email)
            .collect()
    };

    SmtpEnvelope::new(from, to).map_err(|e| TransportError::Build(e.to_string()))
}

fn build_attachment(
    attachment: &Attachment,
) -> Result<lettre::message::SinglePart, TransportError> {
    let content_type = attachment
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    let content_type = ContentType::parse(content_type)
        .map_err(|e| TransportError::Attachment(format!("{content_type}: {e}")))?;

    let body = match attachment.encoding {
        AttachmentEncoding::Utf8 => attachment.content.clone().into_bytes(),
        AttachmentEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(attachment.content.trim())
            .map_err(|e| TransportError::Attachment(e.to_string()))?,
    };

    let part = match &attachment.cid {
        Some(cid) => MimeAttachment::new_inline(cid.clone()),
        None => MimeAttachment::new(attachment.filename.clone().unwrap_or_default()),
    };

    Ok(part.body(body, content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> ComposedMessage {
        ComposedMessage {
            from: "App <noreply@example.com>".to_string(),
            to: vec!["ana@example.com, bo@example.com".to_string()],
            cc: vec!["cc@example.com".to_string()],
            subject: Some("Welcome".to_string()),
            html: "<p>Hi Ana</p>".to_string(),
            text: "Hi Ana".to_string(),
            ..ComposedMessage::default()
        }
    }

    #[test]
    fn test_build_message() {
        let email = SmtpTransport::build_message(&message()).unwrap();
        let formatted = String::from_utf8(email.formatted()).unwrap();

        assert!(formatted.contains("Subject: Welcome"));
        assert!(formatted.contains("Hi Ana"));
        assert!(formatted.contains("Message-ID: <"));
        assert_eq!(email.envelope().to().len(), 3);
    }

    #[test]
    fn test_build_message_with_attachments() {
        let mut message = message();
        message.attachments = vec![
            Attachment::text("notes.txt", "hello"),
            Attachment::base64("logo.png", "iVBORw0KGgo=")
                .content_type("image/png")
                .inline("logo"),
        ];

        let email = SmtpTransport::build_message(&message).unwrap();
        let formatted = String::from_utf8(email.formatted()).unwrap();

        assert!(formatted.contains("multipart/mixed"));
        assert!(formatted.contains("notes.txt"));
        assert!(formatted.contains("Content-ID: <logo>"));
    }

    #[test]
    fn test_invalid_address() {
        let mut message = message();
        message.to = vec!["not an address".to_string()];

        assert!(matches!(
            SmtpTransport::build_message(&message),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_invalid_base64_attachment() {
        let mut message = message();
        message.attachments = vec![Attachment::base64("broken.bin", "***")];

        assert!(matches!(
            SmtpTransport::build_message(&message),
            Err(TransportError::Attachment(_))
        ));
    }

    #[test]
    fn test_envelope_override_fills_missing_parts() {
        let email = SmtpTransport::build_message(&message()).unwrap();
        let custom = Envelope {
            from: Some("bounce@example.com".to_string()),
            to: Vec::new(),
        };

        let envelope = override_envelope(email.envelope(), &custom).unwrap();

        assert_eq!(
            envelope.from().map(ToString::to_string).as_deref(),
            Some("bounce@example.com")
        );
        assert_eq!(envelope.to().len(), 3);
    }

    #[test]
    fn test_new_rejects_bad_from() {
        let result = SmtpTransport::new(&SmtpOptions::new("smtp.example.com"), "not an address");
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let options = SmtpOptions::new("localhost").tls(TlsMode::None).port(2525);
        let transport = SmtpTransport::new(&options, "noreply@example.com").unwrap();

        transport.close().await.unwrap();

        assert!(matches!(
            transport.send(&message()).await,
            Err(TransportError::Closed)
        ));
    }
}
