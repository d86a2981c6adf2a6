//! Accepted message fields and the merge policy
//!
//! A composed message is resolved field by field, in the fixed order of
//! [`ACCEPTED_FIELDS`]. For each field the first present, non-empty value
//! wins:
//!
//! 1. the explicit value from [`SendOptions`]
//! 2. the value in [`Locals`] under the field's name (or its alias)
//! 3. nothing, except for `from`, which falls back to the transport's
//!    default sender
//!
//! Locals under any other name are template variables only and never reach
//! the outbound message.

use serde::de::DeserializeOwned;

use super::message::{ComposedMessage, Envelope, OneOrMany, SendOptions};
use super::Locals;
use crate::error::MailerError;

/// A message field eligible for merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceptedField {
    /// From
    From,
    /// Sender
    Sender,
    /// To
    To,
    /// Subject
    Subject,
    /// Reply-To (local alias `reply_to`)
    ReplyTo,
    /// Debug flag
    Debug,
    /// CC
    Cc,
    /// BCC
    Bcc,
    /// Plain-text body (local alias `body`)
    Text,
    /// HTML body
    Html,
    /// SMTP envelope
    Envelope,
    /// In-Reply-To (local alias `in_reply_to`)
    InReplyTo,
    /// References
    References,
    /// Attachments
    Attachments,
}

/// The accepted field set, in merge order
pub const ACCEPTED_FIELDS: [AcceptedField; 14] = [
    AcceptedField::From,
    AcceptedField::Sender,
    AcceptedField::To,
    AcceptedField::Subject,
    AcceptedField::ReplyTo,
    AcceptedField::Debug,
    AcceptedField::Cc,
    AcceptedField::Bcc,
    AcceptedField::Text,
    AcceptedField::Html,
    AcceptedField::Envelope,
    AcceptedField::InReplyTo,
    AcceptedField::References,
    AcceptedField::Attachments,
];

impl AcceptedField {
    /// Canonical field name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::Sender => "sender",
            Self::To => "to",
            Self::Subject => "subject",
            Self::ReplyTo => "replyTo",
            Self::Debug => "debug",
            Self::Cc => "cc",
            Self::Bcc => "bcc",
            Self::Text => "text",
            Self::Html => "html",
            Self::Envelope => "envelope",
            Self::InReplyTo => "inReplyTo",
            Self::References => "references",
            Self::Attachments => "attachments",
        }
    }

    /// Keys consulted in locals, in lookup order
    #[must_use]
    pub const fn local_keys(self) -> &'static [&'static str] {
        match self {
            Self::From => &["from"],
            Self::Sender => &["sender"],
            Self::To => &["to"],
            Self::Subject => &["subject"],
            Self::ReplyTo => &["replyTo", "reply_to"],
            Self::Debug => &["debug"],
            Self::Cc => &["cc"],
            Self::Bcc => &["bcc"],
            Self::Text => &["text", "body"],
            Self::Html => &["html"],
            Self::Envelope => &["envelope"],
            Self::InReplyTo => &["inReplyTo", "in_reply_to"],
            Self::References => &["references"],
            Self::Attachments => &["attachments"],
        }
    }

    /// Find the field a locals key feeds, if any
    #[must_use]
    pub fn from_local_key(key: &str) -> Option<Self> {
        ACCEPTED_FIELDS
            .into_iter()
            .find(|field| field.local_keys().contains(&key))
    }
}

/// Values that can be "present but empty"
trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for bool {
    fn is_present(&self) -> bool {
        true
    }
}

impl Presence for Envelope {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

/// Resolve the final message from explicit options, locals and the default sender
///
/// # Errors
///
/// Returns [`MailerError::InvalidField`] when a local stored under an
/// accepted field name cannot be read as that field's type.
///
/// # Examples
///
/// ```rust
/// use acton_mailer::email::{merge, Locals, SendOptions};
///
/// let explicit = SendOptions::template("welcome").subject("Explicit");
/// let locals = Locals::new()
///     .with("subject", "From locals")
///     .with("to", "ana@example.com")
///     .with("name", "Ana");
///
/// let message = merge(&explicit, &locals, "noreply@example.com")?;
/// assert_eq!(message.subject.as_deref(), Some("Explicit"));
/// assert_eq!(message.to, vec!["ana@example.com"]);
/// assert_eq!(message.from, "noreply@example.com");
/// # Ok::<(), acton_mailer::error::MailerError>(())
/// ```
pub fn merge(
    explicit: &SendOptions,
    locals: &Locals,
    default_from: &str,
) -> Result<ComposedMessage, MailerError> {
    let mut message = ComposedMessage::default();

    for field in ACCEPTED_FIELDS {
        match field {
            AcceptedField::From => {
                message.from = pick(explicit.from.clone(), locals, field)?
                    .unwrap_or_else(|| default_from.to_string());
            }
            AcceptedField::Sender => message.sender = pick(explicit.sender.clone(), locals, field)?,
            AcceptedField::To => message.to = pick_list(&explicit.to, locals, field)?,
            AcceptedField::Subject => {
                message.subject = pick(explicit.subject.clone(), locals, field)?;
            }
            AcceptedField::ReplyTo => {
                message.reply_to = pick(explicit.reply_to.clone(), locals, field)?;
            }
            AcceptedField::Debug => {
                message.debug = pick(explicit.debug, locals, field)?.unwrap_or(false);
            }
            AcceptedField::Cc => message.cc = pick_list(&explicit.cc, locals, field)?,
            AcceptedField::Bcc => message.bcc = pick_list(&explicit.bcc, locals, field)?,
            AcceptedField::Text => {
                message.text = pick(explicit.text.clone(), locals, field)?.unwrap_or_default();
            }
            AcceptedField::Html => {
                message.html = pick(explicit.html.clone(), locals, field)?.unwrap_or_default();
            }
            AcceptedField::Envelope => {
                message.envelope = pick(explicit.envelope.clone(), locals, field)?;
            }
            AcceptedField::InReplyTo => {
                message.in_reply_to = pick(explicit.in_reply_to.clone(), locals, field)?;
            }
            AcceptedField::References => {
                message.references = pick_list(&explicit.references, locals, field)?;
            }
            AcceptedField::Attachments => {
                message.attachments = pick(
                    Some(explicit.attachments.clone()),
                    locals,
                    field,
                )?
                .unwrap_or_default();
            }
        }
    }

    Ok(message)
}

/// Explicit value if present, else the first present local
fn pick<T>(explicit: Option<T>, locals: &Locals, field: AcceptedField) -> Result<Option<T>, MailerError>
where
    T: Presence + DeserializeOwned,
{
    if let Some(value) = explicit.filter(Presence::is_present) {
        return Ok(Some(value));
    }
    local(locals, field)
}

/// Address-like lists accept a single string or an array in locals
///
/// Blank entries are dropped; a list with nothing else is absent.
fn pick_list(
    explicit: &[String],
    locals: &Locals,
    field: AcceptedField,
) -> Result<Vec<String>, MailerError> {
    let explicit: Vec<String> = explicit
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .cloned()
        .collect();
    if !explicit.is_empty() {
        return Ok(explicit);
    }
    Ok(local::<OneOrManyList>(locals, field)?
        .map(|list| list.0)
        .unwrap_or_default())
}

fn local<T>(locals: &Locals, field: AcceptedField) -> Result<Option<T>, MailerError>
where
    T: Presence + DeserializeOwned,
{
    for key in field.local_keys() {
        let Some(value) = locals.get(key).filter(|value| !value.is_null()) else {
            continue;
        };

        let parsed: T = serde_json::from_value(value.clone()).map_err(|e| {
            MailerError::InvalidField {
                field: field.name(),
                reason: e.to_string(),
            }
        })?;

        if parsed.is_present() {
            return Ok(Some(parsed));
        }
    }

    Ok(None)
}

/// Deserializes from a string or an array of strings
struct OneOrManyList(Vec<String>);

impl Presence for OneOrManyList {
    fn is_present(&self) -> bool {
        !self.0.is_empty()
    }
}

impl<'de> serde::Deserialize<'de> for OneOrManyList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        OneOrMany::deserialize(deserializer).map(|value| Self(value.into()))
    }
}

/// Whether a locals key would be merged into the outbound message
#[must_use]
pub fn is_accepted(key: &str) -> bool {
    AcceptedField::from_local_key(key).is_some()
}
