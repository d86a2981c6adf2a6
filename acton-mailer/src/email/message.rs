//! Send requests, composed messages and delivery receipts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::TextOptions;

/// What to send: a bare template name, or options naming a template
///
/// # Examples
///
/// ```rust
/// use acton_mailer::email::{SendOptions, SendRequest};
///
/// let bare: SendRequest = "welcome".into();
/// let structured: SendRequest = SendOptions::template("welcome")
///     .to("ana@example.com")
///     .subject("Welcome!")
///     .into();
///
/// assert_eq!(bare.template(), Some("welcome"));
/// assert_eq!(structured.template(), Some("welcome"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SendRequest {
    /// Render this template with no pre-set message fields
    Template(String),
    /// Pre-set message fields plus the template to render
    Options(SendOptions),
}

impl SendRequest {
    /// Name of the template this request renders, if any
    #[must_use]
    pub fn template(&self) -> Option<&str> {
        match self {
            Self::Template(name) => Some(name),
            Self::Options(options) => options.template.as_deref(),
        }
    }

    /// Normalize into send options
    #[must_use]
    pub fn into_options(self) -> SendOptions {
        match self {
            Self::Template(name) => SendOptions::template(name),
            Self::Options(options) => options,
        }
    }
}

impl From<&str> for SendRequest {
    fn from(name: &str) -> Self {
        Self::Template(name.to_string())
    }
}

impl From<String> for SendRequest {
    fn from(name: String) -> Self {
        Self::Template(name)
    }
}

impl From<SendOptions> for SendRequest {
    fn from(options: SendOptions) -> Self {
        Self::Options(options)
    }
}

/// Per-send message fields
///
/// Every field set here takes precedence over a same-named local. Unset
/// fields fall back to locals (and, for `from`, to the transport's default
/// sender).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendOptions {
    /// Template to render
    pub template: Option<String>,

    /// Sender (From)
    pub from: Option<String>,

    /// Actual sender when different from `from` (Sender)
    pub sender: Option<String>,

    /// Recipients (To)
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,

    /// CC recipients
    #[serde(deserialize_with = "one_or_many")]
    pub cc: Vec<String>,

    /// BCC recipients
    #[serde(deserialize_with = "one_or_many")]
    pub bcc: Vec<String>,

    /// Reply-To address
    pub reply_to: Option<String>,

    /// Subject line
    pub subject: Option<String>,

    /// Plain-text body; overrides the text derived from the rendered HTML
    pub text: Option<String>,

    /// HTML body
    ///
    /// Always overwritten with the rendered template when composing, so
    /// there is no builder for it. Set a custom `text` to change the
    /// plain-text part instead.
    pub html: Option<String>,

    /// SMTP envelope overriding the header-derived one
    pub envelope: Option<Envelope>,

    /// Message-ID this message replies to (In-Reply-To)
    pub in_reply_to: Option<String>,

    /// Message-IDs of the thread (References)
    #[serde(deserialize_with = "one_or_many")]
    pub references: Vec<String>,

    /// File attachments
    pub attachments: Vec<Attachment>,

    /// Log the composed message at debug level before delivery
    pub debug: Option<bool>,

    /// Text extraction options for this send, used verbatim
    pub text_options: Option<TextOptions>,
}

impl SendOptions {
    /// Create options rendering the given template
    #[must_use]
    pub fn template(name: impl Into<String>) -> Self {
        Self {
            template: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the sender (From)
    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Set the Sender header
    #[must_use]
    pub fn sender(mut self, address: impl Into<String>) -> Self {
        self.sender = Some(address.into());
        self
    }

    /// Add a recipient (To)
    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Add a CC recipient
    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Add a BCC recipient
    #[must_use]
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Set the reply-to address
    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Set the subject
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Override the derived plain-text body
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    /// Set the SMTP envelope
    #[must_use]
    pub fn envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    /// Set In-Reply-To
    #[must_use]
    pub fn in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self
    }

    /// Add a References entry
    #[must_use]
    pub fn reference(mut self, message_id: impl Into<String>) -> Self {
        self.references.push(message_id.into());
        self
    }

    /// Add an attachment
    #[must_use]
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Set the debug flag
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Use these text extraction options for this send
    #[must_use]
    pub fn text_options(mut self, options: TextOptions) -> Self {
        self.text_options = Some(options);
        self
    }
}

/// How attachment content is encoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentEncoding {
    /// Content is UTF-8 text
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
    /// Content is base64 encoded bytes
    Base64,
}

/// A file attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// File name shown to the recipient
    #[serde(default)]
    pub filename: Option<String>,

    /// Attachment content, encoded as `encoding` says
    pub content: String,

    /// Encoding of `content`
    #[serde(default)]
    pub encoding: AttachmentEncoding,

    /// MIME type (defaults to `application/octet-stream`)
    #[serde(default)]
    pub content_type: Option<String>,

    /// Content-ID for inline use from the HTML body (`cid:...`)
    #[serde(default)]
    pub cid: Option<String>,
}

impl Attachment {
    /// Create a text attachment
    #[must_use]
    pub fn text(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            content: content.into(),
            encoding: AttachmentEncoding::Utf8,
            content_type: Some("text/plain".to_string()),
            cid: None,
        }
    }

    /// Create an attachment from base64 encoded bytes
    #[must_use]
    pub fn base64(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            content: content.into(),
            encoding: AttachmentEncoding::Base64,
            content_type: None,
            cid: None,
        }
    }

    /// Set the MIME type
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Mark as inline with the given Content-ID
    #[must_use]
    pub fn inline(mut self, cid: impl Into<String>) -> Self {
        self.cid = Some(cid.into());
        self
    }
}

/// SMTP envelope (MAIL FROM / RCPT TO) overriding the message headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Envelope sender
    pub from: Option<String>,

    /// Envelope recipients
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,
}

impl Envelope {
    /// Whether the envelope carries anything besides blanks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let blank = |address: &str| address.trim().is_empty();
        self.from.as_deref().is_none_or(blank) && self.to.iter().all(|to| blank(to))
    }
}

/// A fully resolved message, ready for a transport
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedMessage {
    /// Sender (From); always set
    pub from: String,
    /// Sender header
    pub sender: Option<String>,
    /// Recipients (To)
    pub to: Vec<String>,
    /// CC recipients
    pub cc: Vec<String>,
    /// BCC recipients
    pub bcc: Vec<String>,
    /// Reply-To address
    pub reply_to: Option<String>,
    /// Subject line
    pub subject: Option<String>,
    /// Plain-text body
    pub text: String,
    /// HTML body
    pub html: String,
    /// SMTP envelope override
    pub envelope: Option<Envelope>,
    /// In-Reply-To
    pub in_reply_to: Option<String>,
    /// References
    pub references: Vec<String>,
    /// Attachments
    pub attachments: Vec<Attachment>,
    /// Debug flag
    pub debug: bool,
}

impl ComposedMessage {
    /// All header recipients (To, CC and BCC)
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(String::as_str)
    }

    /// Generate a fresh Message-ID in the sender's domain
    ///
    /// # Examples
    ///
    /// ```rust
    /// use acton_mailer::email::ComposedMessage;
    ///
    /// let message = ComposedMessage {
    ///     from: "App <noreply@example.com>".to_string(),
    ///     ..ComposedMessage::default()
    /// };
    /// assert!(message.generate_message_id().ends_with("@example.com>"));
    /// ```
    #[must_use]
    pub fn generate_message_id(&self) -> String {
        let domain = self
            .from
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim_end_matches('>').trim())
            .filter(|domain| !domain.is_empty())
            .unwrap_or("localhost");

        format!("<{}@{domain}>", Uuid::new_v4())
    }
}

/// Outcome of a successful handoff to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Message-ID of the delivered message
    pub message_id: String,

    /// Recipients the backend accepted
    #[serde(default)]
    pub accepted: Vec<String>,

    /// Recipients the backend rejected
    #[serde(default)]
    pub rejected: Vec<String>,

    /// Backend response line, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// When the transport accepted the message
    pub accepted_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    /// Create a receipt with just a message id
    #[must_use]
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            accepted: Vec::new(),
            rejected: Vec::new(),
            response: None,
            accepted_at: Utc::now(),
        }
    }

    /// Set the accepted recipients
    #[must_use]
    pub fn accepted<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted = recipients.into_iter().map(Into::into).collect();
        self
    }

    /// Set the backend response line
    #[must_use]
    pub fn response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }
}

/// A single string or a list of strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(single) if single.trim().is_empty() => Self::new(),
            OneOrMany::One(single) => vec![single],
            OneOrMany::Many(many) => many.into_iter().filter(|s| !s.trim().is_empty()).collect(),
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<OneOrMany>::deserialize(deserializer)?;
    Ok(value.map(Into::into).unwrap_or_default())
}
