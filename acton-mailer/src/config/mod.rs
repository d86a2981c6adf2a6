//! Configuration management for acton-mailer
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `ACTON_` prefix, `__` for nesting)
//! 2. `./config.toml` (development)
//! 3. `~/.config/acton-mailer/{service}/config.toml` (user config, XDG)
//! 4. `/etc/acton-mailer/{service}/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! # config.toml
//! [mailer]
//! from = "App <noreply@example.com>"
//!
//! [mailer.transport]
//! protocol = "smtp"
//! host = "smtp.example.com"
//! port = 587
//! username = "mailer"
//! password = "secret"
//! tls = "starttls"
//! timeout_secs = 10
//!
//! [text]
//! wordwrap = 80
//!
//! [templates]
//! template_dir = "./templates/emails"
//! extension = "html"
//! ```
//!
//! The same transport can be set from the environment, e.g.
//! `ACTON_MAILER__TRANSPORT__HOST=smtp.example.com`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::email::TextOptions;

/// Transport connection options plus the default sender
///
/// This is the shape accepted both when a mailer is first attached and when
/// it is later reconfigured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    /// Default `From` used when neither the call nor the locals supply one
    pub from: String,

    /// Transport backend and its connection options
    pub transport: TransportOptions,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            from: "noreply@localhost".to_string(),
            transport: TransportOptions::default(),
        }
    }
}

impl MailerConfig {
    /// SMTP configuration with the given default sender
    ///
    /// # Examples
    ///
    /// ```rust
    /// use acton_mailer::config::{MailerConfig, SmtpOptions, TransportOptions};
    ///
    /// let config = MailerConfig::smtp("noreply@example.com", SmtpOptions::new("smtp.example.com"));
    /// assert!(matches!(config.transport, TransportOptions::Smtp(_)));
    /// ```
    #[must_use]
    pub fn smtp(from: impl Into<String>, options: SmtpOptions) -> Self {
        Self {
            from: from.into(),
            transport: TransportOptions::Smtp(options),
        }
    }

    /// Console configuration with the given default sender
    #[must_use]
    pub fn console(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            transport: TransportOptions::Console(ConsoleOptions::default()),
        }
    }
}

/// Which transport backend to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum TransportOptions {
    /// Deliver over SMTP
    Smtp(SmtpOptions),

    /// Log messages instead of delivering them
    Console(ConsoleOptions),
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::Console(ConsoleOptions::default())
    }
}

impl TransportOptions {
    /// Protocol name, as written in configuration
    #[must_use]
    pub const fn protocol(&self) -> &'static str {
        match self {
            Self::Smtp(_) => "smtp",
            Self::Console(_) => "console",
        }
    }
}

/// SMTP connection options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpOptions {
    /// SMTP server hostname
    pub host: String,

    /// SMTP server port (587 for STARTTLS, 465 for TLS)
    pub port: u16,

    /// Username; credentials are only sent when both parts are set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Transport security
    pub tls: TlsMode,

    /// Connection and command timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SmtpOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            username: None,
            password: None,
            tls: TlsMode::Starttls,
            timeout_secs: 10,
        }
    }
}

impl SmtpOptions {
    /// Options for the given host with defaults for everything else
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Set the port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set login credentials
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the TLS mode
    #[must_use]
    pub const fn tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }
}

/// SMTP transport security
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Upgrade a plain connection with STARTTLS (required)
    #[default]
    Starttls,
    /// Implicit TLS from the first byte
    Tls,
    /// No encryption; only for local relays and test servers
    None,
}

/// Console transport options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleOptions {
    /// Log message bodies as well as headers
    pub verbose: bool,
}

/// Template engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    /// Directory containing email templates
    pub template_dir: PathBuf,

    /// Extension appended to template names that have none
    pub extension: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("./templates/emails"),
            extension: "html".to_string(),
        }
    }
}

/// Complete acton-mailer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActonMailerConfig {
    /// Transport and default sender
    #[serde(default)]
    pub mailer: MailerConfig,

    /// Template lookup
    #[serde(default)]
    pub templates: TemplateSettings,

    /// Plain-text derivation defaults
    #[serde(default)]
    pub text: TextOptions,
}

impl ActonMailerConfig {
    /// Load configuration for a specific service
    ///
    /// Searches for configuration in XDG-compliant locations with precedence:
    /// 1. Environment variables (`ACTON_*`, use `__` for nesting)
    /// 2. `./config.toml`
    /// 3. `~/.config/acton-mailer/{service_name}/config.toml`
    /// 4. `/etc/acton-mailer/{service_name}/config.toml`
    /// 5. Defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be parsed or a value
    /// has the wrong type.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use acton_mailer::config::ActonMailerConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = ActonMailerConfig::load_for_service("my-app")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load_for_service(service_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?));

        let system_config = PathBuf::from("/etc/acton-mailer")
            .join(service_name)
            .join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path(service_name);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        figment = figment.merge(Env::prefixed("ACTON_").split("__").lowercase(true));

        Ok(figment.extract()?)
    }

    /// Load configuration from a specific file
    ///
    /// Environment variables still override the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML or a value has the
    /// wrong type.
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let config = Figment::new()
            .merge(Toml::string(&toml::to_string(&Self::default())?))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ACTON_").split("__").lowercase(true))
            .extract()?;

        Ok(config)
    }

    /// Get the recommended XDG config path for a service
    ///
    /// ```rust
    /// use acton_mailer::config::ActonMailerConfig;
    ///
    /// let path = ActonMailerConfig::recommended_path("my-app");
    /// assert!(path.ends_with("config.toml"));
    /// ```
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| {
                config_dir
                    .join("acton-mailer")
                    .join(service_name)
                    .join("config.toml")
            },
        )
    }
}
