//! Template rendering for email bodies
//!
//! The mailer treats rendering as a black box: a [`Renderer`] turns a
//! template name plus [`Locals`] into an HTML string. [`MiniJinjaRenderer`]
//! is the bundled implementation; applications may plug in their own.
//!
//! Request-scoped sends go through a [`ResponseRenderer`], which layers the
//! request's [`ViewLocals`] underneath the locals passed to the call.

use async_trait::async_trait;
use minijinja::{Environment, ErrorKind, Value};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

use crate::config::TemplateSettings;
use crate::email::Locals;
use crate::error::RenderError;

/// Turns a template name and locals into HTML
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `template` with `locals`
    ///
    /// # Errors
    ///
    /// Returns `RenderError` if the template does not exist or fails to render
    async fn render(&self, template: &str, locals: &Locals) -> Result<String, RenderError>;
}

#[async_trait]
impl<R: Renderer + ?Sized> Renderer for Arc<R> {
    async fn render(&self, template: &str, locals: &Locals) -> Result<String, RenderError> {
        (**self).render(template, locals).await
    }
}

/// Type-erased renderer shared between the application and its requests
pub type SharedRenderer = Arc<dyn Renderer>;

/// Thread-safe minijinja environment with hot reload support
///
/// Template names without an extension get the configured one appended, so
/// `"welcome"` resolves to `welcome.html` by default.
///
/// # Examples
///
/// ```rust
/// use acton_mailer::email::Locals;
/// use acton_mailer::template::{MiniJinjaRenderer, Renderer};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let renderer = MiniJinjaRenderer::new();
/// renderer.add_template("welcome", "<p>Hi {{ name }}</p>")?;
///
/// let html = renderer
///     .render("welcome", &Locals::new().with("name", "Ana"))
///     .await?;
/// assert_eq!(html, "<p>Hi Ana</p>");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MiniJinjaRenderer {
    env: Arc<RwLock<Environment<'static>>>,
    inline: Arc<RwLock<Vec<(String, String)>>>,
    extension: String,
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MiniJinjaRenderer {
    /// Create a renderer with no templates loaded
    #[must_use]
    pub fn new() -> Self {
        Self::with_environment(Self::create_environment(), "html")
    }

    /// Create a renderer that loads templates from `settings.template_dir`
    #[must_use]
    pub fn from_settings(settings: &TemplateSettings) -> Self {
        let mut env = Self::create_environment();
        env.set_loader(minijinja::path_loader(&settings.template_dir));

        Self::with_environment(env, &settings.extension)
    }

    fn with_environment(env: Environment<'static>, extension: &str) -> Self {
        Self {
            env: Arc::new(RwLock::new(env)),
            inline: Arc::new(RwLock::new(Vec::new())),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    fn create_environment() -> Environment<'static> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env
    }

    /// Register a template from source
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Template` if the source does not parse.
    pub fn add_template(
        &self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), RenderError> {
        let name = self.resolve(&name.into());
        let source = source.into();

        self.env
            .write()
            .add_template_owned(name.clone(), source.clone())?;
        self.inline.write().push((name, source));
        Ok(())
    }

    /// Make a value available to every template
    ///
    /// # Examples
    ///
    /// ```rust
    /// use acton_mailer::template::MiniJinjaRenderer;
    ///
    /// let renderer = MiniJinjaRenderer::new();
    /// renderer.add_global("app_name", "Acme");
    /// ```
    pub fn add_global(&self, name: impl Into<String>, value: impl serde::Serialize) {
        self.env
            .write()
            .add_global(name.into(), Value::from_serialize(value));
    }

    /// Drop cached templates so they are read from disk again
    ///
    /// Templates registered with [`add_template`](Self::add_template) survive
    /// the reload.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Template` if a registered template no longer parses.
    pub fn reload(&self) -> Result<(), RenderError> {
        let mut env = self.env.write();
        env.clear_templates();
        for (name, source) in self.inline.read().iter() {
            env.add_template_owned(name.clone(), source.clone())?;
        }

        tracing::debug!("Email templates reloaded");
        Ok(())
    }

    /// Render synchronously
    ///
    /// # Errors
    ///
    /// Returns `RenderError::NotFound` for unknown templates and
    /// `RenderError::Template` for everything else the engine reports.
    pub fn render_sync(&self, template: &str, locals: &Locals) -> Result<String, RenderError> {
        let name = self.resolve(template);
        let env = self.env.read();

        let tmpl = env.get_template(&name).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => RenderError::NotFound(template.to_string()),
            _ => RenderError::Template(e),
        })?;

        Ok(tmpl.render(locals.as_map())?)
    }

    fn resolve(&self, name: &str) -> String {
        if self.extension.is_empty() || Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{name}.{}", self.extension)
        }
    }
}

#[async_trait]
impl Renderer for MiniJinjaRenderer {
    async fn render(&self, template: &str, locals: &Locals) -> Result<String, RenderError> {
        self.render_sync(template, locals)
    }
}

/// Per-request template variables
///
/// Handlers and middleware add values here; request-scoped sends see them
/// underneath the locals passed to the call.
#[derive(Debug, Clone, Default)]
pub struct ViewLocals(Arc<RwLock<Locals>>);

impl ViewLocals {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value
    pub fn insert(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.write().insert(key, value);
    }

    /// Copy of the current values
    #[must_use]
    pub fn snapshot(&self) -> Locals {
        self.0.read().clone()
    }
}

/// Renderer bound to one request
#[derive(Clone)]
pub struct ResponseRenderer {
    inner: SharedRenderer,
    view_locals: ViewLocals,
}

impl std::fmt::Debug for ResponseRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseRenderer")
            .field("view_locals", &self.view_locals)
            .finish_non_exhaustive()
    }
}

impl ResponseRenderer {
    /// Bind `inner` to a request's view locals
    #[must_use]
    pub const fn new(inner: SharedRenderer, view_locals: ViewLocals) -> Self {
        Self { inner, view_locals }
    }

    /// The request's view locals
    #[must_use]
    pub const fn view_locals(&self) -> &ViewLocals {
        &self.view_locals
    }
}

#[async_trait]
impl Renderer for ResponseRenderer {
    async fn render(&self, template: &str, locals: &Locals) -> Result<String, RenderError> {
        let mut merged = self.view_locals.snapshot();
        merged.extend(locals);
        self.inner.render(template, &merged).await
    }
}
