//! Error page rendering: per-request context and the process-wide renderer.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::warn;

use crate::template::{Field, Flag, Template};
use crate::{ProxyError, Result, status, themes};

/// Everything a template can read while rendering one page.
///
/// Built fresh for every intercepted response and consumed by the render
/// call that created it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub code: u16,
    /// Reason phrase. Defaults to the catalog entry for `code`.
    pub message: String,
    /// Explanation. Defaults to the catalog entry for `code`.
    pub description: String,
    pub show_details: bool,
    pub host: String,
    pub original_uri: String,
    pub forwarded_for: String,
    pub request_id: String,
    /// Seconds since the Unix epoch. Zero means "now".
    pub now_unix: i64,
    pub l10n_enabled: bool,
    pub l10n_script: String,
}

impl RenderContext {
    /// Creates an otherwise empty context for `code`.
    pub fn new(code: u16) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }

    /// Fills in the catalog message/description and the current time where
    /// they were left empty.
    pub fn with_defaults(mut self) -> Self {
        if self.message.is_empty() {
            self.message = status::message(self.code).to_owned();
        }
        if self.description.is_empty() {
            self.description = status::description(self.code).to_owned();
        }
        if self.now_unix == 0 {
            self.now_unix = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_secs() as i64);
        }
        self
    }

    /// The text substituted for `field`.
    pub fn value(&self, field: Field) -> Cow<'_, str> {
        match field {
            Field::Code => Cow::Owned(self.code.to_string()),
            Field::Message => Cow::Borrowed(&self.message),
            Field::Description => Cow::Borrowed(&self.description),
            Field::Host => Cow::Borrowed(&self.host),
            Field::OriginalUri => Cow::Borrowed(&self.original_uri),
            Field::ForwardedFor => Cow::Borrowed(&self.forwarded_for),
            Field::RequestId => Cow::Borrowed(&self.request_id),
            Field::NowUnix => Cow::Owned(self.now_unix.to_string()),
            Field::L10nScript => Cow::Borrowed(&self.l10n_script),
            Field::Namespace => Cow::Borrowed(""),
            Field::Version => Cow::Borrowed(env!("CARGO_PKG_VERSION")),
        }
    }

    /// The truth value of `flag` for this context.
    pub fn flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::ShowDetails => self.show_details,
            Flag::L10nEnabled => self.l10n_enabled,
            Flag::AutoRefresh => status::is_auto_refresh(self.code),
        }
    }
}

/// A theme compiled once and rendered for every intercepted response.
#[derive(Debug)]
pub struct ErrorPageRenderer {
    theme: String,
    template: Template,
}

impl ErrorPageRenderer {
    /// Compiles the named theme, falling back to
    /// [`themes::FALLBACK_THEME`] when the name is unknown.
    pub fn from_theme(name: &str) -> Result<Self> {
        if let Some(source) = themes::get(name) {
            return Self::from_source(themes::canonical_name(name), source);
        }

        warn!(
            theme = name,
            fallback = themes::FALLBACK_THEME,
            "theme not found, falling back"
        );
        let source = themes::get(themes::FALLBACK_THEME).ok_or_else(|| {
            ProxyError::Config(format!(
                "theme \"{name}\" and fallback theme \"{}\" are unavailable",
                themes::FALLBACK_THEME
            ))
        })?;
        Self::from_source(themes::FALLBACK_THEME, source)
    }

    /// Compiles an arbitrary template document under the given theme name.
    pub fn from_source(theme: impl Into<String>, source: &str) -> Result<Self> {
        Ok(Self {
            theme: theme.into(),
            template: Template::compile(source)?,
        })
    }

    /// The name of the theme actually in use.
    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Renders the page for `ctx` after applying its defaults.
    pub fn render(&self, ctx: RenderContext) -> Bytes {
        Bytes::from(self.template.render(&ctx.with_defaults()))
    }
}

/// The immutable, process-wide error page settings shared by every
/// interceptor.
#[derive(Debug)]
pub struct ErrorPages {
    renderer: ErrorPageRenderer,
    show_details: bool,
    l10n_script: Option<String>,
}

impl ErrorPages {
    pub fn new(renderer: ErrorPageRenderer, show_details: bool) -> Self {
        Self {
            renderer,
            show_details,
            l10n_script: None,
        }
    }

    /// Enables localisation with the given script.
    pub fn with_l10n_script(mut self, script: impl Into<String>) -> Self {
        self.l10n_script = Some(script.into());
        self
    }

    pub fn renderer(&self) -> &ErrorPageRenderer {
        &self.renderer
    }

    pub fn show_details(&self) -> bool {
        self.show_details
    }

    /// A context for `code` carrying the process-wide settings.
    pub fn context(&self, code: u16) -> RenderContext {
        RenderContext {
            show_details: self.show_details,
            l10n_enabled: self.l10n_script.is_some(),
            l10n_script: self.l10n_script.clone().unwrap_or_default(),
            ..RenderContext::new(code)
        }
    }

    pub fn render(&self, ctx: RenderContext) -> Bytes {
        self.renderer.render(ctx)
    }
}
