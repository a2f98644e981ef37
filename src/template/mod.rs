//! The error-page template language.
//!
//! A template is ordinary HTML carrying a handful of `{{ ... }}` actions:
//!
//! - `{{ if <flag> }}`, `{{ else if <flag> }}`, `{{ else }}`, `{{ end }}`
//!   branch on [`Flag`]s. They may hide inside `<!-- -->`, `/* */`, or `//`
//!   comments on a line of their own.
//! - `{{ <token> }}` and `{{ escape <token> }}` substitute a [`Field`] of the
//!   render context, raw or HTML-escaped.
//!
//! `{{-` and `-}}` strip the whitespace next to an action. Compilation runs
//! once per theme; the compiled [`Template`] is immutable and is shared by
//! every render.

mod cleanup;
mod lexer;
mod preprocess;
mod tree;

use tracing::warn;

use crate::Result;
use crate::render::RenderContext;

use self::cleanup::Cleanup;
use self::tree::{Node, Rendered};

pub use self::tree::StructuralWarning;

/// Boolean conditions a directive can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    /// Whether request details are shown.
    ShowDetails,
    /// Whether a localisation script is present.
    L10nEnabled,
    /// Whether the status code is one the page retries automatically.
    AutoRefresh,
}

impl Flag {
    const NAMES: [(&'static str, Flag); 3] = [
        ("show_details", Flag::ShowDetails),
        ("l10n_enabled", Flag::L10nEnabled),
        ("auto_refresh", Flag::AutoRefresh),
    ];

    /// Looks up a flag by the name used in templates.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, flag)| *flag)
    }
}

/// Render-context values a placeholder can substitute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Code,
    Message,
    Description,
    Host,
    OriginalUri,
    ForwardedFor,
    RequestId,
    NowUnix,
    L10nScript,
    /// Always empty.
    Namespace,
    /// The crate version.
    Version,
}

impl Field {
    const NAMES: [(&'static str, Field); 11] = [
        ("code", Field::Code),
        ("message", Field::Message),
        ("description", Field::Description),
        ("host", Field::Host),
        ("original_uri", Field::OriginalUri),
        ("forwarded_for", Field::ForwardedFor),
        ("request_id", Field::RequestId),
        ("nowUnix", Field::NowUnix),
        ("l10nScript", Field::L10nScript),
        ("namespace", Field::Namespace),
        ("version", Field::Version),
    ];

    /// Looks up a field by the token name used in templates.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, field)| *field)
    }
}

/// A compiled, render-ready template.
#[derive(Debug)]
pub struct Template {
    nodes: Vec<Node>,
    warnings: Vec<StructuralWarning>,
    cleanup: Cleanup,
}

impl Template {
    /// Unwraps comment-hidden directives, tokenizes, and pairs blocks.
    ///
    /// Unknown flags or tokens and unsupported directives are errors.
    /// Nesting problems are not: they are logged, kept in
    /// [`warnings`](Self::warnings), and the affected content renders
    /// unconditionally.
    pub fn compile(raw: &str) -> Result<Self> {
        let preprocessed = preprocess::preprocess(raw);
        let tokens = lexer::tokenize(&preprocessed)?;
        let (nodes, warnings) = tree::build(tokens);

        for warning in &warnings {
            warn!(%warning, "template directive left unresolved");
        }

        Ok(Self {
            nodes,
            warnings,
            cleanup: Cleanup::new()?,
        })
    }

    /// Nesting problems found while compiling.
    pub fn warnings(&self) -> &[StructuralWarning] {
        &self.warnings
    }

    /// Evaluates conditionals, tidies the resulting markup, then fills in
    /// the substituted values.
    ///
    /// Cleanup only ever sees template text, so values reach the page
    /// exactly as the context renders them.
    pub fn render(&self, ctx: &RenderContext) -> String {
        let mut out = Rendered::default();
        tree::render(&self.nodes, ctx, &mut out);
        let skeleton = self.cleanup.apply(&out.skeleton);
        out.fill(&skeleton)
    }
}

/// HTML-escapes `s`, encoding `&`, `<`, `>`, `"` and `'`.
///
/// Each character is encoded once, so an `&` produced by an entity is never
/// re-escaped.
pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
