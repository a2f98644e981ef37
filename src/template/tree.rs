//! Stack-based pairing of conditional actions into a block tree.

use std::fmt;

use crate::render::RenderContext;

use super::escape_html;
use super::lexer::{Action, ActionKind, Token};
use super::{Field, Flag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Text(String),
    Value { field: Field, escape: bool },
    /// Branches in source order; a branch without a flag is the `else` arm.
    Conditional(Vec<Branch>),
    /// A directive that could not be paired. Renders as nothing.
    Debris(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Branch {
    flag: Option<Flag>,
    marker: String,
    body: Vec<Node>,
}

/// A directive nesting problem found while compiling a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralWarning {
    /// An `if` with no matching `end`. Its content is kept unconditionally.
    Unclosed(String),
    /// An `else` or `end` with no open `if` to attach to.
    Stray(String),
}

impl fmt::Display for StructuralWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclosed(raw) => write!(f, "unclosed directive `{raw}`"),
            Self::Stray(raw) => write!(f, "stray directive `{raw}`"),
        }
    }
}

/// Pairs opens with closes, returning the block tree and any nesting
/// problems. Never fails: unresolved directives become debris and the
/// content they would have guarded stays in place.
pub(crate) fn build(tokens: Vec<Token>) -> (Vec<Node>, Vec<StructuralWarning>) {
    let mut root = Vec::new();
    let mut stack: Vec<Vec<Branch>> = Vec::new();
    let mut warnings = Vec::new();

    for token in tokens {
        let Action { kind, raw } = match token {
            Token::Text(text) => {
                sink(&mut stack, &mut root).push(Node::Text(text));
                continue;
            }
            Token::Action(action) => action,
        };

        match kind {
            ActionKind::Value { field, escape } => {
                sink(&mut stack, &mut root).push(Node::Value { field, escape });
            }
            ActionKind::If(flag) => stack.push(vec![Branch {
                flag: Some(flag),
                marker: raw,
                body: Vec::new(),
            }]),
            ActionKind::ElseIf(flag) => open_branch(&mut stack, &mut root, &mut warnings, Some(flag), raw),
            ActionKind::Else => open_branch(&mut stack, &mut root, &mut warnings, None, raw),
            ActionKind::End => match stack.pop() {
                Some(branches) => {
                    sink(&mut stack, &mut root).push(Node::Conditional(branches));
                }
                None => {
                    warnings.push(StructuralWarning::Stray(raw.clone()));
                    root.push(Node::Debris(raw));
                }
            },
        }
    }

    while let Some(branches) = stack.pop() {
        if let Some(first) = branches.first() {
            warnings.push(StructuralWarning::Unclosed(first.marker.clone()));
        }
        let parent = sink(&mut stack, &mut root);
        for branch in branches {
            parent.push(Node::Debris(branch.marker));
            parent.extend(branch.body);
        }
    }

    (root, warnings)
}

/// The node list currently being filled: the innermost open branch, or the
/// document root.
fn sink<'a>(stack: &'a mut [Vec<Branch>], root: &'a mut Vec<Node>) -> &'a mut Vec<Node> {
    match stack.last_mut().and_then(|branches| branches.last_mut()) {
        Some(branch) => &mut branch.body,
        None => root,
    }
}

fn open_branch(
    stack: &mut [Vec<Branch>],
    root: &mut Vec<Node>,
    warnings: &mut Vec<StructuralWarning>,
    flag: Option<Flag>,
    raw: String,
) {
    let accepts = stack
        .last()
        .and_then(|branches| branches.last())
        .is_some_and(|branch| branch.flag.is_some());

    if accepts {
        if let Some(branches) = stack.last_mut() {
            branches.push(Branch {
                flag,
                marker: raw,
                body: Vec::new(),
            });
            return;
        }
    }

    warnings.push(StructuralWarning::Stray(raw.clone()));
    sink(stack, root).push(Node::Debris(raw));
}

/// Opens a value slot in the rendered skeleton.
const SLOT_OPEN: char = '\u{E000}';
/// Closes a value slot.
const SLOT_CLOSE: char = '\u{E001}';

/// An evaluated template whose substituted values are held apart from the
/// markup.
///
/// The skeleton carries a private-use slot marker wherever a non-empty
/// value goes, so markup passes never see request-derived text.
#[derive(Debug, Default)]
pub(crate) struct Rendered {
    pub(crate) skeleton: String,
    values: Vec<String>,
}

impl Rendered {
    fn push_value(&mut self, value: String) {
        if value.is_empty() {
            return;
        }
        self.skeleton.push(SLOT_OPEN);
        self.skeleton.push_str(&self.values.len().to_string());
        self.skeleton.push(SLOT_CLOSE);
        self.values.push(value);
    }

    /// Replaces the slots left in `skeleton` with their values.
    ///
    /// `skeleton` is this render's skeleton, possibly with lines removed.
    /// Markers that do not name a held value are kept as they are.
    pub(crate) fn fill(&self, skeleton: &str) -> String {
        let extra: usize = self.values.iter().map(String::len).sum();
        let mut out = String::with_capacity(skeleton.len() + extra);
        let mut rest = skeleton;

        while let Some(open) = rest.find(SLOT_OPEN) {
            out.push_str(&rest[..open]);
            let after = &rest[open + SLOT_OPEN.len_utf8()..];
            let slot = after.find(SLOT_CLOSE).and_then(|close| {
                let value = after[..close].parse::<usize>().ok().and_then(|i| self.values.get(i))?;
                Some((value, close))
            });
            match slot {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + SLOT_CLOSE.len_utf8()..];
                }
                None => {
                    out.push(SLOT_OPEN);
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

/// Evaluates `nodes` against `ctx`, appending the result to `out`.
pub(crate) fn render(nodes: &[Node], ctx: &RenderContext, out: &mut Rendered) {
    for node in nodes {
        match node {
            Node::Text(text) => out.skeleton.push_str(text),
            Node::Value { field, escape } => {
                let value = ctx.value(*field);
                if *escape {
                    out.push_value(escape_html(&value));
                } else {
                    out.push_value(value.into_owned());
                }
            }
            Node::Conditional(branches) => {
                if let Some(branch) = branches
                    .iter()
                    .find(|branch| branch.flag.is_none_or(|flag| ctx.flag(flag)))
                {
                    render(&branch.body, ctx, out);
                }
            }
            Node::Debris(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::lexer::tokenize;

    fn compile(src: &str) -> (Vec<Node>, Vec<StructuralWarning>) {
        build(tokenize(src).unwrap())
    }

    fn eval(src: &str, ctx: &RenderContext) -> String {
        let (nodes, _) = compile(src);
        let mut out = Rendered::default();
        render(&nodes, ctx, &mut out);
        out.fill(&out.skeleton)
    }

    fn ctx(show_details: bool, l10n_enabled: bool) -> RenderContext {
        RenderContext {
            code: 404,
            show_details,
            l10n_enabled,
            ..Default::default()
        }
    }

    #[test]
    fn true_flag_keeps_content_false_flag_drops_it() {
        let src = "a{{ if show_details }}b{{ end }}c";
        assert_eq!(eval(src, &ctx(true, false)), "abc");
        assert_eq!(eval(src, &ctx(false, false)), "ac");
    }

    #[test]
    fn nested_blocks_of_the_same_flag_pair_correctly() {
        let src = "{{ if show_details }}1{{ if l10n_enabled }}2{{ if show_details }}3{{ end }}{{ end }}4{{ end }}5";
        assert_eq!(eval(src, &ctx(true, true)), "12345");
        assert_eq!(eval(src, &ctx(true, false)), "145");
        assert_eq!(eval(src, &ctx(false, true)), "5");
    }

    #[test]
    fn adjacent_siblings_are_not_mismatched() {
        let src = "{{ if show_details }}A{{ end }}{{ if show_details }}B{{ end }}|{{ if l10n_enabled }}C{{ end }}";
        assert_eq!(eval(src, &ctx(true, false)), "AB|");
        assert_eq!(eval(src, &ctx(false, true)), "|C");
    }

    #[test]
    fn else_and_else_if_choose_first_true_arm() {
        let src = "{{ if show_details }}d{{ else if l10n_enabled }}l{{ else }}n{{ end }}";
        assert_eq!(eval(src, &ctx(true, true)), "d");
        assert_eq!(eval(src, &ctx(false, true)), "l");
        assert_eq!(eval(src, &ctx(false, false)), "n");
    }

    #[test]
    fn auto_refresh_follows_status_code() {
        let src = "{{ if auto_refresh }}retry{{ end }}";
        let mut c = ctx(false, false);
        c.code = 503;
        assert_eq!(eval(src, &c), "retry");
        c.code = 599;
        assert_eq!(eval(src, &c), "");
    }

    #[test]
    fn unclosed_if_keeps_its_content() {
        let (nodes, warnings) = compile("a{{ if show_details }}b{{ else }}c");
        assert_eq!(
            warnings,
            vec![StructuralWarning::Unclosed("{{ if show_details }}".into())]
        );
        let mut out = Rendered::default();
        render(&nodes, &ctx(false, false), &mut out);
        assert_eq!(out.skeleton, "abc");
    }

    #[test]
    fn stray_end_and_else_are_reported() {
        let (_, warnings) = compile("{{ end }}x{{ else }}");
        assert_eq!(
            warnings,
            vec![
                StructuralWarning::Stray("{{ end }}".into()),
                StructuralWarning::Stray("{{ else }}".into()),
            ]
        );
        assert_eq!(eval("{{ end }}x{{ else }}", &ctx(true, true)), "x");
    }

    #[test]
    fn second_else_is_stray_inside_the_block() {
        let (_, warnings) = compile("{{ if show_details }}a{{ else }}b{{ else }}c{{ end }}");
        assert_eq!(warnings, vec![StructuralWarning::Stray("{{ else }}".into())]);
        let src = "{{ if show_details }}a{{ else }}b{{ else }}c{{ end }}";
        assert_eq!(eval(src, &ctx(false, false)), "bc");
    }

    #[test]
    fn values_render_raw_or_escaped() {
        let mut c = ctx(true, false);
        c.host = "<b>&".into();
        assert_eq!(eval("{{ host }}|{{ escape host }}", &c), "<b>&|&lt;b&gt;&amp;");
    }

    #[test]
    fn values_stay_out_of_the_skeleton() {
        let mut c = ctx(true, false);
        c.host = "a/* */b".into();
        let (nodes, _) = compile("<td>{{ host }}</td><td>{{ request_id }}</td>");
        let mut out = Rendered::default();
        render(&nodes, &c, &mut out);

        assert!(!out.skeleton.contains("/*"));
        assert!(out.skeleton.ends_with("<td></td>"));
        assert_eq!(out.fill(&out.skeleton), "<td>a/* */b</td><td></td>");
    }

    #[test]
    fn unknown_slots_are_left_alone() {
        let out = Rendered::default();
        let skeleton = format!("x{SLOT_OPEN}7{SLOT_CLOSE}y{SLOT_OPEN}");
        assert_eq!(out.fill(&skeleton), skeleton);
    }
}
