//! Tokenizer turning a preprocessed document into a flat action stream.

use crate::{ProxyError, Result};

use super::{Field, Flag};

/// Control keywords that are recognised but deliberately unsupported.
const UNSUPPORTED_KEYWORDS: [&str; 5] = ["range", "with", "block", "define", "template"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Text(String),
    Action(Action),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Action {
    pub kind: ActionKind,
    /// The action exactly as written, including braces and trim markers.
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionKind {
    If(Flag),
    ElseIf(Flag),
    Else,
    End,
    Value { field: Field, escape: bool },
}

/// Splits `src` into literal text and actions.
///
/// Trim markers are applied here: `{{-` strips all whitespace at the end of
/// the preceding text and `-}}` strips all whitespace at the start of the
/// following text. An unterminated `{{` is kept as literal text.
pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = src;
    let mut trim_next = false;

    while let Some(open) = rest.find("{{") {
        let Some(len) = rest[open..].find("}}") else {
            break;
        };
        let raw = &rest[open..open + len + 2];
        let inner = &raw[2..raw.len() - 2];

        let (inner, trim_left) = match inner.strip_prefix('-') {
            Some(stripped) if stripped.starts_with(char::is_whitespace) => (stripped, true),
            _ => (inner, false),
        };
        let (inner, trim_right) = match inner.strip_suffix('-') {
            Some(stripped) if stripped.ends_with(char::is_whitespace) => (stripped, true),
            _ => (inner, false),
        };

        push_text(&mut tokens, &rest[..open], trim_next, trim_left);
        tokens.push(Token::Action(Action {
            kind: parse_action(inner, raw)?,
            raw: raw.to_owned(),
        }));

        trim_next = trim_right;
        rest = &rest[open + len + 2..];
    }

    push_text(&mut tokens, rest, trim_next, false);
    Ok(tokens)
}

fn push_text(tokens: &mut Vec<Token>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        tokens.push(Token::Text(text.to_owned()));
    }
}

fn parse_action(inner: &str, raw: &str) -> Result<ActionKind> {
    let words: Vec<&str> = inner.split_whitespace().collect();
    match words.as_slice() {
        ["if", flag] => Ok(ActionKind::If(flag_named(flag, raw)?)),
        ["else"] => Ok(ActionKind::Else),
        ["else", "if", flag] => Ok(ActionKind::ElseIf(flag_named(flag, raw)?)),
        ["end"] => Ok(ActionKind::End),
        [keyword, ..] if UNSUPPORTED_KEYWORDS.contains(keyword) => Err(ProxyError::Template(
            format!("unsupported directive `{raw}`"),
        )),
        ["escape", name] => Ok(ActionKind::Value {
            field: field_named(name, raw)?,
            escape: true,
        }),
        [name] => Ok(ActionKind::Value {
            field: field_named(name, raw)?,
            escape: false,
        }),
        _ => Err(ProxyError::Template(format!("malformed action `{raw}`"))),
    }
}

fn flag_named(name: &str, raw: &str) -> Result<Flag> {
    Flag::from_name(name)
        .ok_or_else(|| ProxyError::Template(format!("unknown flag `{name}` in `{raw}`")))
}

fn field_named(name: &str, raw: &str) -> Result<Field> {
    Field::from_name(name)
        .ok_or_else(|| ProxyError::Template(format!("unknown token `{name}` in `{raw}`")))
}
