//! Comment-skin removal for directive-only lines.
//!
//! Theme authors hide directives inside comments so the raw document still
//! renders as plain HTML, CSS, or JavaScript:
//!
//! ```text
//! <!-- {{ if show_details }} -->
//! /* {{ end }} */
//! // {{ else }}
//! ```
//!
//! A line whose trimmed content is exactly one such comment, and whose
//! comment body holds nothing but control actions, is replaced by the bare
//! actions with outer trim markers so the line vanishes from the output.
//! Value actions such as `// {{ l10nScript }}` are never unwrapped.

use std::borrow::Cow;

/// First words that mark an action as control flow rather than a value.
const CONTROL_KEYWORDS: [&str; 8] = [
    "if", "else", "end", "range", "with", "block", "define", "template",
];

/// Unwraps every directive-only comment line in `raw`.
pub(crate) fn preprocess(raw: &str) -> String {
    raw.split('\n')
        .map(unwrap_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn unwrap_line(line: &str) -> Cow<'_, str> {
    strip_comment_skin(line.trim())
        .filter(|inner| contains_only_directives(inner))
        .map_or(Cow::Borrowed(line), |inner| {
            Cow::Owned(ensure_outer_trim_markers(inner))
        })
}

/// Returns the trimmed body of a line that is exactly one HTML, block, or
/// line comment.
fn strip_comment_skin(trimmed: &str) -> Option<&str> {
    if let Some(inner) = trimmed
        .strip_prefix("<!--")
        .and_then(|s| s.strip_suffix("-->"))
    {
        return Some(inner.trim());
    }
    if let Some(inner) = trimmed
        .strip_prefix("/*")
        .and_then(|s| s.strip_suffix("*/"))
    {
        return Some(inner.trim());
    }
    if !trimmed.starts_with("///") {
        if let Some(inner) = trimmed.strip_prefix("//") {
            return Some(inner.trim());
        }
    }
    None
}

/// Returns `true` if `s` is one or more `{{ ... }}` control actions with
/// only whitespace between them.
fn contains_only_directives(s: &str) -> bool {
    let mut remaining = s.trim();
    let mut found = false;

    while !remaining.is_empty() {
        let Some(open) = remaining.find("{{") else {
            return false;
        };
        if !remaining[..open].trim().is_empty() {
            return false;
        }
        let Some(close) = remaining[open..].find("}}") else {
            return false;
        };

        let action = remaining[open + 2..open + close].trim_matches(|c: char| c == '-' || c == ' ');
        if !is_control_keyword(action.trim()) {
            return false;
        }

        remaining = remaining[open + close + 2..].trim_start();
        found = true;
    }

    found
}

fn is_control_keyword(action: &str) -> bool {
    action
        .split_whitespace()
        .next()
        .is_some_and(|word| CONTROL_KEYWORDS.contains(&word))
}

/// Adds `{{-` to the first action and `-}}` to the last when missing.
fn ensure_outer_trim_markers(s: &str) -> String {
    let mut out = s.to_owned();
    if out.starts_with("{{") && !out.starts_with("{{-") {
        out = format!("{{{{- {}", out[2..].trim_start_matches(' '));
    }
    if out.ends_with("}}") && !out.ends_with("-}}") {
        out = format!("{} -}}}}", out[..out.len() - 2].trim_end_matches(' '));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_html_comment_directive() {
        let out = preprocess("<p>a</p>\n  <!-- {{ if show_details }} -->\n<p>b</p>");
        assert_eq!(out, "<p>a</p>\n{{- if show_details -}}\n<p>b</p>");
    }

    #[test]
    fn unwraps_block_and_line_comments() {
        assert_eq!(preprocess("/* {{ end }} */"), "{{- end -}}");
        assert_eq!(preprocess("    // {{ else }}"), "{{- else -}}");
    }

    #[test]
    fn keeps_existing_trim_markers() {
        assert_eq!(
            preprocess("<!-- {{- if l10n_enabled -}} -->"),
            "{{- if l10n_enabled -}}"
        );
    }

    #[test]
    fn unwraps_multiple_actions_on_one_line() {
        assert_eq!(
            preprocess("<!-- {{ end }} {{ if auto_refresh }} -->"),
            "{{- end }} {{ if auto_refresh -}}"
        );
    }

    #[test]
    fn leaves_value_actions_wrapped() {
        let line = "    // {{ l10nScript }}";
        assert_eq!(preprocess(line), line);
    }

    #[test]
    fn leaves_lines_mixing_directives_and_text() {
        let line = "<!-- {{ if show_details }} --> <p>visible</p>";
        assert_eq!(preprocess(line), line);
        let line = "<!-- {{ if show_details }} note -->";
        assert_eq!(preprocess(line), line);
    }

    #[test]
    fn ignores_triple_slash_and_plain_comments() {
        let src = "/// {{ end }}\n<!-- plain comment -->\n// just js";
        assert_eq!(preprocess(src), src);
    }

    #[test]
    fn running_twice_is_stable() {
        let once = preprocess("<!-- {{ if show_details }} -->\nx\n/* {{ end }} */");
        assert_eq!(preprocess(&once), once);
    }
}
