//! Tidying of evaluated markup.
//!
//! Runs on the rendered skeleton, before substituted values are filled in.

use regex::Regex;

use crate::{ProxyError, Result};

/// Most line breaks a row may span and still be judged.
const ROW_LOOKAHEAD: usize = 4;

const ROW_CLOSE: &str = "</tr>";

/// Pre-compiled patterns used after every render.
#[derive(Debug)]
pub(crate) struct Cleanup {
    /// Comment skins left empty once their directives were consumed.
    empty_skin: Regex,
    /// The opening of a table row.
    row_open: Regex,
    /// A table cell and its content.
    cell: Regex,
}

impl Cleanup {
    pub(crate) fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ProxyError::Template(format!("invalid cleanup pattern: {e}")))
        };
        Ok(Self {
            empty_skin: compile(r"<!--\s*-->|/\*\s*\*/")?,
            row_open: compile(r"<tr[\s>]")?,
            cell: compile(r"(?s)<td\b[^>]*>(.*?)</td>")?,
        })
    }

    /// Strips empty comment skins, then drops table rows whose last cell
    /// rendered empty.
    pub(crate) fn apply(&self, skeleton: &str) -> String {
        let stripped = self.empty_skin.replace_all(skeleton, "");
        self.drop_empty_rows(&stripped)
    }

    fn drop_empty_rows(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut copied = 0;
        let mut from = 0;

        while let Some((start, end)) = self.next_row(text, from) {
            from = end;
            if !self.last_cell_is_blank(&text[start..end]) {
                continue;
            }
            let (start, end) = whole_lines(text, start, end);
            let start = start.max(copied);
            out.push_str(&text[copied..start]);
            copied = end;
        }

        out.push_str(&text[copied..]);
        out
    }

    /// Finds the next row at or after `from`, as a byte range.
    ///
    /// Rows with another row opening inside them, or spanning more than
    /// [`ROW_LOOKAHEAD`] line breaks, are skipped.
    fn next_row(&self, text: &str, mut from: usize) -> Option<(usize, usize)> {
        loop {
            let start = from + self.row_open.find(&text[from..])?.start();
            let body = start + 3;
            let close = body + text[body..].find(ROW_CLOSE)?;
            let end = close + ROW_CLOSE.len();

            let nested = self.row_open.is_match(&text[body..close]);
            if !nested && text[start..end].matches('\n').count() <= ROW_LOOKAHEAD {
                return Some((start, end));
            }
            from = body;
        }
    }

    fn last_cell_is_blank(&self, row: &str) -> bool {
        self.cell
            .captures_iter(row)
            .last()
            .and_then(|cell| cell.get(1))
            .is_some_and(|value| value.as_str().trim().is_empty())
    }
}

/// Widens `start..end` to the whole lines it covers, line break included,
/// when nothing else shares those lines.
fn whole_lines(text: &str, start: usize, end: usize) -> (usize, usize) {
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);

    if !text[line_start..start].trim().is_empty() || !text[end..line_end].trim().is_empty() {
        return (start, end);
    }
    if line_end < text.len() {
        (line_start, line_end + 1)
    } else {
        (line_start.saturating_sub(1), line_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleanup() -> Cleanup {
        Cleanup::new().unwrap()
    }

    #[test]
    fn strips_empty_comment_skins() {
        assert_eq!(cleanup().apply("a<!--  -->b/* */c"), "abc");
        assert_eq!(cleanup().apply("<!-- keep -->"), "<!-- keep -->");
    }

    #[test]
    fn drops_multi_line_row_with_empty_value() {
        let html = "<table>\n  <tr>\n    <td>Host</td>\n    <td>  </td>\n  </tr>\n  <tr>\n    <td>URI</td>\n    <td>/x</td>\n  </tr>\n</table>";
        assert_eq!(
            cleanup().apply(html),
            "<table>\n  <tr>\n    <td>URI</td>\n    <td>/x</td>\n  </tr>\n</table>"
        );
    }

    #[test]
    fn drops_single_line_row_with_empty_value() {
        let html = "<tr class=\"r\"><td>Request ID</td><td></td></tr>\n<tr><td>a</td><td>b</td></tr>";
        assert_eq!(cleanup().apply(html), "<tr><td>a</td><td>b</td></tr>");
    }

    #[test]
    fn judges_each_row_on_a_shared_line() {
        let html = "<table><tr><td>Host</td><td></td></tr><tr><td>URI</td><td>/x</td></tr></table>";
        assert_eq!(
            cleanup().apply(html),
            "<table><tr><td>URI</td><td>/x</td></tr></table>"
        );

        let html = "<tr><td>a</td><td>b</td></tr><tr><td>c</td><td> </td></tr>\n<p>x</p>";
        assert_eq!(cleanup().apply(html), "<tr><td>a</td><td>b</td></tr>\n<p>x</p>");
    }

    #[test]
    fn drops_trailing_row_with_its_line_break() {
        assert_eq!(cleanup().apply("<p>x</p>\n  <tr><td>k</td><td></td></tr>"), "<p>x</p>");
    }

    #[test]
    fn keeps_rows_closing_beyond_lookahead() {
        let html = "<tr>\n<td>a</td>\n\n\n\n<td></td>\n</tr>";
        assert_eq!(cleanup().apply(html), html);
    }

    #[test]
    fn keeps_rows_without_cells_and_other_tags() {
        let html = "<tr><th>Header</th></tr>\n<track src=\"x\">";
        assert_eq!(cleanup().apply(html), html);
    }

    #[test]
    fn is_idempotent() {
        let html = "<tr>\n<td>k</td>\n<td></td>\n</tr>\n<p>x</p><!-- -->";
        let once = cleanup().apply(html);
        assert_eq!(cleanup().apply(&once), once);
    }
}
