//! Context-window source snippet extraction for error/violation reports.

use crate::parser::SourceRange;

const MAX_LINE_LEN: usize = 120;
const TAB_WIDTH: usize = 4;

/// Extracts a formatted, caret-annotated snippet around `range`.
#[derive(Debug, Default)]
pub struct SourceSnippetExtractor;

impl SourceSnippetExtractor {
    /// Produces a snippet with `context_lines` of surrounding context on
    /// each side, tabs expanded to [`TAB_WIDTH`] spaces, lines truncated to
    /// [`MAX_LINE_LEN`] characters, and a caret indicator aligned to the
    /// expanded column. Multi-line ranges collapse to a single
    /// `^--- error starts here` marker at the start line.
    pub fn extract_snippet(&self, source: &str, range: SourceRange, context_lines: u32) -> String {
        let lines: Vec<&str> = source.lines().collect();
        let start_line = range.start.line;
        let end_line = range.end.line;

        if start_line == 0 || (start_line as usize) > lines.len() {
            return format!("(line {start_line} not found)");
        }

        let first = start_line.saturating_sub(context_lines).max(1);
        let last = (end_line + context_lines).min(lines.len() as u32);

        let gutter_width = last.to_string().len();
        let mut out = String::new();

        for lineno in first..=last {
            let raw = lines[(lineno - 1) as usize];
            let expanded = expand_tabs(raw);
            let (display, truncated) = truncate(&expanded);
            out.push_str(&format!("  {:>width$} | {}{}\n", lineno, display, if truncated { "..." } else { "" }, width = gutter_width));

            if lineno == start_line {
                if end_line > start_line {
                    out.push_str(&format!("{}^--- error starts here\n", " ".repeat(gutter_width + 5)));
                } else {
                    let caret_column = expanded_column(raw, range.start.column);
                    let marker_len = if end_line == start_line && range.end.column > range.start.column {
                        (range.end.column - range.start.column) as usize
                    } else {
                        1
                    };
                    out.push_str(&format!(
                        "{}{}{}\n",
                        " ".repeat(gutter_width + 5 + caret_column),
                        "^".repeat(marker_len.max(1)),
                        " error indicator"
                    ));
                }
            }
        }

        out
    }
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0usize;
    for ch in line.chars() {
        if ch == '\t' {
            let spaces = TAB_WIDTH - (col % TAB_WIDTH);
            out.push_str(&" ".repeat(spaces));
            col += spaces;
        } else {
            out.push(ch);
            col += 1;
        }
    }
    out
}

fn truncate(line: &str) -> (String, bool) {
    if line.chars().count() <= MAX_LINE_LEN {
        (line.to_string(), false)
    } else {
        (line.chars().take(MAX_LINE_LEN).collect(), true)
    }
}

/// Computes the expanded-column offset of `column` (1-based) within `raw`,
/// accounting for tabs expanding to [`TAB_WIDTH`] spaces each.
fn expanded_column(raw: &str, column: u32) -> usize {
    let mut expanded_col = 0usize;
    for (i, ch) in raw.chars().enumerate() {
        if i as u32 + 1 >= column {
            break;
        }
        if ch == '\t' {
            expanded_col += TAB_WIDTH - (expanded_col % TAB_WIDTH);
        } else {
            expanded_col += 1;
        }
    }
    expanded_col
}
