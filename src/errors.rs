//! Unified error collection: [`ErrorContext`] normalizes failures from every
//! stage into one shape; [`ErrorReporter`] aggregates them (with a cap) and
//! renders human or machine (JSON) reports.
//!
//! This is the user-facing error/violation channel, distinct from the
//! operator-facing `tracing` diagnostics emitted at stage boundaries
//! (spec.md §4.7).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use regex::Regex;

use crate::parser::{SourcePosition, SourceRange};
use crate::snippet::SourceSnippetExtractor;

/// The five error categories named in spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Parse,
    Config,
    Format,
    Validation,
    System,
}

/// Matches the `Severity` used by rule violations, reused here so both
/// channels render consistently.
pub use crate::rules::Severity;

/// A single normalized error/finding, with enough context to render a
/// source snippet and (optionally) a suggested fix.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub error_code: String,
    pub file: PathBuf,
    pub source_range: Option<SourceRange>,
    pub source_text: String,
    pub message: String,
    pub suggested_fix: Option<String>,
    pub halt: bool,
}

fn location_regex() -> Regex {
    Regex::new(r"line\s+(\d+)(?:,\s*column\s+(\d+))?").unwrap()
}

/// Extracts a `(line[, column])` location from a free-text error message,
/// falling back to the start of the file.
fn extract_location(message: &str) -> SourcePosition {
    let re = location_regex();
    match re.captures(message) {
        Some(caps) => {
            let line: u32 = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
            let column: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
            SourcePosition { line, column }
        }
        None => SourcePosition::START,
    }
}

/// Collects [`ErrorContext`] values, capping intake at `max_errors` and
/// exposing a should-halt signal once the cap is reached.
///
/// Appends are mutex-guarded so a single reporter can be shared across
/// worker tasks (spec.md §5: "the `collectedErrors` container must tolerate
/// concurrent appends").
pub struct ErrorReporter {
    collected: Mutex<Vec<ErrorContext>>,
    max_errors: usize,
    should_halt: AtomicBool,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        ErrorReporter::new(100)
    }
}

impl ErrorReporter {
    pub fn new(max_errors: usize) -> Self {
        ErrorReporter { collected: Mutex::new(Vec::new()), max_errors, should_halt: AtomicBool::new(false) }
    }

    pub fn should_halt_processing(&self) -> bool {
        self.should_halt.load(Ordering::Acquire)
    }

    pub fn errors(&self) -> Vec<ErrorContext> {
        self.collected.lock().unwrap().clone()
    }

    pub fn error_count(&self) -> usize {
        self.collected.lock().unwrap().len()
    }

    /// The generic entry point every `report_*` helper below funnels through.
    pub fn report_error(&self, context: ErrorContext) {
        let mut guard = self.collected.lock().unwrap();
        if guard.len() >= self.max_errors {
            self.should_halt.store(true, Ordering::Release);
            return;
        }
        let halt = context.halt;
        guard.push(context);
        if guard.len() >= self.max_errors || halt {
            self.should_halt.store(true, Ordering::Release);
        }
    }

    pub fn report_parse_error(&self, file: PathBuf, source_text: &str, message: impl Into<String>) {
        let message = message.into();
        let position = extract_location(&message);
        self.report_error(ErrorContext {
            category: ErrorCategory::Parse,
            severity: Severity::Error,
            error_code: "PARSE_ERROR".to_string(),
            file,
            source_range: Some(SourceRange { start: position, end: position }),
            source_text: source_text.to_string(),
            message,
            suggested_fix: None,
            halt: true,
        });
    }

    pub fn report_config_error(&self, message: impl Into<String>) {
        self.report_error(ErrorContext {
            category: ErrorCategory::Config,
            severity: Severity::Error,
            error_code: "CONFIG_ERROR".to_string(),
            file: PathBuf::new(),
            source_range: None,
            source_text: String::new(),
            message: message.into(),
            suggested_fix: None,
            halt: true,
        });
    }

    pub fn report_violation(&self, violation: &crate::rules::FormattingViolation, source_text: &str) {
        let position = SourcePosition { line: violation.line, column: violation.column };
        self.report_error(ErrorContext {
            category: ErrorCategory::Format,
            severity: violation.severity,
            error_code: violation.rule_id.clone(),
            file: violation.file.clone(),
            source_range: Some(SourceRange { start: position, end: position }),
            source_text: source_text.to_string(),
            message: violation.message.clone(),
            suggested_fix: violation.suggested_fixes.first().map(|f| f.description.clone()),
            halt: false,
        });
    }

    pub fn report_system_error(&self, file: PathBuf, message: impl Into<String>) {
        self.report_error(ErrorContext {
            category: ErrorCategory::System,
            severity: Severity::Error,
            error_code: "SYSTEM_ERROR".to_string(),
            file,
            source_range: None,
            source_text: String::new(),
            message: message.into(),
            suggested_fix: None,
            halt: true,
        });
    }

    /// Renders every collected error as a human-readable, per-file report
    /// with extracted snippets.
    pub fn render_human(&self) -> String {
        let errors = self.errors();
        if errors.is_empty() {
            return "✅ No errors found\n".to_string();
        }
        let extractor = SourceSnippetExtractor;
        let mut out = String::new();
        let mut critical = 0usize;
        for err in &errors {
            if err.severity == Severity::Error {
                critical += 1;
            }
            out.push_str(&format!("{}: [{:?}/{:?}] {}\n", err.file.display(), err.category, err.severity, err.message));
            if let Some(range) = err.source_range {
                if !err.source_text.is_empty() {
                    out.push_str(&extractor.extract_snippet(&err.source_text, range, 2));
                }
            }
            if let Some(fix) = &err.suggested_fix {
                out.push_str(&format!("  suggested fix: {fix}\n"));
            }
        }
        out.push_str(&format!("Summary: {} errors, {} critical\n", errors.len(), critical));
        out
    }

    /// Renders every collected error as a JSON error report, one object per
    /// error plus a summary envelope. Every character outside the printable
    /// ASCII range (0x20-0x7E) is `\u`-escaped in the output, matching the
    /// escaping `javac`-style diagnostics tooling uses for non-ASCII source
    /// text embedded in messages and snippets.
    pub fn render_json(&self) -> String {
        let errors = self.errors();
        let extractor = SourceSnippetExtractor;
        let json_errors: Vec<serde_json::Value> = errors
            .iter()
            .map(|e| {
                let (line, column) = e.source_range.map(|r| (r.start.line, r.start.column)).unwrap_or((0, 0));
                let snippet = match e.source_range {
                    Some(range) if !e.source_text.is_empty() => Some(extractor.extract_snippet(&e.source_text, range, 2)),
                    _ => None,
                };
                serde_json::json!({
                    "type": "error",
                    "file": e.file.display().to_string(),
                    "line": line,
                    "column": column,
                    "category": format!("{:?}", e.category).to_lowercase(),
                    "severity": format!("{:?}", e.severity).to_lowercase(),
                    "code": e.error_code,
                    "message": e.message,
                    "suggestedFix": e.suggested_fix,
                    "sourceSnippet": snippet,
                })
            })
            .collect();

        let report = serde_json::json!({
            "type": "error-report",
            "timestamp": Utc::now().to_rfc3339(),
            "errorCount": errors.len(),
            "errors": json_errors,
        });
        let rendered = serde_json::to_string_pretty(&report)
            .unwrap_or_else(|e| format!("{{\"error\":\"failed to render error report: {e}\"}}"));
        escape_non_ascii(&rendered)
    }
}

/// Re-escapes every character above 0x7E in an already-serialized JSON string
/// as a `\uXXXX` sequence (surrogate pairs for code points above U+FFFF).
/// `serde_json` only escapes control characters and quote/backslash per RFC
/// 8259, leaving non-ASCII text as raw UTF-8; this walks the output
/// afterward to satisfy the stricter escaping error reports require. Every
/// JSON structural character (braces, colons, commas, quotes) is ASCII, so
/// escaping everything above 0x7E cannot corrupt the document's structure.
fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if (ch as u32) <= 0x7E {
            out.push(ch);
            continue;
        }
        let code_point = ch as u32;
        if code_point > 0xFFFF {
            let v = code_point - 0x10000;
            let high = 0xD800 + (v >> 10);
            let low = 0xDC00 + (v & 0x3FF);
            out.push_str(&format!("\\u{high:04x}\\u{low:04x}"));
        } else {
            out.push_str(&format!("\\u{code_point:04x}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_intake_at_max_errors_and_flips_should_halt() {
        let reporter = ErrorReporter::new(3);
        for i in 0..5 {
            reporter.report_config_error(format!("error {i}"));
        }
        assert_eq!(reporter.error_count(), 3);
        assert!(reporter.should_halt_processing());
    }

    #[test]
    fn extracts_line_and_column_from_message() {
        let pos = extract_location("unexpected token at line 12, column 5");
        assert_eq!(pos, SourcePosition { line: 12, column: 5 });
    }

    #[test]
    fn falls_back_to_start_of_file_when_no_location_found() {
        let pos = extract_location("something went wrong");
        assert_eq!(pos, SourcePosition::START);
    }

    #[test]
    fn json_report_has_expected_shape() {
        let reporter = ErrorReporter::default();
        reporter.report_config_error("bad toml");
        let json = reporter.render_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "error-report");
        assert_eq!(value["errorCount"], 1);
        assert_eq!(value["errors"][0]["category"], "config");
    }

    #[test]
    fn concurrent_appends_do_not_lose_entries() {
        use std::sync::Arc;
        use std::thread;

        let reporter = Arc::new(ErrorReporter::new(1000));
        let mut handles = Vec::new();
        for i in 0..8 {
            let reporter = Arc::clone(&reporter);
            handles.push(thread::spawn(move || {
                for j in 0..20 {
                    reporter.report_config_error(format!("thread {i} error {j}"));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reporter.error_count(), 160);
    }
}
