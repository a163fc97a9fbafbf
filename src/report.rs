//! Aggregated per-file violation reports and their human/JSON renderers.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::rules::{FormattingViolation, Severity};

/// Selects which renderer [`crate::pipeline::OutputStage`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    /// Auto-detects a format when none was configured: JSON when stdout is
    /// non-interactive or an AI/CI environment variable is set, human
    /// otherwise (spec.md §6).
    pub fn detect() -> Self {
        let ai_or_ci = ["CI", "CLAUDECODE", "GITHUB_ACTIONS"].iter().any(|v| std::env::var_os(v).is_some());
        if ai_or_ci || !Self::stdout_is_interactive() {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    #[cfg(unix)]
    fn stdout_is_interactive() -> bool {
        // A real embedder would call isatty(3) on STDOUT_FILENO; the core
        // stays dependency-free here since terminal-color detection is
        // explicitly out of scope (spec.md §1) and only the *selection*
        // policy is core.
        std::env::var_os("TERM").is_some()
    }

    #[cfg(not(unix))]
    fn stdout_is_interactive() -> bool {
        true
    }
}

/// Per-file violations grouped and counted by `rule_id`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ViolationReport {
    pub file_path: PathBuf,
    pub violations: Vec<FormattingViolation>,
    pub counts: HashMap<String, usize>,
}

impl ViolationReport {
    pub fn new(file_path: PathBuf, violations: Vec<FormattingViolation>) -> Self {
        let mut counts = HashMap::new();
        for v in &violations {
            *counts.entry(v.rule_id.clone()).or_insert(0) += 1;
        }
        ViolationReport { file_path, violations, counts }
    }

    pub fn critical_count(&self) -> usize {
        self.violations.iter().filter(|v| v.severity == Severity::Error).count()
    }
}

/// Renders a [`ViolationReport`] in the requested [`OutputFormat`].
pub fn render(report: &ViolationReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Human => render_human(report),
        OutputFormat::Json => render_json(report),
    }
}

fn render_human(report: &ViolationReport) -> String {
    if report.violations.is_empty() {
        return format!("✅ No errors found in {}\n", report.file_path.display());
    }

    let mut out = String::new();
    out.push_str(&format!("{}\n", report.file_path.display()));
    for v in &report.violations {
        out.push_str(&format!(
            "  {}:{}: [{:?}] {} ({})\n",
            v.line, v.column, v.severity, v.message, v.rule_id
        ));
        if let Some(fix) = v.suggested_fixes.first() {
            out.push_str(&format!("    suggested fix: {}\n", fix.description));
        }
    }
    out.push_str(&format!(
        "Summary: {} violations, {} critical\n",
        report.violations.len(),
        report.critical_count()
    ));
    out
}

fn render_json(report: &ViolationReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\":\"failed to render report: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_report_renders_success_banner() {
        let report = ViolationReport::new(PathBuf::from("Foo.java"), vec![]);
        let rendered = render(&report, OutputFormat::Human);
        assert!(rendered.starts_with("✅ No errors found"));
    }

    #[test]
    fn counts_are_grouped_by_rule_id() {
        let violation = FormattingViolation {
            rule_id: "import-organizer".to_string(),
            severity: Severity::Warning,
            message: "unsorted".to_string(),
            file: PathBuf::from("Foo.java"),
            byte_start: 0,
            byte_end: 1,
            line: 1,
            column: 1,
            suggested_fixes: vec![],
        };
        let report = ViolationReport::new(PathBuf::from("Foo.java"), vec![violation.clone(), violation]);
        assert_eq!(report.counts.get("import-organizer"), Some(&2));
    }

    #[test]
    fn json_rendering_round_trips() {
        let report = ViolationReport::new(PathBuf::from("Foo.java"), vec![]);
        let rendered = render(&report, OutputFormat::Json);
        let parsed: ViolationReport = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed.file_path, report.file_path);
    }
}
