//! Contexts shared across pipeline stages and rule invocations.

use std::path::PathBuf;
use std::sync::Arc;

use crate::arena::NodeArena;
use crate::arena::NodeIndex;
use crate::compilation::ClasspathScanner;
use crate::limits::SecurityLimits;
use crate::report::OutputFormat;
use crate::rules::{FormattingRule, RuleConfig};

/// Configured classpath/module-path entries, shared read-only across a
/// pipeline's lifetime.
#[derive(Debug, Clone, Default)]
pub struct ClasspathConfig {
    pub classpath_entries: Vec<PathBuf>,
    pub module_path_entries: Vec<PathBuf>,
}

/// Immutable, per-pipeline-invocation configuration shared by reference
/// across all four stages.
#[derive(Clone)]
pub struct ProcessingContext {
    pub file_path: PathBuf,
    pub security_limits: SecurityLimits,
    pub rule_configs: Vec<Arc<dyn RuleConfig>>,
    pub rules: Arc<Vec<Box<dyn FormattingRule>>>,
    pub validation_only: bool,
    pub output_format_override: Option<OutputFormat>,
    pub classpath_config: Arc<ClasspathConfig>,
    pub scanner: Arc<dyn ClasspathScanner>,
}

/// Immutable view passed to every [`FormattingRule`] call: the parsed arena,
/// the current source text (which changes between rules in fix mode), and
/// enough configuration for rules that need classpath lookups (e.g. an
/// import organizer resolving wildcard imports).
#[derive(Clone)]
pub struct TransformationContext {
    pub arena: Arc<NodeArena>,
    pub root: NodeIndex,
    pub source: String,
    pub file_path: PathBuf,
    pub limits: SecurityLimits,
    pub classpath_config: Arc<ClasspathConfig>,
    pub scanner: Arc<dyn ClasspathScanner>,
}

impl TransformationContext {
    /// Rebuilds the context around new source text, keeping arena/root/path
    /// as-is. Used between rules in fix mode (spec.md §4.4).
    pub fn with_source(&self, new_source: String) -> Self {
        TransformationContext { source: new_source, ..self.clone() }
    }
}

/// A function relating original line numbers to formatted line numbers.
///
/// [`LineMapping::identity`] is valid whenever no rule changed the source;
/// otherwise [`LineMapping::from_diff`] computes the bijection approximation
/// the FormatStage needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMapping {
    /// `mapping[i]` is the formatted line number (1-based) for original line
    /// `i + 1`.
    mapping: Vec<u32>,
}

impl LineMapping {
    /// The identity mapping over `line_count` lines.
    pub fn identity(line_count: usize) -> Self {
        LineMapping { mapping: (1..=line_count as u32).collect() }
    }

    /// Looks up the formatted line number for a 1-based original line.
    pub fn map_line(&self, original_line: u32) -> Option<u32> {
        self.mapping.get(original_line.checked_sub(1)? as usize).copied()
    }

    pub fn is_identity(&self) -> bool {
        self.mapping.iter().enumerate().all(|(i, &l)| l as usize == i + 1)
    }

    /// Computes an approximate bijection between `original` and `final_text`
    /// lines using a longest-common-subsequence line diff. Lines present in
    /// both are mapped directly; lines only in `original` (deleted) map to
    /// the nearest following retained line; a huge input (more lines than
    /// `max_diff_lines`) falls back to pairing lines positionally, which is
    /// still a valid (if cruder) approximation per spec.md §3.
    pub fn from_diff(original: &str, final_text: &str, max_diff_lines: usize) -> Self {
        let orig_lines: Vec<&str> = original.lines().collect();
        let new_lines: Vec<&str> = final_text.lines().collect();

        if orig_lines.len() > max_diff_lines || new_lines.len() > max_diff_lines {
            let mapping = (0..orig_lines.len())
                .map(|i| (i + 1).min(new_lines.len().max(1)) as u32)
                .collect();
            return LineMapping { mapping };
        }

        let n = orig_lines.len();
        let m = new_lines.len();
        // lcs[i][j] = length of the LCS of orig_lines[i..] and new_lines[j..]
        let mut lcs = vec![vec![0u32; m + 1]; n + 1];
        for i in (0..n).rev() {
            for j in (0..m).rev() {
                lcs[i][j] = if orig_lines[i] == new_lines[j] {
                    lcs[i + 1][j + 1] + 1
                } else {
                    lcs[i + 1][j].max(lcs[i][j + 1])
                };
            }
        }

        let mut mapping = Vec::with_capacity(n);
        let (mut i, mut j) = (0usize, 0usize);
        while i < n {
            if j < m && orig_lines[i] == new_lines[j] && lcs[i][j] == lcs[i + 1][j + 1] + 1 {
                mapping.push((j + 1) as u32);
                i += 1;
                j += 1;
            } else if j < m && lcs[i + 1][j] >= lcs[i][j + 1] {
                // original line i was deleted/replaced; anchor it to the next
                // retained formatted line.
                mapping.push((j + 1).min(m) as u32);
                i += 1;
            } else if j < m {
                j += 1;
            } else {
                mapping.push(m.max(1) as u32);
                i += 1;
            }
        }

        LineMapping { mapping }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mapping_maps_every_line_to_itself() {
        let mapping = LineMapping::identity(5);
        assert!(mapping.is_identity());
        assert_eq!(mapping.map_line(3), Some(3));
    }

    #[test]
    fn from_diff_is_identity_when_texts_match() {
        let text = "a\nb\nc\n";
        let mapping = LineMapping::from_diff(text, text, 10_000);
        assert!(mapping.is_identity());
    }

    #[test]
    fn from_diff_tracks_an_inserted_line() {
        let original = "a\nb\nc\n";
        let modified = "a\nx\nb\nc\n";
        let mapping = LineMapping::from_diff(original, modified, 10_000);
        assert_eq!(mapping.map_line(1), Some(1)); // "a"
        assert_eq!(mapping.map_line(2), Some(3)); // "b" shifted down by insertion
        assert_eq!(mapping.map_line(3), Some(4)); // "c"
    }
}
