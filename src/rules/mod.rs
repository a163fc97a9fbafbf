//! The formatting-rule contract: ordered rules that inspect
//! ([`FormattingRule::analyze`]) and optionally rewrite
//! ([`FormattingRule::format`]) a [`TransformationContext`]'s source text.

mod import_organizer;

pub use import_organizer::{ImportOrganizerConfig, ImportOrganizerRule};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::context::TransformationContext;

/// Finding severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single candidate fix for a [`FormattingViolation`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FixStrategy {
    pub description: String,
    pub auto_applicable: bool,
    pub replacement_text: String,
    pub byte_start: u32,
    pub byte_end: u32,
}

/// A finding produced by [`FormattingRule::analyze`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FormattingViolation {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub file: std::path::PathBuf,
    pub byte_start: u32,
    pub byte_end: u32,
    pub line: u32,
    pub column: u32,
    pub suggested_fixes: Vec<FixStrategy>,
}

/// Errors a rule's `analyze`/`format` call can raise.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule '{rule_id}' received a null configuration list")]
    NullConfigList { rule_id: String },

    #[error("rule '{rule_id}' found no compatible configuration in the supplied list")]
    MissingConfig { rule_id: String },

    #[error("rule '{rule_id}' received a configuration of the wrong type")]
    ConfigTypeMismatch { rule_id: String },
}

/// A per-rule configuration payload. Concrete config types implement this so
/// rules can find and downcast their own entry out of the ordered
/// `rule_configs` list (every rule sees the whole list, by design — see
/// spec.md §4.4's note on cooperating rules).
pub trait RuleConfig: fmt::Debug + Send + Sync {
    /// The `rule_id` this configuration applies to.
    fn rule_id(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// Looks up `rule_id`'s configuration in `configs` and downcasts it to `T`.
///
/// `configs == None` models the "null list" case from spec.md §4.5 and is
/// always an error. An empty slice is *not* an error — it means "use this
/// rule's default configuration" — so callers that can operate with no
/// config at all should treat `Ok(None)` distinctly from a missing entry in
/// a non-empty list; this helper returns `Err(MissingConfig)` either way and
/// callers wanting default-on-empty behavior should check
/// `configs.map_or(true, |c| c.is_empty())` before calling.
pub fn find_config<'a, T: 'static>(rule_id: &str, configs: Option<&'a [Arc<dyn RuleConfig>]>) -> Result<Option<&'a T>, RuleError> {
    let configs = configs.ok_or_else(|| RuleError::NullConfigList { rule_id: rule_id.to_string() })?;
    if configs.is_empty() {
        return Ok(None);
    }
    let Some(entry) = configs.iter().find(|c| c.rule_id() == rule_id) else {
        return Ok(None);
    };
    entry.as_any().downcast_ref::<T>().map(Some).ok_or_else(|| RuleError::ConfigTypeMismatch { rule_id: rule_id.to_string() })
}

/// A formatting concern with a stable id, able to both inspect
/// ([`FormattingRule::analyze`]) and rewrite ([`FormattingRule::format`]) a
/// source file.
///
/// Rules run in pipeline-declared order and do not see each other's
/// violations; each rule must be idempotent on its own output (spec.md
/// §4.5, §8).
pub trait FormattingRule: Send + Sync {
    /// Stable identifier, e.g. `"import-organizer"`.
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn default_severity(&self) -> Severity;

    /// Pure inspection: reports violations without changing anything.
    fn analyze(
        &self,
        tx_ctx: &TransformationContext,
        rule_configs: Option<&[Arc<dyn RuleConfig>]>,
    ) -> Result<Vec<FormattingViolation>, RuleError>;

    /// Produces a new source text. A rule that sees nothing to change must
    /// return the input (`tx_ctx.source`) unchanged.
    fn format(
        &self,
        tx_ctx: &TransformationContext,
        rule_configs: Option<&[Arc<dyn RuleConfig>]>,
    ) -> Result<String, RuleError>;
}
