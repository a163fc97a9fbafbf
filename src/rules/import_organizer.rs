//! A concrete, deliberately small `FormattingRule`: sorts import
//! declarations into a canonical order. It exists to exercise the rule
//! engine end-to-end (spec.md §8 scenarios 3/4); it is not meant to be a
//! complete Java import organizer.

use std::any::Any;
use std::sync::Arc;

use crate::arena::NodeType;
use crate::context::TransformationContext;

use super::{find_config, FormattingRule, FormattingViolation, RuleConfig, RuleError, Severity};

/// Per-rule configuration for [`ImportOrganizerRule`].
#[derive(Debug, Clone)]
pub struct ImportOrganizerConfig {
    pub rule_id: String,
    /// When `true` (the default), static imports are grouped before
    /// non-static imports; otherwise they're sorted into one combined list.
    pub static_imports_first: bool,
}

impl Default for ImportOrganizerConfig {
    fn default() -> Self {
        ImportOrganizerConfig { rule_id: ImportOrganizerRule::ID.to_string(), static_imports_first: true }
    }
}

impl RuleConfig for ImportOrganizerConfig {
    fn rule_id(&self) -> &str {
        &self.rule_id
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportEntry {
    start: u32,
    end: u32,
    qualified_name: String,
    is_static: bool,
}

/// Sorts `import`/`import static` declarations into canonical order.
#[derive(Debug, Default)]
pub struct ImportOrganizerRule;

impl ImportOrganizerRule {
    pub const ID: &'static str = "import-organizer";

    fn collect_imports(tx_ctx: &TransformationContext) -> Vec<ImportEntry> {
        let mut entries = Vec::new();
        for idx in tx_ctx.arena.iter_indices() {
            if tx_ctx.arena.get_type(idx) != Ok(NodeType::ImportDeclaration) {
                continue;
            }
            let Ok((qualified_name, is_static)) = tx_ctx.arena.get_import_attribute(idx) else { continue };
            let start = tx_ctx.arena.get_start(idx).unwrap_or_default();
            let end = tx_ctx.arena.get_end(idx).unwrap_or_default();
            entries.push(ImportEntry { start, end, qualified_name: qualified_name.to_string(), is_static });
        }
        entries.sort_by_key(|e| e.start);
        entries
    }

    fn canonical_order(mut imports: Vec<ImportEntry>, static_first: bool) -> Vec<ImportEntry> {
        imports.sort_by(|a, b| {
            if static_first && a.is_static != b.is_static {
                b.is_static.cmp(&a.is_static) // static (true) sorts first
            } else {
                a.qualified_name.cmp(&b.qualified_name)
            }
        });
        imports
    }
}

impl FormattingRule for ImportOrganizerRule {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Import Organizer"
    }

    fn description(&self) -> &str {
        "Sorts import declarations into a canonical, deterministic order."
    }

    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn analyze(
        &self,
        tx_ctx: &TransformationContext,
        rule_configs: Option<&[Arc<dyn RuleConfig>]>,
    ) -> Result<Vec<FormattingViolation>, RuleError> {
        let config = find_config::<ImportOrganizerConfig>(self.id(), rule_configs)?;
        let static_first = config.map(|c| c.static_imports_first).unwrap_or(true);

        let original = Self::collect_imports(tx_ctx);
        if original.len() < 2 {
            return Ok(Vec::new());
        }
        let canonical = Self::canonical_order(original.clone(), static_first);
        if original == canonical {
            return Ok(Vec::new());
        }

        let block_start = original.iter().map(|e| e.start).min().unwrap();
        let block_end = original.iter().map(|e| e.end).max().unwrap();
        let line = tx_ctx.source[..block_start as usize].matches('\n').count() as u32 + 1;

        let replacement_text = canonical
            .iter()
            .map(|e| &tx_ctx.source[e.start as usize..e.end as usize])
            .collect::<Vec<_>>()
            .join("\n");

        Ok(vec![FormattingViolation {
            rule_id: self.id().to_string(),
            severity: self.default_severity(),
            message: "import declarations are not in canonical order".to_string(),
            file: tx_ctx.file_path.clone(),
            byte_start: block_start,
            byte_end: block_end,
            line,
            column: 1,
            suggested_fixes: vec![super::FixStrategy {
                description: "sort imports".to_string(),
                auto_applicable: true,
                replacement_text,
                byte_start: block_start,
                byte_end: block_end,
            }],
        }])
    }

    fn format(
        &self,
        tx_ctx: &TransformationContext,
        rule_configs: Option<&[Arc<dyn RuleConfig>]>,
    ) -> Result<String, RuleError> {
        let config = find_config::<ImportOrganizerConfig>(self.id(), rule_configs)?;
        let static_first = config.map(|c| c.static_imports_first).unwrap_or(true);

        let original = Self::collect_imports(tx_ctx);
        if original.len() < 2 {
            return Ok(tx_ctx.source.clone());
        }
        let canonical = Self::canonical_order(original.clone(), static_first);
        if original == canonical {
            return Ok(tx_ctx.source.clone());
        }

        let block_start = original.iter().map(|e| e.start).min().unwrap() as usize;
        let block_end = original.iter().map(|e| e.end).max().unwrap() as usize;

        let mut result = String::with_capacity(tx_ctx.source.len());
        result.push_str(&tx_ctx.source[..block_start]);
        for (i, entry) in canonical.iter().enumerate() {
            if i > 0 {
                result.push('\n');
            }
            result.push_str(&tx_ctx.source[entry.start as usize..entry.end as usize]);
        }
        result.push_str(&tx_ctx.source[block_end..]);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::compilation::FsClasspathScanner;
    use crate::context::ClasspathConfig;
    use crate::limits::SecurityLimits;
    use crate::parser::{ConservativeParser, ParseOutcome, Parser as _};

    fn context_for(source: &str) -> TransformationContext {
        let limits = SecurityLimits::default();
        let outcome = ConservativeParser.parse(source, &limits);
        let ParseOutcome::Success { arena, root } = outcome else { panic!("expected successful parse") };
        TransformationContext {
            arena: Arc::new(arena),
            root,
            source: source.to_string(),
            file_path: PathBuf::from("Foo.java"),
            limits,
            classpath_config: Arc::new(ClasspathConfig::default()),
            scanner: Arc::new(FsClasspathScanner::create(&[]).unwrap()),
        }
    }

    #[test]
    fn analyze_reports_unsorted_imports() {
        let source = "package com.example;\n\nimport java.util.List;\nimport com.foo.Bar;\n\npublic class Foo {}\n";
        let ctx = context_for(source);
        let violations = ImportOrganizerRule.analyze(&ctx, None).unwrap_err();
        // rule_configs == None is a null list: analyze must reject it outright.
        assert!(matches!(violations, RuleError::NullConfigList { .. }));

        let violations = ImportOrganizerRule.analyze(&ctx, Some(&[])).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, "import-organizer");
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    #[test]
    fn analyze_is_empty_when_already_sorted() {
        let source = "package com.example;\n\nimport com.foo.Bar;\nimport java.util.List;\n\npublic class Foo {}\n";
        let ctx = context_for(source);
        let violations = ImportOrganizerRule.analyze(&ctx, Some(&[])).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn format_sorts_imports_and_is_idempotent() {
        let source = "package com.example;\n\nimport java.util.List;\nimport com.foo.Bar;\n\npublic class Foo {}\n";
        let ctx = context_for(source);
        let formatted = ImportOrganizerRule.format(&ctx, Some(&[])).unwrap();
        assert!(formatted.find("com.foo.Bar").unwrap() < formatted.find("java.util.List").unwrap());

        let ctx2 = context_for(&formatted);
        let formatted_again = ImportOrganizerRule.format(&ctx2, Some(&[])).unwrap();
        assert_eq!(formatted, formatted_again, "running the rule twice must be idempotent");

        let residual = ImportOrganizerRule.analyze(&ctx2, Some(&[])).unwrap();
        assert!(residual.is_empty());
    }
}
