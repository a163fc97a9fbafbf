//! The fixed four-stage chain (`parse -> format -> validate -> output`) and
//! the pipeline that drives it across one or many files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

use crate::arena::{NodeArena, NodeIndex};
use crate::compilation::{ClasspathScanner, CompilationValidationResult, CompilationValidator, FsClasspathScanner, ScannerError};
use crate::context::{ClasspathConfig, LineMapping, ProcessingContext, TransformationContext};
use crate::limits::SecurityLimits;
use crate::parser::{ConservativeParser, ParseOutcome, Parser};
use crate::report::{self, OutputFormat, ViolationReport};
use crate::rules::{FormattingRule, FormattingViolation, RuleConfig, RuleError};
use crate::stage::{self, PipelineStage, StageOutcome, StageResult};

/// The maximum number of lines [`LineMapping::from_diff`] diffs exactly
/// before falling back to a positional approximation.
const MAX_DIFF_LINES: usize = 20_000;

/// Renders a stage failure for [`PipelineResult::stage_results`], appending
/// the cause chain (if any) so it isn't dropped on the floor.
fn failure_display(message: &str, cause: Option<&(dyn std::error::Error + Send + Sync)>) -> String {
    match cause {
        Some(cause) => format!("{message}; caused by: {cause}"),
        None => message.to_string(),
    }
}

/// Errors a pipeline stage can raise.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("I/O error reading {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("parse failed for {file}: {message}")]
    Parse { file: PathBuf, message: String },

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Scanner(#[from] ScannerError),
}

/// ParseStage's output: a populated arena plus the source text it was built
/// from.
pub struct ParsedData {
    pub arena: Arc<NodeArena>,
    pub root: NodeIndex,
    pub source: String,
    pub file_path: PathBuf,
}

/// FormatStage's output: the (possibly rewritten) final source, residual
/// violations, and the line mapping back to the original.
pub struct FormatResult {
    pub final_source: String,
    pub violations: Vec<FormattingViolation>,
    pub line_mapping: LineMapping,
}

/// The result of running the full chain for one file. The owned arena is
/// dropped along with this value, releasing its memory.
pub struct PipelineResult {
    pub file_path: PathBuf,
    pub stage_results: Vec<String>,
    pub processing_time: Duration,
    pub overall_success: bool,
    pub final_source: Option<String>,
    pub report: Option<ViolationReport>,
    pub rendered_output: Option<String>,
    #[allow(dead_code)]
    arena: Option<Arc<NodeArena>>,
}

/// Reads and parses a source file into a [`NodeArena`].
pub struct ParseStage {
    parser: Arc<dyn Parser + Send + Sync>,
}

impl PipelineStage for ParseStage {
    type Input = Arc<ProcessingContext>;
    type Output = ParsedData;
    type Error = PipelineError;

    fn stage_name(&self) -> &'static str {
        "parse"
    }

    fn execute_stage(&self, context: Self::Input) -> Result<StageOutcome<Self::Output>, Self::Error> {
        let path = &context.file_path;
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.clone()));
        }
        let source = std::fs::read_to_string(path).map_err(|e| PipelineError::Io { path: path.clone(), source: e })?;

        match self.parser.parse(&source, &context.security_limits) {
            ParseOutcome::Success { arena, root } => {
                Ok(StageOutcome::Success(ParsedData { arena: Arc::new(arena), root, source, file_path: path.clone() }))
            }
            ParseOutcome::Failure { message, .. } => Err(PipelineError::Parse { file: path.clone(), message }),
        }
    }
}

/// Runs every configured rule, either as pure analysis (validation-only) or
/// as a sequential rewrite (fix mode).
pub struct FormatStage;

impl PipelineStage for FormatStage {
    type Input = (Arc<ProcessingContext>, ParsedData);
    type Output = FormatResult;
    type Error = PipelineError;

    fn stage_name(&self) -> &'static str {
        "format"
    }

    fn execute_stage(&self, (context, parsed): Self::Input) -> Result<StageOutcome<Self::Output>, Self::Error> {
        let rule_configs: Option<&[Arc<dyn RuleConfig>]> = Some(context.rule_configs.as_slice());
        let original_source = parsed.source.clone();

        let mut tx_ctx = TransformationContext {
            arena: parsed.arena,
            root: parsed.root,
            source: parsed.source,
            file_path: parsed.file_path.clone(),
            limits: context.security_limits,
            classpath_config: Arc::clone(&context.classpath_config),
            scanner: Arc::clone(&context.scanner),
        };

        if context.validation_only {
            let mut violations = Vec::new();
            for rule in context.rules.iter() {
                violations.extend(rule.analyze(&tx_ctx, rule_configs)?);
            }
            let line_count = tx_ctx.source.lines().count();
            return Ok(StageOutcome::Success(FormatResult {
                final_source: tx_ctx.source,
                violations,
                line_mapping: LineMapping::identity(line_count),
            }));
        }

        for rule in context.rules.iter() {
            let next_source = rule.format(&tx_ctx, rule_configs)?;
            tx_ctx = tx_ctx.with_source(next_source);
        }

        let mut residual = Vec::new();
        for rule in context.rules.iter() {
            residual.extend(rule.analyze(&tx_ctx, rule_configs)?);
        }

        let line_mapping = LineMapping::from_diff(&original_source, &tx_ctx.source, MAX_DIFF_LINES);

        Ok(StageOutcome::Success(FormatResult { final_source: tx_ctx.source, violations: residual, line_mapping }))
    }
}

/// Groups the previous stage's violations into a [`ViolationReport`].
pub struct ValidateStage;

impl PipelineStage for ValidateStage {
    type Input = (Arc<ProcessingContext>, FormatResult);
    type Output = ViolationReport;
    type Error = PipelineError;

    fn stage_name(&self) -> &'static str {
        "validate"
    }

    fn execute_stage(&self, (context, format_result): Self::Input) -> Result<StageOutcome<Self::Output>, Self::Error> {
        Ok(StageOutcome::Success(ViolationReport::new(context.file_path.clone(), format_result.violations)))
    }
}

/// Renders the report in the configured (or auto-detected) output format.
pub struct OutputStage;

impl PipelineStage for OutputStage {
    type Input = (Arc<ProcessingContext>, ViolationReport);
    type Output = String;
    type Error = PipelineError;

    fn stage_name(&self) -> &'static str {
        "output"
    }

    fn execute_stage(&self, (context, violation_report): Self::Input) -> Result<StageOutcome<Self::Output>, Self::Error> {
        let format = context.output_format_override.unwrap_or(OutputFormat::Human);
        Ok(StageOutcome::Success(report::render(&violation_report, format)))
    }
}

/// Builds a [`FileProcessingPipeline`] from security limits, rules, rule
/// configurations, mode flags, and classpath configuration.
#[derive(Default)]
pub struct FileProcessingPipelineBuilder {
    security_limits: SecurityLimits,
    rules: Vec<Box<dyn FormattingRule>>,
    rule_configs: Vec<Arc<dyn RuleConfig>>,
    validation_only: bool,
    output_format_override: Option<OutputFormat>,
    classpath_config: ClasspathConfig,
    max_parallel_files: usize,
}

impl FileProcessingPipelineBuilder {
    pub fn new() -> Self {
        FileProcessingPipelineBuilder { max_parallel_files: 8, ..Default::default() }
    }

    pub fn security_limits(mut self, limits: SecurityLimits) -> Self {
        self.security_limits = limits;
        self
    }

    pub fn rule(mut self, rule: Box<dyn FormattingRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_config(mut self, config: Arc<dyn RuleConfig>) -> Self {
        self.rule_configs.push(config);
        self
    }

    pub fn validation_only(mut self, value: bool) -> Self {
        self.validation_only = value;
        self
    }

    pub fn output_format_override(mut self, format: Option<OutputFormat>) -> Self {
        self.output_format_override = format;
        self
    }

    pub fn classpath_config(mut self, config: ClasspathConfig) -> Self {
        self.classpath_config = config;
        self
    }

    pub fn max_parallel_files(mut self, max: usize) -> Self {
        self.max_parallel_files = max.max(1);
        self
    }

    pub fn build(self) -> Result<FileProcessingPipeline, PipelineError> {
        let mut entries = self.classpath_config.classpath_entries.clone();
        entries.extend(self.classpath_config.module_path_entries.clone());
        let scanner: Arc<dyn ClasspathScanner> = Arc::new(FsClasspathScanner::create(&entries)?);

        Ok(FileProcessingPipeline {
            security_limits: self.security_limits,
            rules: Arc::new(self.rules),
            rule_configs: self.rule_configs,
            validation_only: self.validation_only,
            output_format_override: self.output_format_override,
            classpath_config: Arc::new(self.classpath_config),
            scanner,
            parse_stage: ParseStage { parser: Arc::new(ConservativeParser) },
            format_stage: FormatStage,
            validate_stage: ValidateStage,
            output_stage: OutputStage,
            max_parallel_files: self.max_parallel_files,
        })
    }
}

/// The fixed `parse -> format -> validate -> output` chain, plus a shared
/// [`ClasspathScanner`] owned by the pipeline and released on drop.
pub struct FileProcessingPipeline {
    security_limits: SecurityLimits,
    rules: Arc<Vec<Box<dyn FormattingRule>>>,
    rule_configs: Vec<Arc<dyn RuleConfig>>,
    validation_only: bool,
    output_format_override: Option<OutputFormat>,
    classpath_config: Arc<ClasspathConfig>,
    scanner: Arc<dyn ClasspathScanner>,
    parse_stage: ParseStage,
    format_stage: FormatStage,
    validate_stage: ValidateStage,
    output_stage: OutputStage,
    max_parallel_files: usize,
}

impl FileProcessingPipeline {
    pub fn builder() -> FileProcessingPipelineBuilder {
        FileProcessingPipelineBuilder::new()
    }

    fn context_for(&self, file_path: PathBuf) -> Arc<ProcessingContext> {
        Arc::new(ProcessingContext {
            file_path,
            security_limits: self.security_limits,
            rule_configs: self.rule_configs.clone(),
            rules: Arc::clone(&self.rules),
            validation_only: self.validation_only,
            output_format_override: self.output_format_override,
            classpath_config: Arc::clone(&self.classpath_config),
            scanner: Arc::clone(&self.scanner),
        })
    }

    /// Runs the full chain for a single file. Never panics: every stage
    /// failure is recorded in the returned [`PipelineResult`] instead.
    #[instrument(skip(self), fields(file = %path.as_ref().display()))]
    pub async fn process_file(&self, path: impl AsRef<Path>) -> PipelineResult {
        let path = path.as_ref().to_path_buf();
        let started = Instant::now();
        let context = self.context_for(path.clone());

        let mut stage_results = Vec::new();

        let parsed = match stage::execute(&self.parse_stage, Arc::clone(&context)) {
            StageResult::Success(output) => {
                stage_results.push("parse: success".to_string());
                output
            }
            StageResult::Skipped { reason } => {
                stage_results.push(format!("parse: skipped ({reason})"));
                return PipelineResult {
                    file_path: path,
                    stage_results,
                    processing_time: started.elapsed(),
                    overall_success: false,
                    final_source: None,
                    report: None,
                    rendered_output: None,
                    arena: None,
                };
            }
            StageResult::Failure { message, cause } => {
                stage_results.push(format!("parse: failure ({})", failure_display(&message, cause.as_deref())));
                return PipelineResult {
                    file_path: path,
                    stage_results,
                    processing_time: started.elapsed(),
                    overall_success: false,
                    final_source: None,
                    report: None,
                    rendered_output: None,
                    arena: None,
                };
            }
        };

        let arena = Arc::clone(&parsed.arena);

        let format_result = match stage::execute(&self.format_stage, (Arc::clone(&context), parsed)) {
            StageResult::Success(output) => {
                stage_results.push("format: success".to_string());
                output
            }
            StageResult::Skipped { reason } => {
                stage_results.push(format!("format: skipped ({reason})"));
                return PipelineResult {
                    file_path: path,
                    stage_results,
                    processing_time: started.elapsed(),
                    overall_success: false,
                    final_source: None,
                    report: None,
                    rendered_output: None,
                    arena: Some(arena),
                };
            }
            StageResult::Failure { message, cause } => {
                stage_results.push(format!("format: failure ({})", failure_display(&message, cause.as_deref())));
                return PipelineResult {
                    file_path: path,
                    stage_results,
                    processing_time: started.elapsed(),
                    overall_success: false,
                    final_source: None,
                    report: None,
                    rendered_output: None,
                    arena: Some(arena),
                };
            }
        };

        let final_source = format_result.final_source.clone();

        let report = match stage::execute(&self.validate_stage, (Arc::clone(&context), format_result)) {
            StageResult::Success(output) => {
                stage_results.push("validate: success".to_string());
                output
            }
            StageResult::Skipped { reason } => {
                stage_results.push(format!("validate: skipped ({reason})"));
                return PipelineResult {
                    file_path: path,
                    stage_results,
                    processing_time: started.elapsed(),
                    overall_success: false,
                    final_source: Some(final_source),
                    report: None,
                    rendered_output: None,
                    arena: Some(arena),
                };
            }
            StageResult::Failure { message, cause } => {
                stage_results.push(format!("validate: failure ({})", failure_display(&message, cause.as_deref())));
                return PipelineResult {
                    file_path: path,
                    stage_results,
                    processing_time: started.elapsed(),
                    overall_success: false,
                    final_source: Some(final_source),
                    report: None,
                    rendered_output: None,
                    arena: Some(arena),
                };
            }
        };

        let rendered = match stage::execute(&self.output_stage, (context, report.clone())) {
            StageResult::Success(output) => {
                stage_results.push("output: success".to_string());
                Some(output)
            }
            StageResult::Skipped { reason } => {
                stage_results.push(format!("output: skipped ({reason})"));
                None
            }
            StageResult::Failure { message, cause } => {
                stage_results.push(format!("output: failure ({})", failure_display(&message, cause.as_deref())));
                return PipelineResult {
                    file_path: path,
                    stage_results,
                    processing_time: started.elapsed(),
                    overall_success: false,
                    final_source: Some(final_source),
                    report: Some(report),
                    rendered_output: None,
                    arena: Some(arena),
                };
            }
        };

        info!(file = %path.display(), violations = report.violations.len(), "processed file");

        PipelineResult {
            file_path: path,
            stage_results,
            processing_time: started.elapsed(),
            overall_success: true,
            final_source: Some(final_source),
            report: Some(report),
            rendered_output: rendered,
            arena: Some(arena),
        }
    }

    /// Runs [`FileProcessingPipeline::process_file`] over every path, bounding
    /// concurrent in-flight files at `max_parallel_files`.
    pub async fn process_files(&self, paths: &[PathBuf]) -> Vec<PipelineResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_files));
        let mut handles = Vec::with_capacity(paths.len());

        for path in paths {
            let semaphore = Arc::clone(&semaphore);
            let path = path.clone();
            let rules = Arc::clone(&self.rules);
            let scanner = Arc::clone(&self.scanner);
            let classpath_config = Arc::clone(&self.classpath_config);
            let security_limits = self.security_limits;
            let rule_configs = self.rule_configs.clone();
            let validation_only = self.validation_only;
            let output_format_override = self.output_format_override;
            let parser = Arc::new(ConservativeParser);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let pipeline = FileProcessingPipeline {
                    security_limits,
                    rules,
                    rule_configs,
                    validation_only,
                    output_format_override,
                    classpath_config,
                    scanner,
                    parse_stage: ParseStage { parser },
                    format_stage: FormatStage,
                    validate_stage: ValidateStage,
                    output_stage: OutputStage,
                    max_parallel_files: 1,
                };
                pipeline.process_file(&path).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => results.push(PipelineResult {
                    file_path: PathBuf::new(),
                    stage_results: vec![format!("task panicked: {join_error}")],
                    processing_time: Duration::default(),
                    overall_success: false,
                    final_source: None,
                    report: None,
                    rendered_output: None,
                    arena: None,
                }),
            }
        }
        results
    }

    /// Pre-flight pass: for each source file, extracts its package and
    /// top-level type names and delegates to [`CompilationValidator`].
    /// Results are aggregated into a single `Invalid` with concatenated
    /// lists; `package-info.java`/`module-info.java` are skipped.
    pub fn validate_compilation(&self, paths: &[PathBuf]) -> Result<CompilationValidationResult, PipelineError> {
        let validator = CompilationValidator;
        let mut missing_all = Vec::new();
        let mut stale_all = Vec::new();

        for path in paths {
            if matches!(path.file_name().and_then(|n| n.to_str()), Some("package-info.java") | Some("module-info.java")) {
                continue;
            }

            let source = std::fs::read_to_string(path).map_err(|e| PipelineError::Io { path: path.clone(), source: e })?;
            let (package_name, type_names) = extract_package_and_types(&source);
            if type_names.is_empty() {
                continue;
            }

            match validator.validate(path, &package_name, &type_names, self.scanner.as_ref())? {
                CompilationValidationResult::Valid => {}
                CompilationValidationResult::Invalid { missing_classes, stale_classes, .. } => {
                    missing_all.extend(missing_classes);
                    stale_all.extend(stale_classes);
                }
            }
        }

        if missing_all.is_empty() && stale_all.is_empty() {
            Ok(CompilationValidationResult::Valid)
        } else {
            let source_file = paths.first().cloned();
            Ok(CompilationValidationResult::Invalid { missing_classes: missing_all, stale_classes: stale_all, source_file })
        }
    }
}

fn extract_package_and_types(source: &str) -> (String, Vec<String>) {
    let outcome = ConservativeParser.parse(source, &SecurityLimits::default());
    let ParseOutcome::Success { arena, .. } = outcome else { return (String::new(), Vec::new()) };

    let mut package_name = String::new();
    let mut type_names = Vec::new();
    for idx in arena.iter_indices() {
        match arena.get_type(idx) {
            Ok(crate::arena::NodeType::PackageDeclaration) => {
                if let Ok(name) = arena.get_package_attribute(idx) {
                    package_name = name.to_string();
                }
            }
            Ok(crate::arena::NodeType::ClassDeclaration)
            | Ok(crate::arena::NodeType::InterfaceDeclaration)
            | Ok(crate::arena::NodeType::EnumDeclaration)
            | Ok(crate::arena::NodeType::RecordDeclaration)
            | Ok(crate::arena::NodeType::AnnotationTypeDeclaration) => {
                if let Ok((name, _)) = arena.get_type_declaration_attribute(idx) {
                    type_names.push(name.to_string());
                }
            }
            _ => {}
        }
    }
    (package_name, type_names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(validation_only: bool) -> FileProcessingPipeline {
        FileProcessingPipeline::builder()
            .validation_only(validation_only)
            .rule(Box::new(crate::rules::ImportOrganizerRule))
            .rule_config(Arc::new(crate::rules::ImportOrganizerConfig::default()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn missing_file_yields_failure_mentioning_not_found() {
        let pipeline = pipeline(true);
        let result = pipeline.process_file(PathBuf::from("/does/not/exist/Foo.java")).await;
        assert!(!result.overall_success);
        assert!(result.stage_results.iter().any(|s| s.contains("not found") || s.contains("File not found")));
    }

    #[tokio::test]
    async fn empty_file_fails_parse_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Empty.java");
        std::fs::write(&path, "").unwrap();

        let pipeline = pipeline(true);
        let result = pipeline.process_file(&path).await;
        assert!(!result.overall_success);
        assert_eq!(result.stage_results.len(), 1);
    }

    #[tokio::test]
    async fn valid_file_with_no_rules_reports_no_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Foo.java");
        std::fs::write(&path, "package com.example;\n\npublic class Foo {}\n").unwrap();

        let pipeline = FileProcessingPipeline::builder().validation_only(true).build().unwrap();
        let result = pipeline.process_file(&path).await;
        assert!(result.overall_success);
        let report = result.report.unwrap();
        assert!(report.violations.is_empty());
        assert!(result.rendered_output.unwrap().starts_with("✅ No errors found"));
    }

    #[tokio::test]
    async fn unsorted_imports_validation_only_reports_violation_but_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Foo.java");
        std::fs::write(&path, "package com.example;\n\nimport java.util.List;\nimport com.foo.Bar;\n\npublic class Foo {}\n").unwrap();

        let pipeline = pipeline(true);
        let result = pipeline.process_file(&path).await;
        assert!(result.overall_success);
        let report = result.report.unwrap();
        assert!(report.violations.iter().any(|v| v.rule_id == "import-organizer"));

        let bytes_after = std::fs::read(&path).unwrap();
        assert_eq!(bytes_after, b"package com.example;\n\nimport java.util.List;\nimport com.foo.Bar;\n\npublic class Foo {}\n");
    }

    #[tokio::test]
    async fn fix_mode_sorts_imports_and_produces_non_identity_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Foo.java");
        std::fs::write(&path, "package com.example;\n\nimport java.util.List;\nimport com.foo.Bar;\n\npublic class Foo {}\n").unwrap();

        let pipeline = pipeline(false);
        let result = pipeline.process_file(&path).await;
        assert!(result.overall_success);
        let final_source = result.final_source.unwrap();
        assert!(final_source.find("com.foo.Bar").unwrap() < final_source.find("java.util.List").unwrap());
    }

    #[tokio::test]
    async fn validate_compilation_reports_missing_class() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("Foo.java");
        std::fs::write(&src, "package com.example;\n\npublic class Foo {}\n").unwrap();
        let classes = tmp.path().join("classes");
        std::fs::create_dir_all(&classes).unwrap();

        let pipeline = FileProcessingPipeline::builder()
            .classpath_config(ClasspathConfig { classpath_entries: vec![classes], module_path_entries: vec![] })
            .build()
            .unwrap();

        let result = pipeline.validate_compilation(&[src]).unwrap();
        match result {
            CompilationValidationResult::Invalid { missing_classes, .. } => {
                assert_eq!(missing_classes, vec!["com.example.Foo".to_string()]);
            }
            CompilationValidationResult::Valid => panic!("expected Invalid"),
        }
    }
}
