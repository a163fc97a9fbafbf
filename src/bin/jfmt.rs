//! Minimal CLI embedder. Argument parsing here is deliberately hand-rolled:
//! spec.md §1 scopes CLI parsing out of the formatter core, so this binary
//! pulls in no argument-parsing crate and exists only to exercise
//! [`jfmt::FileProcessingPipeline`] end to end.

use std::path::PathBuf;
use std::process::ExitCode;

use jfmt::{ClasspathConfig, CompilationValidationResult, FileProcessingPipeline, FormatterConfig, OutputFormat};

const USAGE: &str = "\
jfmt [OPTIONS] <FILE>...

OPTIONS:
    --config <PATH>      Load jfmt.toml from PATH
    --validate-only      Report violations without rewriting files
    --format <human|json>  Override output format (default: auto-detect)
    -h, --help           Print this help and exit
    -V, --version        Print the version and exit";

struct Args {
    config_path: Option<PathBuf>,
    validate_only: bool,
    format_override: Option<OutputFormat>,
    files: Vec<PathBuf>,
}

enum ParsedArgs {
    Run(Args),
    Help,
    Version,
}

fn parse_args(raw: &[String]) -> Result<ParsedArgs, String> {
    let mut config_path = None;
    let mut validate_only = false;
    let mut format_override = None;
    let mut files = Vec::new();

    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(ParsedArgs::Help),
            "-V" | "--version" => return Ok(ParsedArgs::Version),
            "--validate-only" => validate_only = true,
            "--config" => {
                let path = iter.next().ok_or_else(|| "--config requires a path argument".to_string())?;
                config_path = Some(PathBuf::from(path));
            }
            "--format" => {
                let value = iter.next().ok_or_else(|| "--format requires 'human' or 'json'".to_string())?;
                format_override = Some(match value.as_str() {
                    "human" => OutputFormat::Human,
                    "json" => OutputFormat::Json,
                    other => return Err(format!("unknown output format '{other}'")),
                });
            }
            other if other.starts_with("--") => return Err(format!("unknown option '{other}'")),
            other => files.push(PathBuf::from(other)),
        }
    }

    if files.is_empty() {
        return Err("no source files given".to_string());
    }

    Ok(ParsedArgs::Run(Args { config_path, validate_only, format_override, files }))
}

#[tokio::main]
async fn main() -> ExitCode {
    jfmt::logging::init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(ParsedArgs::Help) => {
            println!("{USAGE}");
            return ExitCode::from(0);
        }
        Ok(ParsedArgs::Version) => {
            println!("jfmt {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::from(0);
        }
        Ok(ParsedArgs::Run(args)) => args,
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let config = match &args.config_path {
        Some(path) => match FormatterConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(2);
            }
        },
        None => FormatterConfig::default(),
    };

    let classpath_config = ClasspathConfig {
        classpath_entries: config.classpath_entries.clone(),
        module_path_entries: config.module_path_entries.clone(),
    };

    let builder = FileProcessingPipeline::builder()
        .security_limits(config.security_limits())
        .validation_only(args.validate_only || config.validation_only)
        .output_format_override(Some(args.format_override.or(config.output_format).unwrap_or_else(OutputFormat::detect)))
        .classpath_config(classpath_config)
        .rule(Box::new(jfmt::rules::ImportOrganizerRule))
        .rule_config(std::sync::Arc::new(jfmt::rules::ImportOrganizerConfig::default()))
        .max_parallel_files(config.max_parallel_files.unwrap_or(8));

    let pipeline = match builder.build() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    match pipeline.validate_compilation(&args.files) {
        Ok(CompilationValidationResult::Valid) => {}
        Ok(invalid @ CompilationValidationResult::Invalid { .. }) => {
            eprintln!("{}", invalid.error_message());
            return ExitCode::from(3);
        }
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    }

    let results = pipeline.process_files(&args.files).await;

    let mut any_violations = false;
    let mut any_failures = false;
    for result in &results {
        if let Some(rendered) = &result.rendered_output {
            println!("{rendered}");
        }
        if !result.overall_success {
            any_failures = true;
            for stage_result in &result.stage_results {
                eprintln!("{}: {stage_result}", result.file_path.display());
            }
        } else if result.report.as_ref().map(|r| !r.violations.is_empty()).unwrap_or(false) {
            any_violations = true;
        }
    }

    if any_failures {
        ExitCode::from(2)
    } else if any_violations && args.validate_only {
        ExitCode::from(1)
    } else {
        ExitCode::from(0)
    }
}
