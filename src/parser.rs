//! The `Parser` collaborator contract.
//!
//! The Java grammar itself is out of scope for this crate (see `spec.md`
//! §1): this module defines only the contract a parser must satisfy, plus a
//! conservative, regex-based [`ConservativeParser`] used by tests, the CLI
//! default, and [`crate::compilation`]'s source scanning. It recognizes a
//! deliberately small slice of Java (package/import declarations and
//! top-level type declarations) well enough to drive the rule engine
//! end-to-end; it is not a substitute for a real Java grammar.

use std::time::Instant;

use regex::Regex;

use crate::arena::{NodeArena, NodeIndex, NodeType};
use crate::limits::{DepthTracker, SecurityLimits};

/// Where in the source a parse failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub const START: SourcePosition = SourcePosition { line: 1, column: 1 };
}

/// A byte range together with its `(line, column)` endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRange {
    pub start: SourcePosition,
    pub end: SourcePosition,
}

/// The outcome of a single [`Parser::parse`] call.
pub enum ParseOutcome {
    Success { arena: NodeArena, root: NodeIndex },
    Failure { message: String, position: SourcePosition },
}

/// Collaborator interface: source text in, populated arena (or a structured
/// failure) out.
///
/// Implementations own their [`DepthTracker`] and must sample
/// [`SecurityLimits::parsing_timeout_ms`] at recursion checkpoints (each
/// `enter`), turning an elapsed budget into a `Failure` rather than running
/// unbounded.
pub trait Parser {
    fn parse(&self, source: &str, limits: &SecurityLimits) -> ParseOutcome;
}

/// A conservative line-oriented parser covering package declarations,
/// import declarations (including JEP 511 module imports), and top-level
/// type declarations.
#[derive(Debug, Default)]
pub struct ConservativeParser;

fn package_regex() -> Regex {
    Regex::new(r"^\s*package\s+([\w.]+)\s*;").unwrap()
}

fn import_regex() -> Regex {
    Regex::new(r"^\s*import\s+(static\s+)?([\w.*]+)\s*;").unwrap()
}

fn module_import_regex() -> Regex {
    Regex::new(r"^\s*import\s+module\s+([\w.]+)\s*;").unwrap()
}

fn type_decl_regex() -> Regex {
    Regex::new(r"(?m)^\s*(?:(public|private|protected)\s+)?(?:(final|abstract|static)\s+)*(class|interface|enum|record|@interface)\s+(\w+)").unwrap()
}

fn position_of(source: &str, byte_offset: usize) -> SourcePosition {
    let mut line = 1u32;
    let mut col = 1u32;
    for ch in source[..byte_offset.min(source.len())].chars() {
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    SourcePosition { line, column: col }
}

impl Parser for ConservativeParser {
    fn parse(&self, source: &str, limits: &SecurityLimits) -> ParseOutcome {
        let start_time = Instant::now();
        let mut depth_tracker = DepthTracker::new(limits.max_parse_depth, limits.max_parse_depth.saturating_sub(10).max(1));

        if source.as_bytes().len() as u64 > limits.max_source_size_bytes {
            return ParseOutcome::Failure {
                message: format!("source exceeds max_source_size_bytes ({} bytes)", limits.max_source_size_bytes),
                position: SourcePosition::START,
            };
        }

        if source.trim().is_empty() {
            return ParseOutcome::Failure {
                message: "empty source is not a valid Java compilation unit".to_string(),
                position: SourcePosition::START,
            };
        }

        let mut arena = NodeArena::new(64, limits.max_arena_capacity);
        let root = match arena.allocate(NodeType::CompilationUnit, 0, source.len() as u32) {
            Ok(idx) => idx,
            Err(e) => {
                return ParseOutcome::Failure { message: format!("failed to allocate compilation unit: {e}"), position: SourcePosition::START };
            }
        };

        let package_re = package_regex();
        let import_re = import_regex();
        let module_import_re = module_import_regex();
        let type_re = type_decl_regex();

        let mut byte_offset = 0usize;
        for line in source.split_inclusive('\n') {
            if let Err(guard_err) = depth_tracker.enter_scoped("line") {
                return ParseOutcome::Failure { message: guard_err.to_string(), position: position_of(source, byte_offset) };
            };

            if start_time.elapsed().as_millis() as u64 > limits.parsing_timeout_ms {
                return ParseOutcome::Failure {
                    message: format!("parsing exceeded timeout of {}ms", limits.parsing_timeout_ms),
                    position: position_of(source, byte_offset),
                };
            }

            let line_start = byte_offset;
            let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
            let line_end = line_start + trimmed_len;

            if let Some(caps) = module_import_re.captures(line) {
                let module_name = caps.get(1).unwrap().as_str().to_string();
                if let Err(e) = arena.allocate_module_import(line_start as u32, line_end as u32, module_name) {
                    return ParseOutcome::Failure { message: e.to_string(), position: position_of(source, line_start) };
                }
            } else if let Some(caps) = import_re.captures(line) {
                let is_static = caps.get(1).is_some();
                let qualified_name = caps.get(2).unwrap().as_str().to_string();
                if let Err(e) = arena.allocate_import(line_start as u32, line_end as u32, qualified_name, is_static) {
                    return ParseOutcome::Failure { message: e.to_string(), position: position_of(source, line_start) };
                }
            } else if let Some(caps) = package_re.captures(line) {
                let name = caps.get(1).unwrap().as_str().to_string();
                if let Err(e) = arena.allocate_package(line_start as u32, line_end as u32, name) {
                    return ParseOutcome::Failure { message: e.to_string(), position: position_of(source, line_start) };
                }
            } else if let Some(caps) = type_re.captures(line) {
                let keyword = caps.get(3).unwrap().as_str();
                let name = caps.get(4).unwrap().as_str().to_string();
                let node_type = match keyword {
                    "class" => NodeType::ClassDeclaration,
                    "interface" => NodeType::InterfaceDeclaration,
                    "enum" => NodeType::EnumDeclaration,
                    "record" => NodeType::RecordDeclaration,
                    _ => NodeType::AnnotationTypeDeclaration,
                };
                let modifiers = crate::arena::TypeModifiers {
                    is_public: caps.get(1).map(|m| m.as_str() == "public").unwrap_or(false),
                    is_final: caps.get(2).map(|m| m.as_str() == "final").unwrap_or(false),
                    is_abstract: caps.get(2).map(|m| m.as_str() == "abstract").unwrap_or(false),
                    is_static: caps.get(2).map(|m| m.as_str() == "static").unwrap_or(false),
                };
                if let Err(e) = arena.allocate_type_declaration(node_type, line_start as u32, line_end as u32, name, modifiers) {
                    return ParseOutcome::Failure { message: e.to_string(), position: position_of(source, line_start) };
                }
            }

            byte_offset += line.len();
        }

        ParseOutcome::Success { arena, root }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_fails_to_parse() {
        let outcome = ConservativeParser.parse("", &SecurityLimits::default());
        assert!(matches!(outcome, ParseOutcome::Failure { .. }));
    }

    #[test]
    fn parses_package_imports_and_a_class() {
        let source = "package com.example;\n\nimport java.util.List;\nimport static java.util.Collections.emptyList;\n\npublic class Foo {}\n";
        let outcome = ConservativeParser.parse(source, &SecurityLimits::default());
        match outcome {
            ParseOutcome::Success { arena, .. } => {
                let mut imports = 0;
                let mut packages = 0;
                let mut types = 0;
                for idx in arena.iter_indices() {
                    match arena.get_type(idx).unwrap() {
                        NodeType::ImportDeclaration => imports += 1,
                        NodeType::PackageDeclaration => packages += 1,
                        NodeType::ClassDeclaration => types += 1,
                        _ => {}
                    }
                }
                assert_eq!(imports, 2);
                assert_eq!(packages, 1);
                assert_eq!(types, 1);
            }
            ParseOutcome::Failure { message, .. } => panic!("unexpected parse failure: {message}"),
        }
    }

    #[test]
    fn oversized_source_is_rejected() {
        let mut limits = SecurityLimits::default();
        limits.max_source_size_bytes = 4;
        let outcome = ConservativeParser.parse("package a;\n", &limits);
        assert!(matches!(outcome, ParseOutcome::Failure { .. }));
    }
}
