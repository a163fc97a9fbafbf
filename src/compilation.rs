//! Pre-flight compilation validation: every source file must have an
//! up-to-date class file on the classpath before the formatter runs against
//! it, so fixes are never applied to a program that doesn't compile.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

/// Answers "does class X exist on the classpath, and if so when was it last
/// modified" without touching the filesystem on every query.
pub trait ClasspathScanner: Send + Sync {
    /// Looks up `relative_class_path` (e.g. `com/example/Foo.class`) across
    /// every configured classpath entry, returning the first match's
    /// modification time.
    fn find_class(&self, relative_class_path: &Path) -> Option<SystemTime>;
}

/// Errors raised constructing a [`ClasspathScanner`].
#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("classpath entry does not exist: {0}")]
    MissingEntry(PathBuf),

    #[error("I/O error scanning classpath: {0}")]
    Io(#[from] std::io::Error),
}

/// A [`ClasspathScanner`] backed by an in-memory index of `*.class` files
/// under each classpath directory, built once at construction time and
/// safe for concurrent read-only queries afterward.
#[derive(Debug)]
pub struct FsClasspathScanner {
    index: HashMap<PathBuf, SystemTime>,
}

impl FsClasspathScanner {
    /// Builds the scanner. Rejects a non-existent classpath entry up front
    /// (spec.md §4.6: "a non-existent entry is a configuration error, not a
    /// runtime miss").
    pub fn create(classpath_entries: &[PathBuf]) -> Result<Self, ScannerError> {
        let mut index = HashMap::new();
        for entry in classpath_entries {
            if !entry.exists() {
                return Err(ScannerError::MissingEntry(entry.clone()));
            }
            Self::walk(entry, entry, &mut index)?;
        }
        Ok(FsClasspathScanner { index })
    }

    fn walk(root: &Path, dir: &Path, index: &mut HashMap<PathBuf, SystemTime>) -> Result<(), ScannerError> {
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::walk(root, &path, index)?;
            } else if path.extension().and_then(|e| e.to_str()) == Some("class") {
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                let modified = entry.metadata()?.modified()?;
                index.entry(relative).or_insert(modified);
            }
        }
        Ok(())
    }
}

impl ClasspathScanner for FsClasspathScanner {
    fn find_class(&self, relative_class_path: &Path) -> Option<SystemTime> {
        self.index.get(relative_class_path).copied()
    }
}

/// Result of validating that a source file's compiled output is present and
/// current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilationValidationResult {
    Valid,
    Invalid { missing_classes: Vec<String>, stale_classes: Vec<String>, source_file: Option<PathBuf> },
}

impl CompilationValidationResult {
    /// A multi-line, human-readable message for `Invalid` results (spec.md §6).
    pub fn error_message(&self) -> String {
        match self {
            CompilationValidationResult::Valid => String::new(),
            CompilationValidationResult::Invalid { missing_classes, stale_classes, source_file } => {
                let mut out = String::new();
                let path_display = source_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<unknown>".to_string());
                out.push_str(&format!("Compilation required for: {path_display}\n"));
                out.push_str("Missing class files:\n");
                for fqn in missing_classes {
                    out.push_str(&format!("  - {fqn}\n"));
                }
                out.push_str("Stale class files (source is newer):\n");
                for fqn in stale_classes {
                    out.push_str(&format!("  - {fqn}\n"));
                }
                out.push_str("\nRun 'mvn compile' or 'javac' before formatting.\n");
                out
            }
        }
    }
}

/// Checks that every named top-level type in `source_file` has an
/// up-to-date class file on the classpath.
#[derive(Debug, Default)]
pub struct CompilationValidator;

impl CompilationValidator {
    /// `source_file` must be readable for its modification time; `type_names`
    /// should be the top-level type declarations found in it.
    pub fn validate(
        &self,
        source_file: &Path,
        package_name: &str,
        type_names: &[String],
        scanner: &dyn ClasspathScanner,
    ) -> Result<CompilationValidationResult, ScannerError> {
        let source_mtime = std::fs::metadata(source_file)?.modified()?;

        let mut missing = Vec::new();
        let mut stale = Vec::new();

        for type_name in type_names {
            let relative = if package_name.is_empty() {
                PathBuf::from(format!("{type_name}.class"))
            } else {
                PathBuf::from(format!("{}/{}.class", package_name.replace('.', "/"), type_name))
            };
            let fqn = if package_name.is_empty() { type_name.clone() } else { format!("{package_name}.{type_name}") };

            match scanner.find_class(&relative) {
                None => missing.push(fqn),
                Some(class_mtime) if source_mtime > class_mtime => stale.push(fqn),
                Some(_) => {}
            }
        }

        if missing.is_empty() && stale.is_empty() {
            Ok(CompilationValidationResult::Valid)
        } else {
            Ok(CompilationValidationResult::Invalid { missing_classes: missing, stale_classes: stale, source_file: Some(source_file.to_path_buf()) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn create_rejects_nonexistent_classpath_entry() {
        let err = FsClasspathScanner::create(&[PathBuf::from("/does/not/exist/anywhere")]).unwrap_err();
        assert!(matches!(err, ScannerError::MissingEntry(_)));
    }

    #[test]
    fn valid_when_class_file_exists_and_is_newer() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("Foo.java");
        std::fs::write(&src, "package com.example;\nclass Foo {}\n").unwrap();

        let class_dir = tmp.path().join("classes/com/example");
        std::fs::create_dir_all(&class_dir).unwrap();
        sleep(Duration::from_millis(20));
        let mut f = std::fs::File::create(class_dir.join("Foo.class")).unwrap();
        f.write_all(b"\xCA\xFE\xBA\xBE").unwrap();
        drop(f);

        let scanner = FsClasspathScanner::create(&[tmp.path().join("classes")]).unwrap();
        let result = CompilationValidator.validate(&src, "com.example", &["Foo".to_string()], &scanner).unwrap();
        assert_eq!(result, CompilationValidationResult::Valid);
    }

    #[test]
    fn missing_class_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("Foo.java");
        std::fs::write(&src, "package com.example;\nclass Foo {}\n").unwrap();
        std::fs::create_dir_all(tmp.path().join("classes")).unwrap();

        let scanner = FsClasspathScanner::create(&[tmp.path().join("classes")]).unwrap();
        let result = CompilationValidator.validate(&src, "com.example", &["Foo".to_string()], &scanner).unwrap();
        match result {
            CompilationValidationResult::Invalid { missing_classes, stale_classes, .. } => {
                assert_eq!(missing_classes, vec!["com.example.Foo".to_string()]);
                assert!(stale_classes.is_empty());
            }
            CompilationValidationResult::Valid => panic!("expected Invalid"),
        }
    }

    #[test]
    fn stale_class_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let class_dir = tmp.path().join("classes/com/example");
        std::fs::create_dir_all(&class_dir).unwrap();
        std::fs::write(class_dir.join("Foo.class"), b"\xCA\xFE\xBA\xBE").unwrap();

        sleep(Duration::from_millis(20));
        let src = tmp.path().join("Foo.java");
        std::fs::write(&src, "package com.example;\nclass Foo {}\n").unwrap();

        let scanner = FsClasspathScanner::create(&[tmp.path().join("classes")]).unwrap();
        let result = CompilationValidator.validate(&src, "com.example", &["Foo".to_string()], &scanner).unwrap();
        match result {
            CompilationValidationResult::Invalid { missing_classes, stale_classes, .. } => {
                assert!(missing_classes.is_empty());
                assert_eq!(stale_classes, vec!["com.example.Foo".to_string()]);
            }
            CompilationValidationResult::Valid => panic!("expected Invalid"),
        }
    }

    #[test]
    fn error_message_contains_path_and_the_word_compile() {
        let result = CompilationValidationResult::Invalid {
            missing_classes: vec!["com.example.Foo".to_string()],
            stale_classes: vec![],
            source_file: Some(PathBuf::from("Foo.java")),
        };
        let message = result.error_message();
        assert!(message.contains("Foo.java"));
        assert!(message.contains("compile"));
        assert!(message.contains("com.example.Foo"));
    }
}
