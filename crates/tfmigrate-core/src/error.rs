//! Error types for the migration engine.
//!
//! Errors are classified by [`ErrorKind`] and carry enough context to say
//! what was being done to which resource in which file. Pipelines collect
//! per-resource failures into a bounded [`ErrorList`] and keep going.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tfmigrate_hcl::ParseError;
use thiserror::Error;

/// Default capacity of an [`ErrorList`].
pub const DEFAULT_ERROR_LIMIT: usize = 100;

/// Number of errors an [`ErrorList`] prints verbatim.
const DISPLAYED_ERRORS: usize = 10;

/// Classification of a migration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input could not be parsed as HCL or JSON.
    Parse,
    /// A migrator failed to rewrite a block or instance.
    Transform,
    /// Input is well formed but structurally invalid.
    Validation,
    /// The state tree has an unexpected shape.
    State,
    /// A file system operation failed.
    File,
    /// The engine or registry is misconfigured.
    Config,
    /// A referenced resource does not exist.
    ResourceNotFound,
    /// No migration path exists between the requested versions.
    Version,
    /// Creating, restoring or removing a backup failed.
    Backup,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Transform => write!(f, "transform"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::State => write!(f, "state"),
            ErrorKind::File => write!(f, "file"),
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::ResourceNotFound => write!(f, "resource_not_found"),
            ErrorKind::Version => write!(f, "version"),
            ErrorKind::Backup => write!(f, "backup"),
        }
    }
}

/// A classified migration error with context.
#[derive(Debug, Error)]
pub struct MigrationError {
    /// The error classification.
    pub kind: ErrorKind,
    /// Human readable description.
    pub message: String,
    /// What was being done, e.g. `transform_config`.
    pub operation: Option<String>,
    /// The resource address involved, e.g. `cloudflare_record.www`.
    pub resource: Option<String>,
    /// The file being processed.
    pub file: Option<String>,
    /// 1-based line in `file`.
    pub line: Option<usize>,
    /// The version transition, e.g. `v4 -> v5`.
    pub version: Option<String>,
    /// Additional key-value details.
    pub context: BTreeMap<String, String>,
    /// The underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    /// Whether a retry or rollback policy may ignore this error.
    pub recoverable: bool,
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl MigrationError {
    /// Create a new error of the given kind.
    ///
    /// File and backup errors start out recoverable since they are often
    /// transient; every other kind must be marked explicitly.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: None,
            resource: None,
            file: None,
            line: None,
            version: None,
            context: BTreeMap::new(),
            source: None,
            recoverable: matches!(kind, ErrorKind::File | ErrorKind::Backup),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transform, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, message)
    }

    pub fn file(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::File, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceNotFound, message)
    }

    pub fn version(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Version, message)
    }

    pub fn backup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backup, message)
    }

    /// Build a parse error with the line resolved against the source text.
    pub fn from_parse_error(err: ParseError, source: &str, file: impl Into<String>) -> Self {
        let line = err.line(source);
        Self::from(err).with_file(file).with_line(line)
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Attach a key-value detail.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Mark the error as recoverable or not.
    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Whether a retry or rollback policy may ignore this error.
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error", self.kind)?;
        if let Some(operation) = &self.operation {
            write!(f, " during {}", operation)?;
        }
        if let Some(resource) = &self.resource {
            write!(f, " for {}", resource)?;
        }
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " in {}:{}", file, line)?,
            (Some(file), None) => write!(f, " in {}", file)?,
            _ => {}
        }
        if let Some(version) = &self.version {
            write!(f, " ({})", version)?;
        }
        write!(f, ": {}", self.message)?;
        if !self.context.is_empty() {
            let details: Vec<String> = self
                .context
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, " [{}]", details.join(", "))?;
        }
        Ok(())
    }
}

impl From<ParseError> for MigrationError {
    fn from(err: ParseError) -> Self {
        let mut error = MigrationError::parse(err.message.clone());
        if let Some(hint) = &err.hint {
            error = error.with_context("hint", hint);
        }
        error.with_source(err)
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        MigrationError::file(err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        let error = if err.is_syntax() || err.is_eof() {
            MigrationError::parse(err.to_string()).with_line(err.line())
        } else {
            MigrationError::state(err.to_string())
        };
        error.with_source(err)
    }
}

/// A capacity-bounded, ordered collection of errors.
///
/// Errors pushed past the limit are counted but not stored, which bounds
/// memory and output size on pathological inputs.
#[derive(Debug)]
pub struct ErrorList {
    errors: Vec<MigrationError>,
    limit: usize,
    dropped: usize,
}

impl Default for ErrorList {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LIMIT)
    }
}

impl ErrorList {
    /// Create an empty list holding at most `limit` errors.
    pub fn new(limit: usize) -> Self {
        Self {
            errors: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    /// Create a list holding a single error.
    pub fn single(error: MigrationError) -> Self {
        let mut list = Self::default();
        list.push(error);
        list
    }

    /// Add an error, dropping it if the list is full.
    pub fn push(&mut self, error: MigrationError) {
        if self.errors.len() < self.limit {
            self.errors.push(error);
        } else {
            self.dropped += 1;
        }
    }

    /// Add every error from another list.
    pub fn extend(&mut self, other: ErrorList) {
        self.dropped += other.dropped;
        for error in other.errors {
            self.push(error);
        }
    }

    /// Whether any error has been added.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.dropped > 0
    }

    /// Number of stored errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of errors dropped because the list was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The configured capacity.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MigrationError> {
        self.errors.iter()
    }

    /// Convert into `Ok(value)` when empty, `Err(self)` otherwise.
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, ErrorList> {
        if self.has_errors() {
            Err(self)
        } else {
            Ok(value)
        }
    }
}

impl IntoIterator for ErrorList {
    type Item = MigrationError;
    type IntoIter = std::vec::IntoIter<MigrationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a MigrationError;
    type IntoIter = std::slice::Iter<'a, MigrationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl From<MigrationError> for ErrorList {
    fn from(error: MigrationError) -> Self {
        ErrorList::single(error)
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.errors.len() + self.dropped;
        match total {
            0 => return write!(f, "no errors"),
            1 => write!(f, "1 error occurred:")?,
            n => write!(f, "{} errors occurred:", n)?,
        }
        for error in self.errors.iter().take(DISPLAYED_ERRORS) {
            write!(f, "\n  - {}", error)?;
        }
        let remaining = total.saturating_sub(DISPLAYED_ERRORS.min(self.errors.len()));
        if remaining > 0 {
            write!(f, "\n  ... and {} more", remaining)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

#[cfg(test)]
mod tests {
    use super::*;
    use tfmigrate_hcl::Span;

    #[test]
    fn test_display_includes_context() {
        let err = MigrationError::transform("unsupported cache_type")
            .with_operation("transform_config")
            .with_resource("cloudflare_tiered_cache.main")
            .with_file("main.tf")
            .with_line(12)
            .with_context("value", "bogus");

        assert_eq!(
            err.to_string(),
            "transform error during transform_config for cloudflare_tiered_cache.main in main.tf:12: unsupported cache_type [value=bogus]"
        );
    }

    #[test]
    fn test_from_parse_error_resolves_line() {
        let source = "a = 1\nb = \n";
        let parse = ParseError::new("expected expression, found newline", Span::new(10, 11));
        let err = MigrationError::from_parse_error(parse, source, "main.tf");

        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.line, Some(2));
        assert!(err.to_string().starts_with("parse error in main.tf:2: expected expression"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_default_recoverability() {
        assert!(MigrationError::file("locked").is_recoverable());
        assert!(MigrationError::backup("disk full").is_recoverable());
        assert!(!MigrationError::transform("bad").is_recoverable());
        assert!(!MigrationError::file("gone").with_recoverable(false).is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ not json").unwrap_err();
        let err = MigrationError::from(json_err);
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_error_list_is_bounded() {
        let mut list = ErrorList::new(3);
        assert!(!list.has_errors());

        list.push(MigrationError::state("first"));
        assert!(list.has_errors());

        for i in 0..10 {
            list.push(MigrationError::state(format!("error {}", i)));
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.dropped(), 8);
    }

    #[test]
    fn test_zero_limit_still_reports_errors() {
        let mut list = ErrorList::new(0);
        list.push(MigrationError::state("dropped"));
        assert!(list.has_errors());
        assert!(list.is_empty());
    }

    #[test]
    fn test_error_list_display_summarizes() {
        let mut list = ErrorList::new(50);
        for i in 0..13 {
            list.push(MigrationError::validation(format!("bad {}", i)));
        }
        let text = list.to_string();
        assert!(text.starts_with("13 errors occurred:"));
        assert!(text.contains("bad 9"));
        assert!(!text.contains("bad 10"));
        assert!(text.ends_with("... and 3 more"));
    }
}
