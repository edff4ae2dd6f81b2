//! Vault error kinds.

use std::fmt;
use std::path::PathBuf;

use super::schema::EntityKind;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A vault call panicked or was cancelled before returning
    #[error("vault {op} did not complete: {message}")]
    Internal { op: &'static str, message: String },
}

impl VaultError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Short machine-readable name used in API error bodies
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Format(_) => "format",
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Io { .. } => "io",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Header delimiters missing or header not decodable as a mapping
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed frontmatter: {message}")]
pub struct FormatError {
    pub message: String,
}

impl FormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A field that was present but failed its check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    pub field: String,
    pub reason: String,
}

impl fmt::Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.field, self.reason)
    }
}

/// Every missing and invalid field found while checking one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    pub missing_fields: Vec<String>,
    pub invalid_fields: Vec<InvalidField>,
}

impl ValidationError {
    pub fn missing(&mut self, field: &str) {
        self.missing_fields.push(field.to_string());
    }

    pub fn invalid(&mut self, field: &str, reason: impl Into<String>) {
        self.invalid_fields.push(InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.missing_fields.is_empty() && self.invalid_fields.is_empty()
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// Single-field invalid error, for checks outside a full decode
    pub fn single(field: &str, reason: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.invalid(field, reason);
        err
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        if !self.missing_fields.is_empty() {
            write!(f, "; missing: {}", self.missing_fields.join(", "))?;
        }
        if !self.invalid_fields.is_empty() {
            let invalid: Vec<String> = self.invalid_fields.iter().map(|i| i.to_string()).collect();
            write!(f, "; invalid: {}", invalid.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
