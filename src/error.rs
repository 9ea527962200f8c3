//! Error types for building definitions, resolving references, validating
//! requests and serializing responses.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::reference::ComponentKind;

/// Errors raised while building a registry. These are programmer errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("definitions are frozen")]
    Frozen,

    #[error("{kind} name can't be blank")]
    BlankName { kind: String },

    #[error("invalid {attribute} \"{value}\": expected {expected}")]
    InvalidValue {
        attribute: String,
        value: String,
        expected: String,
    },

    #[error("{first} and {second} are mutually exclusive")]
    MutuallyExclusive { first: String, second: String },

    #[error("circular include of definitions #{id}")]
    CircularInclude { id: usize },

    #[error("circular parent of definitions #{id}")]
    CircularParent { id: usize },

    #[error("unknown definitions #{id}")]
    UnknownDefinitions { id: usize },
}

/// A reference whose target doesn't exist.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind} reference can't be resolved: {name}")]
pub struct ReferenceError {
    pub kind: ComponentKind,
    pub name: String,
}

/// Errors while resolving references, `allOf` chains and discriminators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("circular {kind} reference: {name}")]
    CircularReference { kind: ComponentKind, name: String },

    #[error("circular allOf reference: {name}")]
    CircularAllOf { name: String },

    #[error("discriminator property \"{property}\" can't be nil")]
    MissingDiscriminator { property: String },

    #[error("inherited schema not found: {}", names.join(" or "))]
    UnknownDiscriminatorValue { names: Vec<String> },
}

/// Errors while loading definitions files.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid definitions in {origin}: {source}")]
    Config {
        origin: String,
        #[source]
        source: ConfigError,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors while validating a payload against a generated JSON Schema document.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("invalid schema: {message}")]
    Schema { message: String },

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<ValidationError> },
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Invalid { .. } => 1,
            _ => 2,
        }
    }
}

/// Single validation error with path context.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationError {
    /// Dotted attribute path (`address.zip`, `items[2]`), empty for the whole input.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{} {}", self.path, self.message)
        }
    }
}

/// Validation errors accumulated while checking request input.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct Errors {
    errors: Vec<ValidationError>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Messages recorded for `path`.
    pub fn messages_for(&self, path: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.path == path)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn into_vec(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// One step of the path to a value being serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// What went wrong while serializing a response.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializeErrorKind {
    Nil,
    InvalidType { actual: &'static str },
    InvalidValue { message: String },
    Resolve(ResolveError),
}

/// A response value that doesn't fit its own schema. Indicates a server bug.
///
/// The path is filled in while the error propagates out of nested values, so
/// a failure deep inside a document reads `"orders[2].total can't be nil"`.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializeError {
    path: Vec<PathSegment>,
    kind: SerializeErrorKind,
}

impl SerializeError {
    pub fn new(kind: SerializeErrorKind) -> Self {
        Self {
            path: Vec::new(),
            kind,
        }
    }

    pub fn nil() -> Self {
        Self::new(SerializeErrorKind::Nil)
    }

    pub fn invalid_type(actual: &'static str) -> Self {
        Self::new(SerializeErrorKind::InvalidType { actual })
    }

    pub fn kind(&self) -> &SerializeErrorKind {
        &self.kind
    }

    /// Prepends `segment` to the path. Called once per nesting level.
    pub fn within(mut self, segment: PathSegment) -> Self {
        self.path.insert(0, segment);
        self
    }

    /// The dotted/bracketed path, e.g. `orders[2].total`.
    pub fn path(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            match segment {
                PathSegment::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathSegment::Index(i) => {
                    out.push_str(&format!("[{}]", i));
                }
            }
        }
        out
    }
}

impl std::error::Error for SerializeError {}

impl From<ResolveError> for SerializeError {
    fn from(error: ResolveError) -> Self {
        SerializeError::new(SerializeErrorKind::Resolve(error))
    }
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match &self.kind {
            SerializeErrorKind::Nil => "can't be nil".to_string(),
            SerializeErrorKind::InvalidType { actual } => {
                format!("has an invalid type: {}", actual)
            }
            SerializeErrorKind::InvalidValue { message } => message.clone(),
            SerializeErrorKind::Resolve(error) => error.to_string(),
        };
        let path = self.path();
        if path.is_empty() {
            f.write_str(&message)
        } else {
            write!(f, "{} {}", path, message)
        }
    }
}

/// Errors while streaming serialized values.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_exit_codes() {
        let err = LoadError::FileNotFound {
            path: PathBuf::from("api.json"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = LoadError::Config {
            origin: "api.json".into(),
            source: ConfigError::Frozen,
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn validate_error_exit_codes() {
        let err = ValidateError::Invalid {
            errors: vec![ValidationError {
                path: "id".into(),
                message: "is missing".into(),
            }],
        };
        assert_eq!(err.exit_code(), 1);
        let err = ValidateError::Schema {
            message: "bad".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            path: "buyer.email".into(),
            message: "can't be blank".into(),
        };
        assert_eq!(err.to_string(), "buyer.email can't be blank");
    }

    #[test]
    fn serialize_error_path_is_built_outside_in() {
        let err = SerializeError::nil()
            .within(PathSegment::Key("total".into()))
            .within(PathSegment::Index(2))
            .within(PathSegment::Key("orders".into()));
        assert_eq!(err.path(), "orders[2].total");
        assert_eq!(err.to_string(), "orders[2].total can't be nil");

        let err = SerializeError::invalid_type("string").within(PathSegment::Index(2));
        assert_eq!(err.to_string(), "[2] has an invalid type: string");
        assert_eq!(SerializeError::nil().to_string(), "can't be nil");
    }

    #[test]
    fn reference_error_names_the_reference() {
        let err = ReferenceError {
            kind: ComponentKind::Schema,
            name: "Foo".into(),
        };
        assert_eq!(err.to_string(), "schema reference can't be resolved: Foo");
    }

    #[test]
    fn errors_collection() {
        let mut errors = Errors::new();
        assert!(errors.is_empty());
        errors.add("p", "can't be blank");
        errors.add("q", "is invalid");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.messages_for("p"), vec!["can't be blank"]);
    }
}
