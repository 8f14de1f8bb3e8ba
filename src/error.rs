//! Error types for stores, the atomic provider, and exo objects.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Stable, machine-readable identifier for an error variant.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

/// Which half of an entry failed a shape check.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    Key,
    Value,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Key => f.write_str("key"),
            Role::Value => f.write_str("value"),
        }
    }
}

/// Failures raised synchronously by store operations. A failed mutation
/// leaves the backing collection unchanged.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    /// The key is not a scalar (primitive or remotable).
    #[error("{style} {key} cannot be a key of store {tag:?}")]
    InvalidKeyKind {
        tag: Rc<str>,
        style: &'static str,
        key: String,
    },
    /// A key or value did not match the configured shape.
    #[error("{role} {specimen} of store {tag:?} must match {expected}")]
    PatternMismatch {
        tag: Rc<str>,
        role: Role,
        expected: String,
        specimen: String,
    },
    #[error("key {key} already registered in store {tag:?}")]
    KeyAlreadyRegistered { tag: Rc<str>, key: String },
    #[error("key {key} not found in store {tag:?}")]
    KeyNotFound { tag: Rc<str>, key: String },
    /// The value is not a well-formed passable.
    #[error("not passable: {reason}")]
    NotPassable { reason: String },
    /// A key was added while an iterator over the store was live.
    #[error("keys in store {tag:?} cannot be added to during iteration")]
    StaleIterator { tag: Rc<str> },
    #[error("invalid pattern: {reason}")]
    InvalidPatternDefinition { reason: String },
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKeyKind { .. } => "STORE_INVALID_KEY_KIND",
            Self::PatternMismatch { .. } => "STORE_PATTERN_MISMATCH",
            Self::KeyAlreadyRegistered { .. } => "STORE_KEY_ALREADY_REGISTERED",
            Self::KeyNotFound { .. } => "STORE_KEY_NOT_FOUND",
            Self::NotPassable { .. } => "STORE_NOT_PASSABLE",
            Self::StaleIterator { .. } => "STORE_STALE_ITERATOR",
            Self::InvalidPatternDefinition { .. } => "STORE_INVALID_PATTERN",
        }
    }
}

/// Failures of `AtomicProvider::provide_async`. Shared between every
/// caller awaiting the same construction, hence `Clone`.
#[derive(Clone, Debug, Error)]
pub enum ProvideError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The value maker (or finisher) failed.
    #[error("construction failed: {0}")]
    Construction(Rc<dyn std::error::Error + 'static>),
}

impl ProvideError {
    pub fn construction<E: std::error::Error + 'static>(err: E) -> Self {
        ProvideError::Construction(Rc::new(err))
    }
}

impl ErrorCode for ProvideError {
    fn code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.code(),
            Self::Construction(_) => "PROVIDE_CONSTRUCTION_FAILED",
        }
    }
}

/// Failures of exo class definition and guarded method dispatch.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ExoError {
    #[error("{label}: no such method {method:?}")]
    NoSuchMethod { label: Rc<str>, method: String },
    #[error("{label}: method {method:?} has no guard in interface {interface:?}")]
    MethodNotGuarded {
        label: Rc<str>,
        interface: String,
        method: String,
    },
    #[error("{label}: guarded method {method:?} is not implemented")]
    MissingMethod { label: Rc<str>, method: String },
    #[error("{label}: facets {methods:?} do not match guarded facets {guards:?}")]
    FacetMismatch {
        label: Rc<str>,
        guards: Vec<String>,
        methods: Vec<String>,
    },
    #[error("{label}.{method}: expected {expected} arguments, got {got}")]
    ArgCount {
        label: Rc<str>,
        method: String,
        expected: String,
        got: usize,
    },
    #[error("{label}.{method}: argument {index} {specimen} must match {expected}")]
    ArgMismatch {
        label: Rc<str>,
        method: String,
        index: usize,
        expected: String,
        specimen: String,
    },
    #[error("{label}.{method}: result {specimen} must match {expected}")]
    ReturnMismatch {
        label: Rc<str>,
        method: String,
        expected: String,
        specimen: String,
    },
    /// The instance state is already borrowed by a call further up the
    /// stack on the same instance.
    #[error("{label}: instance state is in use by an outer call")]
    StateBusy { label: Rc<str> },
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Raised by a method body for domain-specific failures.
    #[error("{0}")]
    Failed(String),
}

impl ErrorCode for ExoError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoSuchMethod { .. } => "EXO_NO_SUCH_METHOD",
            Self::MethodNotGuarded { .. } => "EXO_METHOD_NOT_GUARDED",
            Self::MissingMethod { .. } => "EXO_MISSING_METHOD",
            Self::FacetMismatch { .. } => "EXO_FACET_MISMATCH",
            Self::ArgCount { .. } => "EXO_ARG_COUNT",
            Self::ArgMismatch { .. } => "EXO_ARG_MISMATCH",
            Self::ReturnMismatch { .. } => "EXO_RETURN_MISMATCH",
            Self::StateBusy { .. } => "EXO_STATE_BUSY",
            Self::Store(e) => e.code(),
            Self::Failed(_) => "EXO_FAILED",
        }
    }
}

/// Result type for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
