//! Error Classifier - maps database errors to migration outcomes
//!
//! The rule table is keyed by `(backend, vendor code)`. MySQL codes are the
//! numeric server error numbers, PostgreSQL codes are SQLSTATE values.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::backends::DatabaseBackendType;
use crate::error::{DatabaseError, MigrateError};

/// Semantic class of a failed statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The change the statement makes is already present
    AlreadyApplied,
    /// Lock or serialization conflict; the statement could succeed if retried
    Transient,
    /// Anything else
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::AlreadyApplied => write!(f, "already applied"),
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Fatal => write!(f, "fatal"),
        }
    }
}

const MYSQL_RULES: &[(&str, ErrorClass)] = &[
    ("1050", ErrorClass::AlreadyApplied), // ER_TABLE_EXISTS_ERROR
    ("1060", ErrorClass::AlreadyApplied), // ER_DUP_FIELDNAME
    ("1061", ErrorClass::AlreadyApplied), // ER_DUP_KEYNAME
    ("1091", ErrorClass::AlreadyApplied), // ER_CANT_DROP_FIELD_OR_KEY
    ("1826", ErrorClass::AlreadyApplied), // ER_FK_DUP_NAME
    ("1205", ErrorClass::Transient),      // ER_LOCK_WAIT_TIMEOUT
    ("1213", ErrorClass::Transient),      // ER_LOCK_DEADLOCK
];

const POSTGRES_RULES: &[(&str, ErrorClass)] = &[
    ("42701", ErrorClass::AlreadyApplied), // duplicate_column
    ("42P07", ErrorClass::AlreadyApplied), // duplicate_table
    ("42710", ErrorClass::AlreadyApplied), // duplicate_object
    ("42P06", ErrorClass::AlreadyApplied), // duplicate_schema
    ("40001", ErrorClass::Transient),      // serialization_failure
    ("40P01", ErrorClass::Transient),      // deadlock_detected
];

/// Classifies database errors through a `(backend, code)` rule table
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: HashMap<(DatabaseBackendType, String), ErrorClass>,
}

impl ErrorClassifier {
    /// Classifier with the built-in MySQL and PostgreSQL rules
    pub fn new() -> Self {
        let mut classifier = Self::empty();
        for (code, class) in MYSQL_RULES {
            classifier.insert(DatabaseBackendType::MySQL, code, *class);
        }
        for (code, class) in POSTGRES_RULES {
            classifier.insert(DatabaseBackendType::PostgreSQL, code, *class);
        }
        classifier
    }

    /// Classifier without any rule: every error is fatal
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Add or replace a rule
    pub fn with_rule(mut self, backend: DatabaseBackendType, code: &str, class: ErrorClass) -> Self {
        self.insert(backend, code, class);
        self
    }

    fn insert(&mut self, backend: DatabaseBackendType, code: &str, class: ErrorClass) {
        // SQLSTATEs are case-insensitive ("42p07" == "42P07")
        self.rules.insert((backend, code.to_ascii_uppercase()), class);
    }

    /// Classify a server error. Errors without backend or code are fatal.
    pub fn classify(&self, error: &DatabaseError) -> ErrorClass {
        match (error.backend, error.code.as_deref()) {
            (Some(backend), Some(code)) => self
                .rules
                .get(&(backend, code.to_ascii_uppercase()))
                .copied()
                .unwrap_or(ErrorClass::Fatal),
            _ => ErrorClass::Fatal,
        }
    }

    /// Classify any migration error; only server errors can be non-fatal
    pub fn classify_error(&self, error: &MigrateError) -> ErrorClass {
        error
            .database_error()
            .map(|db_err| self.classify(db_err))
            .unwrap_or(ErrorClass::Fatal)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
