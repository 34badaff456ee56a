// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error taxonomy of the orchestration core

use ph_domain_types::TaskType;
use ph_repo::BackendError;
use std::fmt;

/// Core result type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Resolution,
    Function,
    NotFound,
    AlreadyExists,
    Conflict,
    Cancelled,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Function => "function",
            ErrorKind::NotFound => "not-found",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("resolution error: {0}")]
    Resolution(String),

    #[error("function error: {0}")]
    Function(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("conflicting write to '{0}' already in progress")]
    Conflict(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task {index} ({task_type}) failed: {source}")]
    Task {
        index: usize,
        task_type: TaskType,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Attach the failing pipeline position
    pub fn at_task(self, index: usize, task_type: TaskType) -> Self {
        Error::Task {
            index,
            task_type,
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Resolution(_) => ErrorKind::Resolution,
            Error::Function(_) => ErrorKind::Function,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
            Error::Task { source, .. } => source.kind(),
        }
    }

    /// Index of the failing task, if the error came out of a pipeline step
    pub fn task_index(&self) -> Option<usize> {
        match self {
            Error::Task { index, .. } => Some(*index),
            _ => None,
        }
    }
}

// A missing function registry is an unknown resource; any other backend
// failure leaves content unresolvable
impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::RegistryNotFound(registry) => {
                Error::not_found("function registry", registry)
            }
            other => Error::Resolution(other.to_string()),
        }
    }
}
