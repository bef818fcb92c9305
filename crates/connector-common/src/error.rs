//! Error types for the cluster connector
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the context needed to tell which store, file or
//! remote call failed without reading the whole log.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for connector operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Filesystem error while reading or writing local state
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// File or directory being accessed
        path: PathBuf,
        /// The underlying io error
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The logical state entry being (de)serialized (if known)
        entry: Option<String>,
    },

    /// Key pair or fingerprint generation/encoding error
    #[error("key material error: {message}")]
    KeyMaterial {
        /// Description of what failed
        message: String,
    },

    /// Remote activation service error
    #[error("registration error: {message}")]
    Registration {
        /// Description of what failed
        message: String,
        /// HTTP status code returned by the service (if any)
        status: Option<u16>,
    },

    /// Configuration validation error
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid configuration field (e.g., "activation.id")
        field: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "watcher", "reconciler")
        context: String,
    },
}

impl Error {
    /// Create an io error for the given path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            entry: None,
        }
    }

    /// Create a serialization error for a specific state entry
    pub fn serialization_for_entry(entry: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            entry: Some(entry.into()),
        }
    }

    /// Create a key material error
    pub fn key_material(msg: impl Into<String>) -> Self {
        Self::KeyMaterial {
            message: msg.into(),
        }
    }

    /// Create a registration error without an HTTP status
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration {
            message: msg.into(),
            status: None,
        }
    }

    /// Create a registration error carrying the service's HTTP status
    pub fn registration_with_status(status: u16, msg: impl Into<String>) -> Self {
        Self::Registration {
            message: msg.into(),
            status: Some(status),
        }
    }

    /// Create a validation error for a configuration field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, serialization and key material errors are not retryable.
    /// Kubernetes errors are retryable unless the API server answered 4xx.
    /// Registration errors are retryable on 5xx or when no response arrived.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Io { .. } => true,
            Error::Serialization { .. } => false,
            Error::KeyMaterial { .. } => false,
            Error::Registration { status, .. } => match status {
                Some(code) => *code >= 500,
                None => true,
            },
            Error::Validation { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            Error::Serialization { entry, .. } => entry.as_deref(),
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}
