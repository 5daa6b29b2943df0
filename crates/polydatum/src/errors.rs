//! Error types for the data access layer.
//!
//! [`DalError`] covers failures raised by the layer itself: lifecycle
//! misuse, provider protocol violations, registration conflicts, and path
//! resolution. Failures raised by user code travel as [`crate::Fault`]s and
//! keep their own types. [`ServiceError`] is offered to service
//! implementations that want status-coded domain errors.

use std::fmt;

use thiserror::Error;

use crate::context::LifecycleState;
use crate::dispatch::{PathSegment, dotted};

/// Registries that reject duplicate names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    /// The resource registry.
    Resource,
    /// The service registry.
    Service,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Resource => "resource",
            Self::Service => "service",
        };
        formatter.write_str(label)
    }
}

/// Errors raised by contexts, registries, and command dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DalError {
    /// A context was entered after it had already been used.
    #[error("context may only be used once")]
    Reuse,

    /// Context middleware finished without becoming ready.
    #[error("context middleware '{name}' finished without becoming ready")]
    MiddlewareSetup {
        /// Name of the middleware.
        name: String,
    },

    /// A resource provider finished without producing a value.
    #[error("resource '{name}' finished without producing a value")]
    ResourceSetup {
        /// Name of the resource.
        name: String,
    },

    /// A provider broke the acquire/release protocol.
    #[error("'{subject}' {message}")]
    ProtocolViolation {
        /// Resource or middleware at fault.
        subject: String,
        /// What went wrong.
        message: String,
    },

    /// A command path did not resolve to a callable method.
    #[error("invalid dal method: {}", dotted(.path))]
    DalMethod {
        /// Path up to and including the first segment that went missing.
        path: Vec<PathSegment>,
    },

    /// A name was registered twice.
    #[error("a {kind} named '{name}' is already registered")]
    AlreadyExists {
        /// Registry that rejected the name.
        kind: RegistryKind,
        /// The duplicate name.
        name: String,
    },

    /// An operation needed an active context and none was found.
    #[error("no active context")]
    NoActiveContext,

    /// A command was called in a context owned by another manager.
    #[error("context belongs to a different data manager")]
    ForeignContext,

    /// An operation is not permitted in the context's current state.
    #[error("{operation} is not permitted while the context is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State the context was in.
        state: LifecycleState,
    },

    /// No resource is registered under the requested name.
    #[error("no resource named '{name}' for context")]
    UnknownResource {
        /// The requested name.
        name: String,
    },

    /// A resource value was requested as the wrong type.
    #[error("resource '{name}' is not a {expected}")]
    ResourceType {
        /// Name of the resource.
        name: String,
        /// Type the caller asked for.
        expected: &'static str,
    },

    /// A required metadata key was missing or empty.
    #[error("\"{key}\" is empty")]
    MetaRequired {
        /// The required key.
        key: String,
    },

    /// A service method was called without a required positional argument.
    #[error("missing positional argument {position}")]
    MissingArgument {
        /// Zero-based argument position.
        position: usize,
    },
}

impl DalError {
    /// Creates a middleware setup error.
    #[must_use]
    pub fn middleware_setup(name: impl Into<String>) -> Self {
        Self::MiddlewareSetup { name: name.into() }
    }

    /// Creates a resource setup error.
    #[must_use]
    pub fn resource_setup(name: impl Into<String>) -> Self {
        Self::ResourceSetup { name: name.into() }
    }

    /// Creates a protocol violation error.
    #[must_use]
    pub fn protocol_violation(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Creates a method resolution error for `path`.
    #[must_use]
    pub fn dal_method(path: impl Into<Vec<PathSegment>>) -> Self {
        Self::DalMethod { path: path.into() }
    }

    /// Creates a duplicate registration error.
    #[must_use]
    pub fn already_exists(kind: RegistryKind, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Creates an invalid state error.
    #[must_use]
    pub const fn invalid_state(operation: &'static str, state: LifecycleState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Creates an unknown resource error.
    #[must_use]
    pub fn unknown_resource(name: impl Into<String>) -> Self {
        Self::UnknownResource { name: name.into() }
    }

    /// Creates a resource type mismatch error.
    #[must_use]
    pub fn resource_type(name: impl Into<String>, expected: &'static str) -> Self {
        Self::ResourceType {
            name: name.into(),
            expected,
        }
    }

    /// Creates a missing metadata error.
    #[must_use]
    pub fn meta_required(key: impl Into<String>) -> Self {
        Self::MetaRequired { key: key.into() }
    }

    /// Returns the offending path for method resolution errors.
    #[must_use]
    pub fn path(&self) -> Option<&[PathSegment]> {
        match self {
            Self::DalMethod { path } => Some(path),
            _ => None,
        }
    }
}

/// Status-coded error for domain failures raised by services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (status {code})")]
pub struct ServiceError {
    code: u16,
    message: String,
}

impl ServiceError {
    /// Status used when none is given.
    pub const INTERNAL: u16 = 500;
    /// Status for missing entities.
    pub const NOT_FOUND: u16 = 404;

    /// Creates an internal service error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(Self::INTERNAL, message)
    }

    /// Creates a not-found service error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_code(Self::NOT_FOUND, message)
    }

    /// Creates a service error with an explicit status.
    #[must_use]
    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Status code of the failure.
    #[must_use]
    pub const fn code(&self) -> u16 {
        self.code
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
