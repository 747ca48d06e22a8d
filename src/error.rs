//! Custom error types for the library.
//!
//! This module defines the primary error type, `ParamError`, shared by sessions,
//! parameters and parameter groups. Using the `thiserror` crate, it provides a
//! centralized and consistent way to report the different ways an instrument
//! exchange can go wrong.
//!
//! ## Error Hierarchy
//!
//! `ParamError` is an enum that consolidates the failure kinds of the framework:
//!
//! - **`Connection`**: The session could not be opened, or it has been closed. Always
//!   fatal to the attempted operation.
//! - **`Communication`**: A write, read or query failed below the parameter layer
//!   (timeout, I/O fault, malformed response). See [`CommunicationError`].
//! - **`Validation`**: A value was rejected by a validator. For sets this is raised
//!   before any transport I/O.
//! - **`Usage`**: Structural misuse, such as setting a get-only parameter.
//! - **`Template`**: A command template is malformed or does not match the way the
//!   parameter uses it. Raised when the parameter is built.
//! - **`Decode`**: The instrument answered, but the decoder could not turn the text
//!   into the parameter type.
//! - **`Simulation`**: A simulated instrument description is invalid.
//! - **`Config`**: Wraps errors from `figment` while loading configuration files.
//!
//! None of these are retried or converted into default values anywhere in the crate.

use std::time::Duration;
use thiserror::Error;

use crate::validation::ValidationError;

/// Convenience alias for results using the library error type.
pub type ParamResult<T> = std::result::Result<T, ParamError>;

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Connection error on '{resource}': {reason}")]
    Connection { resource: String, reason: String },

    #[error("Communication error: {0}")]
    Communication(#[from] CommunicationError),

    #[error("Validation error in '{context}': {source}")]
    Validation {
        context: String,
        #[source]
        source: ValidationError,
    },

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Failed to decode response '{response}' for '{parameter}': {reason}")]
    Decode {
        parameter: String,
        response: String,
        reason: String,
    },

    #[error("Simulation description error: {0}")]
    Simulation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl ParamError {
    pub(crate) fn connection(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        ParamError::Connection {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(context: impl Into<String>, source: ValidationError) -> Self {
        ParamError::Validation {
            context: context.into(),
            source,
        }
    }

    /// True for errors raised by a validator.
    pub fn is_validation(&self) -> bool {
        matches!(self, ParamError::Validation { .. })
    }

    /// True for errors caused by a missing or closed session.
    pub fn is_connection(&self) -> bool {
        matches!(self, ParamError::Connection { .. })
    }
}

impl From<figment::Error> for ParamError {
    fn from(value: figment::Error) -> Self {
        ParamError::Config(Box::new(value))
    }
}

/// Failures of the transport exchange itself.
#[derive(Error, Debug)]
pub enum CommunicationError {
    #[error("Timed out after {timeout:?} waiting for a response")]
    Timeout { timeout: Duration },

    #[error("Transport I/O error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    Malformed(String),
}
