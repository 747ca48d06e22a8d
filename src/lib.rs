//! # daq-param
//!
//! Typed, validated instrument parameters over synchronous VISA-style
//! sessions. Instead of hand-writing command strings, an instrument's
//! readable and settable quantities are declared as [`Parameter`]s: each one
//! knows its command templates, how to convert values to and from the wire,
//! and which values are acceptable.
//!
//! ## Crate Structure
//!
//! - **`validation`**: Pure predicates over [`value::Value`] (`IntRange`,
//!   `NumberRange`, patterns, enumerations, composition).
//! - **`value`**: The dynamic value view validators inspect and the
//!   `ParamValue` trait linking concrete Rust types to it.
//! - **`template`**: Command templates with named placeholders.
//! - **`adapters`**: Byte-level transports (serial, TCP socket, simulated, mock).
//! - **`session`**: The communication handle: termination framing, timeouts,
//!   and the lock that makes every query atomic.
//! - **`sim`**: YAML-described simulated instruments.
//! - **`parameter`**: `Parameter<T>`, `Command` and the `*IDN?` identification.
//! - **`group`**: Per-channel parameter groups sized by a count read from the
//!   instrument.
//! - **`config`**: Figment-based configuration (TOML + environment).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: The `ParamError` enum shared by all of the above.

pub mod adapters;
pub mod config;
pub mod error;
pub mod group;
pub mod logging;
pub mod parameter;
pub mod session;
pub mod sim;
pub mod template;
pub mod validation;
pub mod value;

pub use error::{CommunicationError, ParamError, ParamResult};
pub use group::ChannelGroup;
pub use parameter::{Command, Identification, Parameter, ParameterBase, ReadPolicy};
pub use session::{Backend, Session, SessionConfig, Transaction};
pub use validation::{IntRange, NumberRange, Validator};
pub use value::{ParamValue, Value};
