//! # Error Types Module
//!
//! Centralized error handling for Pedal Power.
//! Each layer gets its own error type so callers can match on what went wrong
//! and decide whether to retry, report, or ignore it.
//!
//! ## Error Types
//! - `ConfigError`: Configuration file I/O and parsing errors
//! - `PollError`: Device endpoint failures (swallowed and logged by the poller)
//! - `StoreError`: Session log and roster persistence failures
//! - `ControlError`: Rejected operator actions, always surfaced to the operator
//!
//! ## Usage Examples
//! ```rust
//! // Config module uses ConfigError
//! pub fn load() -> Result<Config, ConfigError> { ... }
//!
//! // Store backends use StoreError
//! fn append(&self, session: &Session) -> Result<(), StoreError> { ... }
//!
//! // Controller operations use ControlError
//! pub fn start_session(&mut self, ...) -> Result<(), ControlError> { ... }
//! ```

use crate::session::CycleId;
use std::fmt;

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}

/// Errors that can occur while fetching readings from the device
#[derive(Debug)]
pub enum PollError {
    /// HTTP client could not be constructed
    ClientBuild(reqwest::Error),
    /// Request failed (timeout, connection refused, ...)
    Request(reqwest::Error),
    /// Device answered with a non-success status
    Status(u16),
    /// Response body was not the expected JSON document
    Decode(String),
    /// Async runtime for the polling thread could not be created
    Runtime(std::io::Error),
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::ClientBuild(e) => write!(f, "Failed to build HTTP client: {}", e),
            PollError::Request(e) => write!(f, "Device request failed: {}", e),
            PollError::Status(code) => write!(f, "Device answered with HTTP {}", code),
            PollError::Decode(msg) => write!(f, "Malformed device payload: {}", msg),
            PollError::Runtime(e) => write!(f, "Failed to create async runtime: {}", e),
        }
    }
}

impl std::error::Error for PollError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::ClientBuild(e) | PollError::Request(e) => Some(e),
            PollError::Runtime(e) => Some(e),
            PollError::Status(_) | PollError::Decode(_) => None,
        }
    }
}

/// Errors that can occur while persisting sessions or the roster
#[derive(Debug)]
pub enum StoreError {
    /// Filesystem failure (open, create, sync)
    Io(std::io::Error),
    /// Row could not be encoded or written
    Csv(csv::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Storage I/O failed: {}", e),
            StoreError::Csv(e) => write!(f, "Failed to write CSV row: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Csv(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<csv::Error> for StoreError {
    fn from(e: csv::Error) -> Self {
        StoreError::Csv(e)
    }
}

/// Operator actions that were rejected.
///
/// None of these mutate state: the controller checks before it acts.
#[derive(Debug)]
pub enum ControlError {
    /// Cycle is outside the configured range
    UnknownCycle(CycleId),
    /// No student given for a start request
    NoStudent,
    /// Cycle already has a running session
    CycleBusy(CycleId),
    /// Student is already riding another cycle
    StudentBusy { student: String, cycle: CycleId },
    /// Roster already contains this name
    DuplicateStudent(String),
    /// Roster does not contain this name
    UnknownStudent(String),
    /// Management credential rejected
    AccessDenied,
    /// Session or roster could not be persisted
    Store(StoreError),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::UnknownCycle(cycle) => write!(f, "{} does not exist", cycle),
            ControlError::NoStudent => write!(f, "Select a student"),
            ControlError::CycleBusy(cycle) => write!(f, "{} already running", cycle),
            ControlError::StudentBusy { student, cycle } => {
                write!(f, "{} already cycling on {}", student, cycle)
            }
            ControlError::DuplicateStudent(name) => write!(f, "{} is already on the roster", name),
            ControlError::UnknownStudent(name) => write!(f, "{} is not on the roster", name),
            ControlError::AccessDenied => write!(f, "Incorrect password"),
            ControlError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ControlError {
    fn from(e: StoreError) -> Self {
        ControlError::Store(e)
    }
}
