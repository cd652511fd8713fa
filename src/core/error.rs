// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core error types for cpudaq.
//!
//! Errors fall into a few groups:
//! - Run file lifecycle (create, write, close)
//! - Sensor input reads (skippable inside the ingest loop)
//! - Binary format parsing
//! - Configuration and hardware collaborators

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::RunType;

/// Errors that can occur while acquiring and recording data.
#[derive(Debug, Error)]
pub enum AcqError {
    /// Underlying I/O failure on a run file or directory
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Operation and path being worked on
        context: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The device accepted fewer bytes than requested
    #[error("Short write to '{}': expected {expected} bytes, wrote {written}", path.display())]
    ShortWrite {
        /// File being written
        path: PathBuf,
        /// Bytes requested
        expected: usize,
        /// Bytes accepted before the failure
        written: usize,
    },

    /// Write attempted on a writer that was already closed
    #[error("Writer for '{}' is closed", path.display())]
    WriterClosed {
        /// File the writer was bound to
        path: PathBuf,
    },

    /// A run of this type is already open
    #[error("A {run_type} run is already open")]
    RunAlreadyOpen {
        /// Run type
        run_type: RunType,
    },

    /// No run of this type is open
    #[error("No {run_type} run is open")]
    NoOpenRun {
        /// Run type
        run_type: RunType,
    },

    /// A sensor input file could not be read or is malformed
    #[error("Failed to read input '{}': {reason}", path.display())]
    InputRead {
        /// Input file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Malformed run file content
    #[error("Format error in {context}: {message}")]
    Format {
        /// What was being parsed
        context: String,
        /// Error message
        message: String,
    },

    /// Date outside the packed timestamp range
    #[error("Timestamp error: {message}")]
    Timestamp {
        /// Error message
        message: String,
    },

    /// Configuration missing or invalid
    #[error("Configuration error: {reason}")]
    Config {
        /// Validation message
        reason: String,
    },

    /// The input directory could not be watched
    #[error("Cannot watch '{}': {message}", path.display())]
    Watch {
        /// Directory to watch
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A collection was requested while the controller was not idle
    #[error("Cannot {action} while {state}")]
    Busy {
        /// Requested action
        action: &'static str,
        /// Controller state at the time
        state: String,
    },

    /// A hardware collaborator reported a failure
    #[error("{device} error: {message}")]
    Hardware {
        /// Sub-system name
        device: String,
        /// Error message
        message: String,
    },
}

impl AcqError {
    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AcqError::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an input read error.
    pub fn input_read(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        AcqError::InputRead {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a format error.
    pub fn format(context: impl Into<String>, message: impl Into<String>) -> Self {
        AcqError::Format {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a timestamp error.
    pub fn timestamp(message: impl Into<String>) -> Self {
        AcqError::Timestamp {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        AcqError::Config {
            reason: reason.into(),
        }
    }

    /// Create a watch error.
    pub fn watch(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        AcqError::Watch {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a hardware error.
    pub fn hardware(device: impl Into<String>, message: impl Into<String>) -> Self {
        AcqError::Hardware {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Whether the ingest loop may skip the offending input and continue.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            AcqError::InputRead { .. } | AcqError::Hardware { .. }
        )
    }

    /// Get structured fields for logging.
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            AcqError::Io { context, source } => {
                vec![("context", context.clone()), ("cause", source.to_string())]
            }
            AcqError::ShortWrite {
                path,
                expected,
                written,
            } => vec![
                ("path", path.display().to_string()),
                ("expected", expected.to_string()),
                ("written", written.to_string()),
            ],
            AcqError::WriterClosed { path } => vec![("path", path.display().to_string())],
            AcqError::RunAlreadyOpen { run_type } | AcqError::NoOpenRun { run_type } => {
                vec![("run_type", run_type.tag().to_string())]
            }
            AcqError::InputRead { path, reason } => vec![
                ("path", path.display().to_string()),
                ("reason", reason.clone()),
            ],
            AcqError::Format { context, message } => {
                vec![("context", context.clone()), ("message", message.clone())]
            }
            AcqError::Timestamp { message } => vec![("message", message.clone())],
            AcqError::Config { reason } => vec![("reason", reason.clone())],
            AcqError::Watch { path, message } => vec![
                ("path", path.display().to_string()),
                ("message", message.clone()),
            ],
            AcqError::Busy { action, state } => {
                vec![("action", action.to_string()), ("state", state.clone())]
            }
            AcqError::Hardware { device, message } => {
                vec![("device", device.clone()), ("message", message.clone())]
            }
        }
    }
}

/// Result type for cpudaq operations.
pub type Result<T> = std::result::Result<T, AcqError>;
