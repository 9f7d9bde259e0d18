// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Agent-wide error type.
//!
//! One categorized enum covers every failure the core can surface, from
//! configuration problems at startup to streaming sessions falling behind
//! the buffer. Ingest-side parse and validation failures are reported
//! through [`crate::entity::EntityError`] lists instead and never reach
//! this type.

use std::fmt;

/// Result alias used throughout the agent core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by agent core operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration key is not one of the enumerated agent options.
    UnknownConfigKey(String),
    /// Configuration value could not be parsed as the key's fixed type.
    InvalidConfigValue(String, String),
    /// Configuration file not found at the specified path.
    ConfigFileNotFound(String),

    // ========================================================================
    // Device Model Errors
    // ========================================================================
    /// Two data items share the same id at device-model load time. Fatal.
    DuplicateDataItemId(String),
    /// Requested device is not known to the agent.
    NoDevice(String),
    /// Device model document failed to parse.
    InvalidDeviceModel(String),

    // ========================================================================
    // Buffer / Session Errors
    // ========================================================================
    /// A streaming client's cursor dropped below the first resident sequence.
    FellBehind { cursor: u64, first: u64 },
    /// Requested sequence is outside the valid window.
    OutOfRange(String),
    /// Session was cancelled by its transport or by an explicit cancel.
    Cancelled,

    // ========================================================================
    // Asset Errors
    // ========================================================================
    /// No asset with the requested id (or no assets match the query).
    AssetNotFound(String),
    /// Asset document could not be parsed or validated.
    InvalidAsset(String),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Requested operation is disabled or not supported (e.g. PUT without AllowPut).
    Unsupported(String),
    /// I/O error with underlying cause.
    IoError(std::io::Error),
    /// Internal invariant violation.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Configuration
            Error::UnknownConfigKey(key) => write!(f, "Unknown configuration key: {}", key),
            Error::InvalidConfigValue(key, value) => {
                write!(f, "Invalid value for configuration key {}: {}", key, value)
            }
            Error::ConfigFileNotFound(path) => write!(f, "Config file not found: {}", path),
            // Device model
            Error::DuplicateDataItemId(id) => write!(f, "Duplicate data item id: {}", id),
            Error::NoDevice(name) => write!(f, "Could not find device: {}", name),
            Error::InvalidDeviceModel(msg) => write!(f, "Invalid device model: {}", msg),
            // Buffer / session
            Error::FellBehind { cursor, first } => write!(
                f,
                "Client fell too far behind: cursor {} < first sequence {}",
                cursor, first
            ),
            Error::OutOfRange(msg) => write!(f, "Out of range: {}", msg),
            Error::Cancelled => write!(f, "Session cancelled"),
            // Assets
            Error::AssetNotFound(id) => write!(f, "Cannot find asset: {}", id),
            Error::InvalidAsset(msg) => write!(f, "Invalid asset: {}", msg),
            // Other
            Error::Unsupported(msg) => write!(f, "Unsupported operation: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_fell_behind() {
        let err = Error::FellBehind {
            cursor: 5,
            first: 100,
        };
        assert_eq!(
            err.to_string(),
            "Client fell too far behind: cursor 5 < first sequence 100"
        );
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error as _;
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(err.source().is_some());
    }
}
