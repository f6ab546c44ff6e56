// aaxtract - Audible AAX to M4B/M4A converter
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Error types for aaxtract
//!
//! All fallible operations in the crate return [`AaxError`] through the
//! [`Result`] alias. Each subsystem produces structured errors; the
//! conversion driver is the only place that turns them into user-facing
//! messages and exit codes.
//!
//! The activation validator is the one deliberate exception to the
//! error-propagation rule: it is a predicate consulted speculatively and
//! returns `false` for structurally broken input instead of failing.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using our AaxError type
pub type Result<T> = std::result::Result<T, AaxError>;

/// Main error type for aaxtract
#[derive(Error, Debug)]
pub enum AaxError {
    // ===== I/O =====

    /// Underlying read/write/seek failure, including short reads at EOF
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input path does not point to an existing file
    #[error("input file does not exist: {0}")]
    FileNotFound(String),

    // ===== Container =====

    /// Missing required boxes, inconsistent sizes, or a bad brand
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// The audio track carries no adrm box; the file is not DRM-encoded.
    /// Callers may choose a passthrough strategy instead of failing.
    #[error("audio track has no adrm box; the file is not DRM-encoded")]
    NotEncrypted,

    // ===== Activation / DRM =====

    /// Activation text is not exactly 8 hexadecimal characters
    #[error("invalid activation code: {0}")]
    InvalidActivationFormat(String),

    /// The activation value does not match this file's adrm checksum
    #[error(
        "activation code does not match this file; \
         re-fetch the activation bytes for the account that owns the book"
    )]
    ActivationMismatch,

    /// No activation value was supplied by the caller or the options
    #[error("no activation code supplied")]
    MissingActivation,

    // ===== Output =====

    /// Requested output container is not in the MP4 family (e.g. mp3)
    #[error("unsupported output format: {0}")]
    UnsupportedOutputFormat(String),

    /// The muxer refused a packet or failed to finalize the output
    #[error("muxer error: {0}")]
    Muxer(String),
}

/// Stable machine-readable error classification.
///
/// Carried in the conversion report and mapped to CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Io,
    FileNotFound,
    MalformedContainer,
    NotEncrypted,
    InvalidActivationFormat,
    ActivationMismatch,
    MissingActivation,
    UnsupportedOutputFormat,
    Muxer,
}

impl AaxError {
    /// Classify this error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AaxError::Io(_) => ErrorKind::Io,
            AaxError::FileNotFound(_) => ErrorKind::FileNotFound,
            AaxError::MalformedContainer(_) => ErrorKind::MalformedContainer,
            AaxError::NotEncrypted => ErrorKind::NotEncrypted,
            AaxError::InvalidActivationFormat(_) => ErrorKind::InvalidActivationFormat,
            AaxError::ActivationMismatch => ErrorKind::ActivationMismatch,
            AaxError::MissingActivation => ErrorKind::MissingActivation,
            AaxError::UnsupportedOutputFormat(_) => ErrorKind::UnsupportedOutputFormat,
            AaxError::Muxer(_) => ErrorKind::Muxer,
        }
    }
}
