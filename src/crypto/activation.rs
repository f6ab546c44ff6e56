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


//! Activation bytes parsing and formatting
//!
//! # What are Activation Bytes?
//! - 4-byte secret bound to an Audible account
//! - Used to derive the per-file AES key that decrypts AAX audio
//! - Canonical external form: 8 hex characters (e.g., "1CEB00DA"),
//!   case-insensitive
//!
//! Hex encoding appears only at this boundary; everywhere else in the
//! crate, key material is opaque byte slices.

use crate::error::{AaxError, Result};
use regex::Regex;

/// Newtype wrapper around activation bytes to provide type safety
///
/// Activation bytes are a 4-byte secret used to decrypt AAX files.
/// This wrapper ensures the bytes are always valid and provides
/// convenient conversion methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationBytes([u8; 4]);

impl ActivationBytes {
    /// Create ActivationBytes from a 4-byte array
    pub fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Parse activation bytes from hex string
    ///
    /// # Errors
    /// - `InvalidActivationFormat` if the string is not 8 hex characters
    pub fn from_hex(text: &str) -> Result<Self> {
        parse_activation_bytes(text).map(Self)
    }

    /// Format activation bytes as an uppercase hex string
    pub fn to_hex(&self) -> String {
        format_activation_bytes(&self.0)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// The byte-reversed value.
    ///
    /// The first four bytes of the decrypted DRM payload hold the
    /// activation value in reversed byte order; this is the form used
    /// for the post-decryption sanity check.
    pub fn reversed(&self) -> [u8; 4] {
        let mut rev = self.0;
        rev.reverse();
        rev
    }
}

/// Check whether a string is a well-formed activation code.
///
/// Accepts exactly 8 hexadecimal characters, case-insensitive, nothing else.
pub fn is_valid_text(text: &str) -> bool {
    let re = Regex::new(r"^[0-9a-fA-F]{8}$").unwrap();
    re.is_match(text)
}

/// Parse hex string to 4-byte array
///
/// # Format Rules
/// - Must be exactly 8 characters (4 bytes)
/// - Only valid hex digits (0-9, A-F, a-f)
/// - Surrounding whitespace is trimmed
/// - Case-insensitive
pub fn parse_activation_bytes(text: &str) -> Result<[u8; 4]> {
    let text = text.trim();

    if !is_valid_text(text) {
        return Err(AaxError::InvalidActivationFormat(format!(
            "expected 8 hex characters (e.g. 1CEB00DA), got {:?}",
            text
        )));
    }

    let decoded = hex::decode(text).map_err(|e| {
        AaxError::InvalidActivationFormat(format!("hex decode failed for {:?}: {}", text, e))
    })?;

    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&decoded);
    Ok(bytes)
}

/// Format 4-byte array as an uppercase hex string
pub fn format_activation_bytes(bytes: &[u8; 4]) -> String {
    hex::encode_upper(bytes)
}
