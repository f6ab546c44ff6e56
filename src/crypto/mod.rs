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


//! DRM removal: activation handling, key derivation, sample decryption
//!
//! # Module Organization
//!
//! ## activation
//! The 4-byte account secret and its 8-hex external form:
//! - `ActivationBytes` - validated newtype
//! - `is_valid_text` / `parse_activation_bytes` / `format_activation_bytes`
//!
//! ## drm
//! The deterministic derivation pipeline over the per-file adrm blob:
//! - `FIXED_KEY` - process-wide derivation constant
//! - `validate` - checksum predicate (activation vs. file)
//! - `derive_file_keys` - produces the per-file `FileKeys`
//!
//! ## sample
//! Per-access-unit AES-128-CBC decryption with block-aligned tail
//! handling:
//! - `decrypt_sample`
//!
//! A wrong activation produces plausible-looking garbage rather than a
//! local failure, which is why validation happens against the adrm
//! checksum before any audio is touched.

pub mod activation;
pub mod drm;
pub mod sample;

// Re-export commonly used types for convenience
pub use activation::{is_valid_text, ActivationBytes};
pub use drm::{derive_file_keys, validate, FileKeys, FIXED_KEY};
pub use sample::decrypt_sample;
