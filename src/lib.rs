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


//! aaxtract - native AAX to M4B/M4A conversion
//!
//! Converts DRM-encrypted Audible audiobooks into standard MP4-family
//! files, losslessly: the AAC stream is decrypted and remuxed without
//! transcoding, carrying chapters, cover art and metadata across.
//!
//! # Pipeline
//! ```text
//! source file -> container parser -> (adrm, sample index, metadata, AAC config)
//!             -> activation validation + key derivation
//!             -> per-sample AES-128-CBC decryption
//!             -> fast-start MP4 muxer -> output file
//! ```
//!
//! # Example
//! ```no_run
//! use aaxtract::{AaxConverter, ConvertOptions};
//!
//! let mut options = ConvertOptions::new("book.aax");
//! options.activation_code = Some("1CEB00DA".into());
//! options.output_dir = "./audiobooks".into();
//! let output = AaxConverter::new(options).convert_sync()?;
//! println!("written to {}", output.display());
//! # Ok::<(), aaxtract::AaxError>(())
//! ```

// Core modules
pub mod audio;
pub mod container;
pub mod crypto;
pub mod error;
pub mod file;
pub mod mux;

// Re-export commonly used types for convenience
pub use audio::converter::{run_conversion, AaxConverter, ConversionReport, ConvertOptions};
pub use audio::metadata::{BookMetadata, Chapter, CoverArt};
pub use audio::OutputFormat;
pub use container::AaxInput;
pub use crypto::activation::ActivationBytes;
pub use error::{AaxError, ErrorKind, Result};
