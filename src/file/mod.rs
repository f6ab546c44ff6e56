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


//! Output file naming and side files
//!
//! ## paths
//! Name sanitization and the author/series/title directory layout.
//!
//! ## cue
//! Cue sheet generation for the converted book's chapters.

pub mod cue;
pub mod paths;

pub use cue::write_cue_sheet;
pub use paths::{avoid_collision, build_output_path, sanitize_component, OutputNaming};
