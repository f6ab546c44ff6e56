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


//! MP4 output writing
//!
//! ## atoms
//! Box-writing primitives: size back-patching, fixed-point fields,
//! language packing, MP4 epoch time, descriptor lengths.
//!
//! ## writer
//! The fast-start muxer assembling `ftyp`/`moov`/`mdat` with tags, cover
//! art and a chpl chapter list.

pub mod atoms;
pub mod writer;

// Re-export commonly used types for convenience
pub use writer::{AudioTrackConfig, Mp4Muxer, Packet, AUDIO_TRACK_ID};
