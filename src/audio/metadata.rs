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


//! Book metadata and chapter records
//!
//! # Metadata Fields
//! - Title, author, narrator
//! - Publisher, year, copyright, description
//! - A single optional cover image (raw bytes; mime inferred from magic)
//!
//! Every field is optional. Readers accept absent fields silently;
//! writers tolerate any subset.

use serde::{Deserialize, Serialize};

/// Book metadata carried from the source item list into the output tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub narrator: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<String>,
    pub copyright: Option<String>,
    pub description: Option<String>,
    #[serde(skip)]
    pub cover: Option<CoverArt>,
}

/// Cover image bytes with magic-based mime detection.
#[derive(Debug, Clone)]
pub struct CoverArt {
    data: Vec<u8>,
}

impl CoverArt {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// JPEG if the image starts with the FF D8 marker, PNG otherwise.
    pub fn is_jpeg(&self) -> bool {
        self.data.starts_with(&[0xFF, 0xD8])
    }

    pub fn mime(&self) -> &'static str {
        if self.is_jpeg() {
            "image/jpeg"
        } else {
            "image/png"
        }
    }

    /// File extension matching the detected image type.
    pub fn extension(&self) -> &'static str {
        if self.is_jpeg() {
            "jpg"
        } else {
            "png"
        }
    }
}

/// Chapter marker structure
///
/// Chapters form a non-overlapping, time-ordered partition: each
/// chapter's end equals the next chapter's start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl Chapter {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Start time at millisecond precision, as stored in the output.
    pub fn start_ms(&self) -> u64 {
        (self.start_seconds * 1000.0).round() as u64
    }

    /// Format a start time for cue sheets (MM:SS:FF, 75 frames/second).
    pub fn format_cue_timestamp(ms: u64) -> String {
        let total_seconds = ms / 1000;
        let frames = ((ms % 1000) * 75) / 1000;
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        format!("{:02}:{:02}:{:02}", minutes, seconds, frames)
    }
}
