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


//! Cue sheet generation
//!
//! Writes a standard cue sheet next to the converted book: one TRACK per
//! chapter with INDEX 01 at MM:SS:FF (75 frames per second). Players that
//! ignore embedded chapters can still navigate with this.

use std::fmt::Write as _;
use std::path::Path;

use crate::audio::metadata::Chapter;
use crate::error::Result;

/// Render a cue sheet for `audio_file_name` and the given chapters.
pub fn render_cue_sheet(
    audio_file_name: &str,
    title: Option<&str>,
    performer: Option<&str>,
    chapters: &[Chapter],
) -> String {
    let mut out = String::new();
    if let Some(performer) = performer {
        let _ = writeln!(out, "PERFORMER \"{}\"", escape(performer));
    }
    if let Some(title) = title {
        let _ = writeln!(out, "TITLE \"{}\"", escape(title));
    }
    let _ = writeln!(out, "FILE \"{}\" MP4", escape(audio_file_name));

    for (i, chapter) in chapters.iter().enumerate() {
        let _ = writeln!(out, "  TRACK {:02} AUDIO", i + 1);
        let _ = writeln!(out, "    TITLE \"{}\"", escape(&chapter.title));
        let _ = writeln!(
            out,
            "    INDEX 01 {}",
            Chapter::format_cue_timestamp(chapter.start_ms())
        );
    }
    out
}

/// Write the cue sheet alongside the audio file, replacing its extension.
pub fn write_cue_sheet(
    audio_path: &Path,
    title: Option<&str>,
    performer: Option<&str>,
    chapters: &[Chapter],
) -> Result<()> {
    let file_name = audio_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sheet = render_cue_sheet(&file_name, title, performer, chapters);
    std::fs::write(audio_path.with_extension("cue"), sheet)?;
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('"', "'")
}
