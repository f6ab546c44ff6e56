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


//! Output path construction and name sanitization
//!
//! Book titles come from metadata and routinely contain characters that
//! filesystems reject. Sanitization replaces `:` with ` -`, strips
//! `/ \ ? * " < > |`, collapses runs of whitespace, and trims.
//!
//! Layout: `<output_dir>/<author>/[<series>/]<title>.<ext>`, or
//! `<output_dir>/<title>.<ext>` in flat mode.

use regex::Regex;
use std::path::{Path, PathBuf};

/// Fallback directory name when the book carries no author tag.
const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Sanitize one path component for cross-platform use.
pub fn sanitize_component(name: &str) -> String {
    let mut replaced = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            ':' => replaced.push_str(" -"),
            '/' | '\\' | '?' | '*' | '"' | '<' | '>' | '|' => {}
            c if c.is_control() => {}
            c => replaced.push(c),
        }
    }

    let whitespace = Regex::new(r"\s+").unwrap();
    whitespace.replace_all(&replaced, " ").trim().to_string()
}

/// Per-conversion inputs for path construction.
#[derive(Debug, Clone, Default)]
pub struct OutputNaming<'a> {
    pub author: Option<&'a str>,
    pub series: Option<&'a str>,
    pub title: &'a str,
}

/// Build the output path for a book.
///
/// Flat mode puts the file directly under `output_dir`; otherwise it goes
/// under the sanitized author (and optionally series) directories.
pub fn build_output_path(
    output_dir: &Path,
    naming: &OutputNaming<'_>,
    extension: &str,
    flat: bool,
    series_in_path: bool,
) -> PathBuf {
    let mut title = sanitize_component(naming.title);
    if title.is_empty() {
        title = "audiobook".to_string();
    }

    let mut path = output_dir.to_path_buf();
    if !flat {
        let author = naming
            .author
            .map(sanitize_component)
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
        path.push(author);

        if series_in_path {
            if let Some(series) = naming.series.map(sanitize_component) {
                if !series.is_empty() {
                    path.push(series);
                }
            }
        }
    }

    path.push(format!("{}.{}", title, extension));
    path
}

/// Avoid filename collision by appending (1), (2), etc.
pub fn avoid_collision(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

    let mut counter = 1;
    loop {
        let candidate = if extension.is_empty() {
            format!("{} ({})", stem, counter)
        } else {
            format!("{} ({}).{}", stem, counter, extension)
        };
        let candidate = parent.join(candidate);
        if !candidate.exists() || counter > 9999 {
            return candidate;
        }
        counter += 1;
    }
}
