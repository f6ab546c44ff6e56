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


//! Book metadata and chapter extraction
//!
//! Metadata comes from the iTunes-style item list at `moov/udta/meta/ilst`.
//! Every field is optional; absent atoms are silently accepted.
//!
//! Chapters come from the text-handler track: each of its samples is a
//! 16-bit big-endian length followed by that many UTF-8 title bytes, and
//! the sample durations partition the timeline. A missing text track
//! yields an empty chapter list, not an error.

use std::io::{Read, Seek};

use tracing::debug;

use crate::audio::metadata::{BookMetadata, Chapter, CoverArt};
use crate::container::boxes::{walk_children, BoxHeader};
use crate::container::moov::TrackInfo;
use crate::container::reader::ByteReader;
use crate::error::Result;

// Item-list atom identifiers (iTunes 4.0 onwards)
const TITLE: [u8; 4] = *b"\xa9nam";
const ARTIST: [u8; 4] = *b"\xa9ART";
const ALBUM_ARTIST: [u8; 4] = *b"aART";
const PUBLISHER: [u8; 4] = *b"\xa9pub";
const YEAR: [u8; 4] = *b"\xa9day";
const COPYRIGHT: [u8; 4] = *b"cprt";
const DESCRIPTION: [u8; 4] = *b"desc";
const ARTWORK: [u8; 4] = *b"covr";

/// Extract book metadata from the moov box's item list.
///
/// Returns an empty record when `udta/meta/ilst` is absent.
pub fn parse_metadata<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    moov: &BoxHeader,
) -> Result<BookMetadata> {
    let mut metadata = BookMetadata::default();

    let Some(udta) = find_child(reader, moov.content_start, moov.end(), b"udta")? else {
        return Ok(metadata);
    };
    let Some(meta) = find_child(reader, udta.content_start, udta.end(), b"meta")? else {
        return Ok(metadata);
    };
    // meta is a full box; its children start after the version/flags word.
    let Some(ilst) = find_child(reader, meta.content_start + 4, meta.end(), b"ilst")? else {
        return Ok(metadata);
    };

    let mut items = Vec::new();
    walk_children(reader, ilst.content_start, ilst.end(), |_, child| {
        items.push(*child);
        Ok(())
    })?;

    for item in &items {
        let Some(payload) = read_data_payload(reader, item)? else {
            continue;
        };
        match item.fourcc.as_bytes() {
            ident if *ident == TITLE => metadata.title = utf8_field(payload),
            ident if *ident == ARTIST => metadata.author = utf8_field(payload),
            ident if *ident == ALBUM_ARTIST => metadata.narrator = utf8_field(payload),
            ident if *ident == PUBLISHER => metadata.publisher = utf8_field(payload),
            ident if *ident == YEAR => metadata.year = utf8_field(payload),
            ident if *ident == COPYRIGHT => metadata.copyright = utf8_field(payload),
            ident if *ident == DESCRIPTION => metadata.description = utf8_field(payload),
            ident if *ident == ARTWORK => {
                if !payload.is_empty() {
                    metadata.cover = Some(CoverArt::new(payload));
                }
            }
            _ => {}
        }
    }

    debug!(
        "parsed item list: title={:?} author={:?} cover={}",
        metadata.title,
        metadata.author,
        metadata.cover.is_some()
    );
    Ok(metadata)
}

/// Read chapters from the text track's samples.
pub fn parse_chapters<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    text_track: &TrackInfo,
) -> Result<Vec<Chapter>> {
    let timescale = text_track.timescale.max(1) as f64;
    let mut chapters = Vec::with_capacity(text_track.samples.len());
    let mut cumulative_ticks = 0u64;

    for sample in &text_track.samples {
        let start_seconds = cumulative_ticks as f64 / timescale;
        cumulative_ticks += sample.duration as u64;
        let end_seconds = cumulative_ticks as f64 / timescale;

        reader.seek_to(sample.offset)?;
        let data = reader.read_bytes(sample.size as usize)?;
        let title = decode_chapter_title(&data);

        chapters.push(Chapter {
            title,
            start_seconds,
            end_seconds,
        });
    }

    debug!("extracted {} chapter(s) from text track", chapters.len());
    Ok(chapters)
}

/// Chapter sample payload: `[u16 BE length][utf-8 bytes]`, possibly
/// followed by styling boxes, which are ignored.
fn decode_chapter_title(data: &[u8]) -> String {
    if data.len() < 2 {
        return String::new();
    }
    let len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let end = (2 + len).min(data.len());
    String::from_utf8_lossy(&data[2..end]).into_owned()
}

fn find_child<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    content_start: u64,
    content_end: u64,
    fourcc: &[u8; 4],
) -> Result<Option<BoxHeader>> {
    let mut found = None;
    walk_children(reader, content_start, content_end, |_, child| {
        if found.is_none() && child.fourcc == fourcc {
            found = Some(*child);
        }
        Ok(())
    })?;
    Ok(found)
}

/// The payload of an item's `data` child, without the type/locale prefix.
fn read_data_payload<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    item: &BoxHeader,
) -> Result<Option<Vec<u8>>> {
    let Some(data) = find_child(reader, item.content_start, item.end(), b"data")? else {
        return Ok(None);
    };
    if data.content_len() < 8 {
        return Ok(None);
    }
    reader.seek_to(data.content_start + 8)?; // type indicator + locale
    Ok(Some(reader.read_bytes((data.content_len() - 8) as usize)?))
}

fn utf8_field(payload: Vec<u8>) -> Option<String> {
    let text = String::from_utf8_lossy(&payload).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
