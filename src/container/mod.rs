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


//! AAX container parsing
//!
//! Streaming parser for the subset of ISO base media boxes an
//! Audible-branded file needs: the movie header tree, sample tables, the
//! proprietary adrm blob, the AAC decoder configuration, the item list,
//! and the chapter text track.
//!
//! # Module Organization
//!
//! ## reader
//! Buffered seekable byte access with big-endian field helpers.
//!
//! ## boxes
//! Box-header decoding and container descent; no content interpretation.
//!
//! ## moov
//! Track and sample-table resolution into flat per-sample entries.
//!
//! ## metadata
//! Item-list tags, cover art and text-track chapters.
//!
//! [`AaxInput`] ties the pieces together: it parses everything up front
//! and then serves payload reads against the resolved sample entries. The
//! sample entries hold plain file offsets, so parsed state carries no
//! reference back into the reader.

pub mod boxes;
pub mod metadata;
pub mod moov;
pub mod reader;

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tracing::{debug, info};

use crate::audio::metadata::{BookMetadata, Chapter};
use crate::error::{AaxError, Result};
use boxes::read_box_header;
use moov::{Movie, SampleEntry, TrackInfo};
use reader::ByteReader;

/// Accepted major brands, after trimming trailing spaces.
const ACCEPTED_BRANDS: [&str; 2] = ["aax", "M4B"];

/// A parsed AAX source file.
///
/// All structure is resolved at open time; afterwards the reader is only
/// used to fetch sample payloads on demand.
#[derive(Debug)]
pub struct AaxInput<R: Read + Seek = BufReader<File>> {
    reader: ByteReader<R>,
    movie: Movie,
    audio_idx: usize,
    pub metadata: BookMetadata,
    pub chapters: Vec<Chapter>,
}

impl AaxInput<BufReader<File>> {
    /// Open and parse an AAX file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        info!("opening AAX input: {}", path.display());
        Self::from_reader(ByteReader::open(path)?)
    }
}

impl<R: Read + Seek> AaxInput<R> {
    /// Parse an AAX stream from an already-open source.
    pub fn from_reader(mut reader: ByteReader<R>) -> Result<Self> {
        if reader.len() < 8 {
            return Err(AaxError::MalformedContainer(
                "file too small to hold a box header".into(),
            ));
        }

        let mut moov_header = None;
        let mut saw_ftyp = false;
        let mut pos = 0u64;
        while pos + 8 <= reader.len() {
            reader.seek_to(pos)?;
            let header = read_box_header(&mut reader, true)?;
            match header.fourcc.as_bytes() {
                b"ftyp" => {
                    check_brand(&mut reader, &header)?;
                    saw_ftyp = true;
                }
                b"moov" => moov_header = Some(header),
                _ => {}
            }
            pos = header.end();
        }

        if !saw_ftyp {
            return Err(AaxError::MalformedContainer("no ftyp box".into()));
        }
        let moov_header = moov_header
            .ok_or_else(|| AaxError::MalformedContainer("no moov box".into()))?;

        let movie = moov::parse_moov(&mut reader, &moov_header)?;
        let audio_idx = movie
            .tracks
            .iter()
            .position(|t| t.handler == moov::HandlerType::Sound)
            .ok_or_else(|| AaxError::MalformedContainer("no audio track in moov".into()))?;

        let metadata = metadata::parse_metadata(&mut reader, &moov_header)?;
        let chapters = match movie.text_track() {
            Some(text) => metadata::parse_chapters(&mut reader, text)?,
            None => Vec::new(),
        };

        let audio = &movie.tracks[audio_idx];
        info!(
            "parsed input: {} Hz, {} ch, {} samples, {} chapter(s), encrypted={}",
            audio.sample_rate,
            audio.channels,
            audio.samples.len(),
            chapters.len(),
            audio.encrypted
        );

        Ok(Self {
            reader,
            movie,
            audio_idx,
            metadata,
            chapters,
        })
    }

    /// The resolved audio track.
    pub fn audio_track(&self) -> &TrackInfo {
        &self.movie.tracks[self.audio_idx]
    }

    /// All resolved tracks.
    pub fn movie(&self) -> &Movie {
        &self.movie
    }

    /// The adrm blob, or `NotEncrypted` when the audio track has none.
    pub fn require_adrm(&self) -> Result<&[u8]> {
        self.audio_track()
            .adrm
            .as_deref()
            .ok_or(AaxError::NotEncrypted)
    }

    /// Fetch one sample's raw (still encrypted) payload.
    pub fn read_sample(&mut self, entry: &SampleEntry) -> Result<Vec<u8>> {
        self.reader.seek_to(entry.offset)?;
        self.reader.read_bytes(entry.size as usize)
    }
}

/// ftyp: the major brand, trimmed of padding spaces, must be one of the
/// Audible-compatible brands.
fn check_brand<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    ftyp: &boxes::BoxHeader,
) -> Result<()> {
    if ftyp.content_len() < 4 {
        return Err(AaxError::MalformedContainer("ftyp too small".into()));
    }
    reader.seek_to(ftyp.content_start)?;
    let brand_bytes = reader.read_fourcc()?;
    let brand = String::from_utf8_lossy(&brand_bytes);
    let trimmed = brand.trim_matches(|c| c == ' ' || c == '\0');
    if !ACCEPTED_BRANDS.contains(&trimmed) {
        return Err(AaxError::MalformedContainer(format!(
            "unsupported brand {:?}",
            brand
        )));
    }
    debug!("accepted brand {:?}", trimmed);
    Ok(())
}
