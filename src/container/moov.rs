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


//! Track and sample-table resolution from the moov box
//!
//! Consumes `trak/mdia/{mdhd,hdlr,minf/stbl}` and assembles, per track, a
//! flat list of sample entries (absolute file offset, size, duration,
//! sync flag) from the five sample-table boxes:
//!
//! - `stsd` - sample description; for sound tracks the first entry must be
//!   `aavd` (Audible-encrypted) or `mp4a`, carrying `esds` and, for aavd,
//!   the `adrm` blob
//! - `stts` - run-length encoded per-sample durations
//! - `stsz` - per-sample sizes, or one default size for all
//! - `stsc` - samples-per-chunk runs (1-based first_chunk keys)
//! - `stco`/`co64` - chunk offsets; exactly one of the two
//!
//! The resolver reads table boxes only, never payload bytes. Offsets are
//! validated against the source length so a corrupt table fails here
//! instead of deep inside the sample loop.

use std::io::{Read, Seek};

use tracing::debug;

use crate::container::boxes::{read_box_header, walk_children, BoxHeader};
use crate::container::reader::ByteReader;
use crate::error::{AaxError, Result};

/// One audio access unit (or one chapter-text sample) in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// Absolute byte offset in the source file.
    pub offset: u64,
    /// Size in bytes.
    pub size: u32,
    /// Duration in track timescale ticks.
    pub duration: u32,
    /// Sync-sample flag; always true when the track has no stss box.
    pub keyframe: bool,
}

/// Media handler classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Sound,
    Text,
    Other,
}

/// Everything the converter needs to know about one track.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub handler: HandlerType,
    /// Ticks per second for this track's durations.
    pub timescale: u32,
    /// Track duration in ticks, as declared by mdhd.
    pub duration: u64,
    pub channels: u16,
    pub sample_rate: u32,
    /// AAC AudioSpecificConfig bytes copied verbatim from esds.
    pub codec_config: Vec<u8>,
    /// Raw adrm box content, present on Audible-encrypted audio.
    pub adrm: Option<Vec<u8>>,
    /// True when the sample description entry was `aavd`.
    pub encrypted: bool,
    pub samples: Vec<SampleEntry>,
}

impl TrackInfo {
    pub fn duration_seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.duration as f64 / self.timescale as f64
    }
}

/// The resolved movie: all tracks, leaves first.
#[derive(Debug, Clone)]
pub struct Movie {
    pub tracks: Vec<TrackInfo>,
}

impl Movie {
    /// The first sound track, which AAX files have exactly one of.
    pub fn audio_track(&self) -> Result<&TrackInfo> {
        self.tracks
            .iter()
            .find(|t| t.handler == HandlerType::Sound)
            .ok_or_else(|| AaxError::MalformedContainer("no audio track in moov".into()))
    }

    /// The chapter text track, if present.
    pub fn text_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.handler == HandlerType::Text)
    }
}

/// Parse the moov box into a [`Movie`].
pub fn parse_moov<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    moov: &BoxHeader,
) -> Result<Movie> {
    let mut tracks = Vec::new();

    let mut trak_headers = Vec::new();
    walk_children(reader, moov.content_start, moov.end(), |_, child| {
        if child.fourcc == b"trak" {
            trak_headers.push(*child);
        }
        Ok(())
    })?;

    for trak in &trak_headers {
        tracks.push(parse_trak(reader, trak)?);
    }

    debug!("resolved {} track(s) from moov", tracks.len());
    Ok(Movie { tracks })
}

/// Per-track raw sample tables before expansion.
#[derive(Default)]
struct RawTables {
    durations: Option<Vec<(u32, u32)>>,
    default_size: u32,
    sizes: Option<Vec<u32>>,
    sample_count: u32,
    sample_to_chunk: Vec<(u32, u32)>,
    stsc_present: bool,
    chunk_offsets: Option<Vec<u64>>,
    stco_seen: bool,
    co64_seen: bool,
    sync_samples: Option<Vec<u32>>,
}

fn find_child<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    parent: &BoxHeader,
    fourcc: &[u8; 4],
) -> Result<Option<BoxHeader>> {
    let mut found = None;
    walk_children(reader, parent.content_start, parent.end(), |_, child| {
        if found.is_none() && child.fourcc == fourcc {
            found = Some(*child);
        }
        Ok(())
    })?;
    Ok(found)
}

fn parse_trak<R: Read + Seek>(reader: &mut ByteReader<R>, trak: &BoxHeader) -> Result<TrackInfo> {
    let mdia = find_child(reader, trak, b"mdia")?
        .ok_or_else(|| AaxError::MalformedContainer("trak without mdia".into()))?;

    let mdhd = find_child(reader, &mdia, b"mdhd")?
        .ok_or_else(|| AaxError::MalformedContainer("mdia without mdhd".into()))?;
    let (timescale, duration) = parse_mdhd(reader, &mdhd)?;

    let hdlr = find_child(reader, &mdia, b"hdlr")?
        .ok_or_else(|| AaxError::MalformedContainer("mdia without hdlr".into()))?;
    let handler = parse_hdlr(reader, &hdlr)?;

    let minf = find_child(reader, &mdia, b"minf")?
        .ok_or_else(|| AaxError::MalformedContainer("mdia without minf".into()))?;
    let stbl = find_child(reader, &minf, b"stbl")?
        .ok_or_else(|| AaxError::MalformedContainer("minf without stbl".into()))?;

    let mut track = TrackInfo {
        handler,
        timescale,
        duration,
        channels: 0,
        sample_rate: 0,
        codec_config: Vec::new(),
        adrm: None,
        encrypted: false,
        samples: Vec::new(),
    };
    let mut tables = RawTables::default();

    parse_stbl(reader, &stbl, &mut track, &mut tables)?;

    track.samples = build_samples(&tables, handler, reader.len())?;
    debug!(
        "track handler={:?} timescale={} samples={}",
        handler,
        timescale,
        track.samples.len()
    );
    Ok(track)
}

/// mdhd: timescale and duration. Version 1 carries the duration as two
/// 32-bit halves, high then low.
fn parse_mdhd<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    mdhd: &BoxHeader,
) -> Result<(u32, u64)> {
    reader.seek_to(mdhd.content_start)?;
    let version = reader.read_u8()?;
    reader.skip(3)?; // flags

    if version == 1 {
        reader.skip(16)?; // creation_time + modification_time (64-bit each)
        let timescale = reader.read_u32()?;
        let high = reader.read_u32()?;
        let low = reader.read_u32()?;
        Ok((timescale, ((high as u64) << 32) | low as u64))
    } else {
        reader.skip(8)?; // creation_time + modification_time
        let timescale = reader.read_u32()?;
        let duration = reader.read_u32()?;
        Ok((timescale, duration as u64))
    }
}

fn parse_hdlr<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    hdlr: &BoxHeader,
) -> Result<HandlerType> {
    reader.seek_to(hdlr.content_start)?;
    reader.skip(4)?; // version + flags
    reader.skip(4)?; // pre_defined
    let handler = reader.read_fourcc()?;
    Ok(match &handler {
        b"soun" => HandlerType::Sound,
        b"text" => HandlerType::Text,
        _ => HandlerType::Other,
    })
}

fn parse_stbl<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    stbl: &BoxHeader,
    track: &mut TrackInfo,
    tables: &mut RawTables,
) -> Result<()> {
    let mut children = Vec::new();
    walk_children(reader, stbl.content_start, stbl.end(), |_, child| {
        children.push(*child);
        Ok(())
    })?;

    for child in &children {
        match child.fourcc.as_bytes() {
            b"stsd" => parse_stsd(reader, child, track)?,
            b"stts" => {
                reader.seek_to(child.content_start)?;
                reader.skip(4)?;
                let entry_count = reader.read_u32()?;
                let mut entries = Vec::with_capacity(entry_count.min(1 << 20) as usize);
                for _ in 0..entry_count {
                    let count = reader.read_u32()?;
                    let delta = reader.read_u32()?;
                    entries.push((count, delta));
                }
                tables.durations = Some(entries);
            }
            b"stsz" => {
                reader.seek_to(child.content_start)?;
                reader.skip(4)?;
                let default_size = reader.read_u32()?;
                let sample_count = reader.read_u32()?;
                tables.default_size = default_size;
                tables.sample_count = sample_count;
                if default_size == 0 {
                    let mut sizes = Vec::with_capacity(sample_count.min(1 << 20) as usize);
                    for _ in 0..sample_count {
                        sizes.push(reader.read_u32()?);
                    }
                    tables.sizes = Some(sizes);
                } else {
                    tables.sizes = Some(Vec::new());
                }
            }
            b"stsc" => {
                reader.seek_to(child.content_start)?;
                reader.skip(4)?;
                let entry_count = reader.read_u32()?;
                for _ in 0..entry_count {
                    let first_chunk = reader.read_u32()?;
                    let samples_per_chunk = reader.read_u32()?;
                    let _desc_index = reader.read_u32()?;
                    tables.sample_to_chunk.push((first_chunk, samples_per_chunk));
                }
                tables.stsc_present = true;
            }
            b"stco" => {
                reader.seek_to(child.content_start)?;
                reader.skip(4)?;
                let entry_count = reader.read_u32()?;
                let mut offsets = Vec::with_capacity(entry_count.min(1 << 20) as usize);
                for _ in 0..entry_count {
                    offsets.push(reader.read_u32()? as u64);
                }
                tables.chunk_offsets = Some(offsets);
                tables.stco_seen = true;
            }
            b"co64" => {
                reader.seek_to(child.content_start)?;
                reader.skip(4)?;
                let entry_count = reader.read_u32()?;
                let mut offsets = Vec::with_capacity(entry_count.min(1 << 20) as usize);
                for _ in 0..entry_count {
                    offsets.push(reader.read_u64()?);
                }
                tables.chunk_offsets = Some(offsets);
                tables.co64_seen = true;
            }
            b"stss" => {
                reader.seek_to(child.content_start)?;
                reader.skip(4)?;
                let entry_count = reader.read_u32()?;
                let mut syncs = Vec::with_capacity(entry_count.min(1 << 20) as usize);
                for _ in 0..entry_count {
                    syncs.push(reader.read_u32()?);
                }
                tables.sync_samples = Some(syncs);
            }
            _ => {}
        }
    }
    Ok(())
}

/// stsd: the first entry of a sound track must be aavd or mp4a. The entry
/// header carries channel count at byte 24 and the sample rate at byte 32
/// as 16.16 fixed point; esds and adrm follow as child boxes.
fn parse_stsd<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    stsd: &BoxHeader,
    track: &mut TrackInfo,
) -> Result<()> {
    reader.seek_to(stsd.content_start)?;
    reader.skip(4)?; // version + flags
    let entry_count = reader.read_u32()?;
    if entry_count == 0 {
        return Err(AaxError::MalformedContainer("stsd with no entries".into()));
    }

    let entry = read_box_header(reader, false)?;
    if track.handler != HandlerType::Sound {
        return Ok(());
    }

    match entry.fourcc.as_bytes() {
        b"aavd" => track.encrypted = true,
        b"mp4a" => track.encrypted = false,
        other => {
            return Err(AaxError::MalformedContainer(format!(
                "unexpected audio sample entry '{}'",
                crate::container::boxes::FourCc(*other)
            )));
        }
    }

    if entry.end() < entry.start + 36 {
        return Err(AaxError::MalformedContainer(
            "audio sample entry too small".into(),
        ));
    }

    // AudioSampleEntry fixed fields.
    reader.seek_to(entry.start + 24)?;
    track.channels = reader.read_u16()?;
    reader.seek_to(entry.start + 32)?;
    let rate_16_16 = reader.read_u32()?;
    track.sample_rate = rate_16_16 >> 16;

    // Child boxes start after the 36-byte fixed header.
    walk_children(reader, entry.start + 36, entry.end(), |reader, child| {
        match child.fourcc.as_bytes() {
            b"esds" => {
                if child.content_len() < 4 {
                    return Err(AaxError::MalformedContainer("esds too small".into()));
                }
                reader.seek_to(child.content_start)?;
                reader.skip(4)?; // version + flags
                let body = reader.read_bytes((child.content_len() - 4) as usize)?;
                track.codec_config = extract_audio_specific_config(&body)?;
            }
            b"adrm" => {
                reader.seek_to(child.content_start)?;
                track.adrm = Some(reader.read_bytes(child.content_len() as usize)?);
            }
            _ => {}
        }
        Ok(())
    })
}

/// Walk the ES_Descriptor hierarchy inside esds and copy out the
/// DecoderSpecificInfo payload (the AudioSpecificConfig).
fn extract_audio_specific_config(data: &[u8]) -> Result<Vec<u8>> {
    let mut idx = 0usize;

    let bad = |what: &str| AaxError::MalformedContainer(format!("esds: {}", what));

    let tag = *data.get(idx).ok_or_else(|| bad("empty descriptor"))?;
    if tag != 0x03 {
        return Err(bad("expected ES_Descriptor tag"));
    }
    idx += 1;
    read_descriptor_len(data, &mut idx)?;

    // ES_ID and flags; optional fields follow depending on the flag bits.
    if idx + 3 > data.len() {
        return Err(bad("truncated ES_Descriptor"));
    }
    let flags = data[idx + 2];
    idx += 3;
    if flags & 0x80 != 0 {
        idx += 2; // dependsOn_ES_ID
    }
    if flags & 0x40 != 0 {
        let url_len = *data.get(idx).ok_or_else(|| bad("truncated URL field"))? as usize;
        idx += 1 + url_len;
    }
    if flags & 0x20 != 0 {
        idx += 2; // OCR_ES_ID
    }

    let tag = *data.get(idx).ok_or_else(|| bad("missing DecoderConfigDescriptor"))?;
    if tag != 0x04 {
        return Err(bad("expected DecoderConfigDescriptor tag"));
    }
    idx += 1;
    read_descriptor_len(data, &mut idx)?;
    idx += 13; // objectType, streamType, bufferSizeDB, maxBitrate, avgBitrate

    let tag = *data.get(idx).ok_or_else(|| bad("missing DecoderSpecificInfo"))?;
    if tag != 0x05 {
        return Err(bad("expected DecoderSpecificInfo tag"));
    }
    idx += 1;
    let len = read_descriptor_len(data, &mut idx)?;
    if idx + len > data.len() {
        return Err(bad("truncated DecoderSpecificInfo"));
    }

    Ok(data[idx..idx + len].to_vec())
}

/// MPEG-4 expandable descriptor length: up to four bytes of seven payload
/// bits each, high bit flagging continuation.
fn read_descriptor_len(data: &[u8], idx: &mut usize) -> Result<usize> {
    let mut len = 0usize;
    for _ in 0..4 {
        let byte = *data
            .get(*idx)
            .ok_or_else(|| AaxError::MalformedContainer("esds: truncated length".into()))?;
        *idx += 1;
        len = (len << 7) | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            return Ok(len);
        }
    }
    Ok(len)
}

/// Expand the raw tables into per-sample entries by walking chunks in
/// file order.
fn build_samples(
    tables: &RawTables,
    handler: HandlerType,
    file_len: u64,
) -> Result<Vec<SampleEntry>> {
    let required_missing = tables.durations.is_none()
        || tables.sizes.is_none()
        || tables.chunk_offsets.is_none();
    if required_missing {
        if handler == HandlerType::Sound {
            return Err(AaxError::MalformedContainer(
                "audio track is missing stts, stsz or chunk offsets".into(),
            ));
        }
        // Non-audio tracks without tables simply contribute no samples.
        return Ok(Vec::new());
    }
    if tables.stco_seen && tables.co64_seen {
        return Err(AaxError::MalformedContainer(
            "track carries both stco and co64".into(),
        ));
    }

    let n = tables.sample_count as usize;
    let sizes = tables.sizes.as_ref().unwrap();
    let chunk_offsets = tables.chunk_offsets.as_ref().unwrap();

    let size_of = |i: usize| -> u32 {
        if tables.default_size != 0 {
            tables.default_size
        } else {
            sizes[i]
        }
    };

    // Per-sample durations from the stts runs. A table covering fewer
    // samples than stsz claims is padded with the last delta.
    let mut durations = Vec::with_capacity(n);
    for &(count, delta) in tables.durations.as_ref().unwrap() {
        for _ in 0..count {
            if durations.len() == n {
                break;
            }
            durations.push(delta);
        }
    }
    if durations.len() < n {
        let last = durations.last().copied().unwrap_or(0);
        debug!(
            "stts covers {} of {} samples; padding with last delta",
            durations.len(),
            n
        );
        durations.resize(n, last);
    }

    // samples_per_chunk for a 1-based chunk index: the last stsc run whose
    // first_chunk does not exceed it. No stsc means one sample per chunk.
    let samples_in_chunk = |chunk_1based: u32| -> u32 {
        if !tables.stsc_present {
            return 1;
        }
        let mut spc = 1;
        for &(first_chunk, samples_per_chunk) in &tables.sample_to_chunk {
            if first_chunk <= chunk_1based {
                spc = samples_per_chunk;
            } else {
                break;
            }
        }
        spc
    };

    let mut samples = Vec::with_capacity(n);
    let mut sample_idx = 0usize;
    for (chunk_idx, &chunk_offset) in chunk_offsets.iter().enumerate() {
        if sample_idx == n {
            break;
        }
        let spc = samples_in_chunk(chunk_idx as u32 + 1);
        let mut offset = chunk_offset;
        for _ in 0..spc {
            if sample_idx == n {
                break;
            }
            let size = size_of(sample_idx);
            if offset + size as u64 > file_len {
                return Err(AaxError::MalformedContainer(format!(
                    "sample {} at offset {} with size {} extends past end of file",
                    sample_idx, offset, size
                )));
            }
            samples.push(SampleEntry {
                offset,
                size,
                duration: durations[sample_idx],
                keyframe: true,
            });
            offset += size as u64;
            sample_idx += 1;
        }
    }

    if sample_idx < n {
        return Err(AaxError::MalformedContainer(format!(
            "chunk list exhausted after {} of {} samples",
            sample_idx, n
        )));
    }

    if let Some(syncs) = &tables.sync_samples {
        for entry in samples.iter_mut() {
            entry.keyframe = false;
        }
        for &num in syncs {
            if let Some(entry) = samples.get_mut(num as usize - 1) {
                entry.keyframe = true;
            }
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_tables(
        stts: Vec<(u32, u32)>,
        sizes: Vec<u32>,
        stsc: Vec<(u32, u32)>,
        offsets: Vec<u64>,
    ) -> RawTables {
        RawTables {
            durations: Some(stts),
            default_size: 0,
            sample_count: sizes.len() as u32,
            sizes: Some(sizes),
            stsc_present: !stsc.is_empty(),
            sample_to_chunk: stsc,
            chunk_offsets: Some(offsets),
            stco_seen: true,
            co64_seen: false,
            sync_samples: None,
        }
    }

    #[test]
    fn test_build_samples_contiguous_within_chunk() {
        let tables = raw_tables(
            vec![(4, 1024)],
            vec![100, 200, 300, 400],
            vec![(1, 2)],
            vec![1000, 5000],
        );
        let samples = build_samples(&tables, HandlerType::Sound, 100_000).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0].offset, 1000);
        assert_eq!(samples[1].offset, 1100);
        assert_eq!(samples[2].offset, 5000);
        assert_eq!(samples[3].offset, 5300);
        assert!(samples.iter().all(|s| s.duration == 1024 && s.keyframe));
    }

    #[test]
    fn test_build_samples_stsc_runs() {
        // Chunks 1-2 hold 3 samples each, chunk 3 holds 1.
        let sizes: Vec<u32> = vec![10; 7];
        let tables = raw_tables(
            vec![(7, 512)],
            sizes,
            vec![(1, 3), (3, 1)],
            vec![100, 200, 300],
        );
        let samples = build_samples(&tables, HandlerType::Sound, 10_000).unwrap();
        assert_eq!(samples.len(), 7);
        assert_eq!(samples[2].offset, 120);
        assert_eq!(samples[3].offset, 200);
        assert_eq!(samples[6].offset, 300);
    }

    #[test]
    fn test_build_samples_default_size() {
        let mut tables = raw_tables(vec![(3, 100)], Vec::new(), vec![(1, 3)], vec![0]);
        tables.default_size = 50;
        tables.sample_count = 3;
        let samples = build_samples(&tables, HandlerType::Sound, 1000).unwrap();
        assert_eq!(samples.iter().map(|s| s.size).collect::<Vec<_>>(), [50, 50, 50]);
        assert_eq!(samples[2].offset, 100);
    }

    #[test]
    fn test_build_samples_no_stsc_means_one_per_chunk() {
        let tables = raw_tables(vec![(2, 10)], vec![5, 5], Vec::new(), vec![0, 100]);
        let samples = build_samples(&tables, HandlerType::Sound, 1000).unwrap();
        assert_eq!(samples[0].offset, 0);
        assert_eq!(samples[1].offset, 100);
    }

    #[test]
    fn test_build_samples_offset_past_eof_is_fatal() {
        let tables = raw_tables(vec![(1, 10)], vec![100], vec![(1, 1)], vec![950]);
        let err = build_samples(&tables, HandlerType::Sound, 1000).unwrap_err();
        assert!(matches!(err, AaxError::MalformedContainer(_)));
    }

    #[test]
    fn test_build_samples_missing_tables_fatal_for_audio() {
        let tables = RawTables::default();
        let err = build_samples(&tables, HandlerType::Sound, 1000).unwrap_err();
        assert!(matches!(err, AaxError::MalformedContainer(_)));
    }

    #[test]
    fn test_build_samples_missing_tables_empty_for_text() {
        let tables = RawTables::default();
        let samples = build_samples(&tables, HandlerType::Text, 1000).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_build_samples_both_chunk_tables_fatal() {
        let mut tables = raw_tables(vec![(1, 10)], vec![10], vec![(1, 1)], vec![0]);
        tables.co64_seen = true;
        let err = build_samples(&tables, HandlerType::Sound, 1000).unwrap_err();
        assert!(matches!(err, AaxError::MalformedContainer(_)));
    }

    #[test]
    fn test_build_samples_exhausted_chunks_fatal() {
        let tables = raw_tables(vec![(3, 10)], vec![10, 10, 10], vec![(1, 1)], vec![0]);
        let err = build_samples(&tables, HandlerType::Sound, 1000).unwrap_err();
        assert!(matches!(err, AaxError::MalformedContainer(_)));
    }

    #[test]
    fn test_stts_padding_when_short() {
        let tables = raw_tables(vec![(2, 64)], vec![1, 1, 1], vec![(1, 3)], vec![0]);
        let samples = build_samples(&tables, HandlerType::Sound, 1000).unwrap();
        assert_eq!(
            samples.iter().map(|s| s.duration).collect::<Vec<_>>(),
            [64, 64, 64]
        );
    }

    #[test]
    fn test_sync_table_applied() {
        let mut tables = raw_tables(vec![(3, 10)], vec![4, 4, 4], vec![(1, 3)], vec![0]);
        tables.sync_samples = Some(vec![2]);
        let samples = build_samples(&tables, HandlerType::Sound, 1000).unwrap();
        assert_eq!(
            samples.iter().map(|s| s.keyframe).collect::<Vec<_>>(),
            [false, true, false]
        );
    }

    #[test]
    fn test_extract_asc_minimal() {
        // ES(0x03) -> DecoderConfig(0x04) -> DecoderSpecificInfo(0x05)
        let data: Vec<u8> = vec![
            0x03, 0x19, // ES_Descriptor, len
            0x00, 0x01, 0x00, // ES_ID, flags
            0x04, 0x11, // DecoderConfigDescriptor, len
            0x40, 0x15, 0x00, 0x00, 0x00, // objectType, streamType, bufferSize
            0x00, 0x01, 0xF4, 0x00, // maxBitrate
            0x00, 0x01, 0xF4, 0x00, // avgBitrate
            0x05, 0x02, // DecoderSpecificInfo, len
            0x12, 0x10, // AudioSpecificConfig: AAC-LC 44100 stereo
        ];
        let asc = extract_audio_specific_config(&data).unwrap();
        assert_eq!(asc, vec![0x12, 0x10]);
    }

    #[test]
    fn test_extract_asc_long_form_lengths() {
        // Same hierarchy with 0x80-prefixed expandable lengths.
        let data: Vec<u8> = vec![
            0x03, 0x80, 0x19, 0x00, 0x01, 0x00, 0x04, 0x80, 0x11, 0x40, 0x15, 0x00, 0x00, 0x00,
            0x00, 0x01, 0xF4, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x05, 0x80, 0x02, 0x12, 0x10,
        ];
        let asc = extract_audio_specific_config(&data).unwrap();
        assert_eq!(asc, vec![0x12, 0x10]);
    }

    #[test]
    fn test_extract_asc_rejects_garbage() {
        assert!(extract_audio_specific_config(&[0x07, 0x01, 0x00]).is_err());
        assert!(extract_audio_specific_config(&[]).is_err());
    }
}
