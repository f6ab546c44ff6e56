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


//! Fast-start M4B/M4A muxer
//!
//! Writes a single-AAC-track MP4 with the moov box ahead of mdat so
//! players can start immediately. Packet payloads stream into an
//! anonymous spill file while only their sizes and durations are held in
//! memory; finalization writes `ftyp`, the complete `moov` (with final
//! chunk offsets), and then copies the staged payload in as `mdat`.
//!
//! Output layout choices:
//! - one sample per chunk; `stco` unless an offset needs 64 bits
//! - the track timescale and the AAC AudioSpecificConfig are taken from
//!   the source unchanged
//! - tags go into `udta/meta/ilst`, chapters into a `chpl` list with
//!   titles verbatim and start times carried at millisecond precision

use byteorder::{BigEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, Cursor, Seek, SeekFrom, Write};

use tracing::{debug, info};

use crate::audio::metadata::{BookMetadata, Chapter};
use crate::audio::OutputFormat;
use crate::error::{AaxError, Result};
use crate::mux::atoms::{
    box_size_placeholder, encode_language, fill_box_size, mp4_time_now, seconds_to_ticks,
    write_box_header, write_descriptor_len, write_fixed_16_16, write_fixed_8_8,
    write_full_box_header, write_zeros,
};

/// Movie-level timescale used by mvhd/tkhd.
const MOVIE_TIMESCALE: u32 = 1000;

/// The single audio track's ID.
pub const AUDIO_TRACK_ID: u32 = 1;

/// chpl stores start times in 100-nanosecond units.
const CHPL_TICKS_PER_MS: u64 = 10_000;

/// Audio track parameters the muxer needs up front.
#[derive(Debug, Clone)]
pub struct AudioTrackConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Ticks per second for sample durations; reused from the source.
    pub timescale: u32,
    /// AAC AudioSpecificConfig, copied verbatim into esds.
    pub codec_config: Vec<u8>,
}

/// One packet handed to [`Mp4Muxer::write_packet`].
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub data: &'a [u8],
    pub timestamp_seconds: f64,
    pub duration_seconds: f64,
    pub is_keyframe: bool,
}

#[derive(Debug)]
struct MuxSample {
    size: u32,
    duration: u32,
}

/// Fast-start MP4 muxer over any seekable sink.
#[derive(Debug)]
pub struct Mp4Muxer<W: Write + Seek> {
    out: W,
    format: OutputFormat,
    track: AudioTrackConfig,
    metadata: BookMetadata,
    chapters: Vec<Chapter>,
    spill: File,
    samples: Vec<MuxSample>,
    payload_len: u64,
    duration_ticks: u64,
    last_timestamp: f64,
}

impl<W: Write + Seek> Mp4Muxer<W> {
    /// Create a muxer writing to `out`.
    ///
    /// # Errors
    /// - `UnsupportedOutputFormat` for any non-MP4-family format
    pub fn new(out: W, format: OutputFormat, track: AudioTrackConfig) -> Result<Self> {
        if !format.is_mp4_family() {
            return Err(AaxError::UnsupportedOutputFormat(format.name().to_string()));
        }
        if track.timescale == 0 {
            return Err(AaxError::Muxer("audio timescale must be non-zero".into()));
        }
        Ok(Self {
            out,
            format,
            track,
            metadata: BookMetadata::default(),
            chapters: Vec::new(),
            spill: tempfile::tempfile()?,
            samples: Vec::new(),
            payload_len: 0,
            duration_ticks: 0,
            last_timestamp: 0.0,
        })
    }

    /// Tags written into the item list at finalization.
    pub fn set_metadata(&mut self, metadata: BookMetadata) {
        self.metadata = metadata;
    }

    /// Chapters written as a chpl list at finalization.
    pub fn set_chapters(&mut self, chapters: Vec<Chapter>) {
        self.chapters = chapters;
    }

    /// Append one packet. Packets must arrive in non-decreasing timestamp
    /// order; the payload is staged on disk until finalization.
    pub fn write_packet(&mut self, track_id: u32, packet: &Packet<'_>) -> Result<()> {
        if track_id != AUDIO_TRACK_ID {
            return Err(AaxError::Muxer(format!("unknown track id {}", track_id)));
        }
        if packet.timestamp_seconds < self.last_timestamp {
            return Err(AaxError::Muxer(format!(
                "packet timestamp {} decreases below {}",
                packet.timestamp_seconds, self.last_timestamp
            )));
        }
        self.last_timestamp = packet.timestamp_seconds;

        self.spill.write_all(packet.data)?;
        let duration = seconds_to_ticks(packet.duration_seconds, self.track.timescale);
        self.samples.push(MuxSample {
            size: packet.data.len() as u32,
            duration: duration as u32,
        });
        self.payload_len += packet.data.len() as u64;
        self.duration_ticks += duration;
        Ok(())
    }

    /// Write the container around the staged payload and return the sink.
    pub fn finalize(mut self) -> Result<W> {
        let ftyp = self.build_ftyp()?;

        // moov size does not depend on the offset base, only on the
        // stco/co64 choice, so one sizing pass pins the layout.
        let sizing_moov = self.build_moov(0, false)?;
        let mdat_header_len: u64 = if self.payload_len + 8 > u32::MAX as u64 {
            16
        } else {
            8
        };
        let mut base = ftyp.len() as u64 + sizing_moov.len() as u64 + mdat_header_len;
        let use_co64 = base + self.payload_len > u32::MAX as u64;
        if use_co64 {
            let sizing_moov = self.build_moov(0, true)?;
            base = ftyp.len() as u64 + sizing_moov.len() as u64 + mdat_header_len;
        }
        let moov = self.build_moov(base, use_co64)?;

        self.out.write_all(&ftyp)?;
        self.out.write_all(&moov)?;

        if mdat_header_len == 16 {
            self.out.write_u32::<BigEndian>(1)?;
            self.out.write_all(b"mdat")?;
            self.out.write_u64::<BigEndian>(self.payload_len + 16)?;
        } else {
            write_box_header(&mut self.out, b"mdat", (self.payload_len + 8) as u32)?;
        }

        self.spill.seek(SeekFrom::Start(0))?;
        let copied = io::copy(&mut self.spill, &mut self.out)?;
        if copied != self.payload_len {
            return Err(AaxError::Muxer(format!(
                "staged payload changed size: expected {} bytes, copied {}",
                self.payload_len, copied
            )));
        }
        self.out.flush()?;

        info!(
            "finalized output: {} samples, {} payload bytes, {} chapter(s)",
            self.samples.len(),
            self.payload_len,
            self.chapters.len()
        );
        Ok(self.out)
    }

    fn build_ftyp(&self) -> Result<Vec<u8>> {
        // Brand presence is guaranteed by the format check in new().
        let brand = self
            .format
            .brand()
            .ok_or_else(|| AaxError::UnsupportedOutputFormat(self.format.name().to_string()))?;
        let mut buf = Cursor::new(Vec::new());
        let compatible: [&[u8; 4]; 4] = [brand, b"M4A ", b"mp42", b"isom"];
        write_box_header(&mut buf, b"ftyp", 8 + 4 + 4 + 4 * compatible.len() as u32)?;
        buf.write_all(brand)?;
        buf.write_u32::<BigEndian>(0x200)?;
        for compat in compatible {
            buf.write_all(compat)?;
        }
        Ok(buf.into_inner())
    }

    fn build_moov(&self, mdat_payload_start: u64, use_co64: bool) -> Result<Vec<u8>> {
        let mut w = Cursor::new(Vec::new());
        let moov_pos = box_size_placeholder(&mut w)?;
        w.write_all(b"moov")?;

        self.write_mvhd(&mut w)?;
        self.write_trak(&mut w, mdat_payload_start, use_co64)?;
        self.write_udta(&mut w)?;

        fill_box_size(&mut w, moov_pos)?;
        Ok(w.into_inner())
    }

    fn movie_duration(&self) -> u64 {
        // Track ticks rescaled to the movie timescale.
        let seconds = self.duration_ticks as f64 / self.track.timescale as f64;
        seconds_to_ticks(seconds, MOVIE_TIMESCALE)
    }

    fn write_mvhd(&self, w: &mut Cursor<Vec<u8>>) -> Result<()> {
        let pos = box_size_placeholder(w)?;
        w.write_all(b"mvhd")?;
        w.write_u32::<BigEndian>(0)?; // version + flags

        let now = mp4_time_now();
        w.write_u32::<BigEndian>(now)?;
        w.write_u32::<BigEndian>(now)?;
        w.write_u32::<BigEndian>(MOVIE_TIMESCALE)?;
        w.write_u32::<BigEndian>(self.movie_duration() as u32)?;

        write_fixed_16_16(w, 1.0)?; // rate
        write_fixed_8_8(w, 1.0)?; // volume
        write_zeros(w, 10)?; // reserved

        self.write_unity_matrix(w)?;
        write_zeros(w, 24)?; // pre-defined
        w.write_u32::<BigEndian>(AUDIO_TRACK_ID + 1)?; // next_track_ID

        fill_box_size(w, pos)?;
        Ok(())
    }

    fn write_unity_matrix(&self, w: &mut Cursor<Vec<u8>>) -> Result<()> {
        write_fixed_16_16(w, 1.0)?;
        write_fixed_16_16(w, 0.0)?;
        write_fixed_16_16(w, 0.0)?;
        write_fixed_16_16(w, 0.0)?;
        write_fixed_16_16(w, 1.0)?;
        write_fixed_16_16(w, 0.0)?;
        write_fixed_16_16(w, 0.0)?;
        write_fixed_16_16(w, 0.0)?;
        w.write_u32::<BigEndian>(0x4000_0000)?;
        Ok(())
    }

    fn write_trak(
        &self,
        w: &mut Cursor<Vec<u8>>,
        mdat_payload_start: u64,
        use_co64: bool,
    ) -> Result<()> {
        let pos = box_size_placeholder(w)?;
        w.write_all(b"trak")?;
        self.write_tkhd(w)?;
        self.write_mdia(w, mdat_payload_start, use_co64)?;
        fill_box_size(w, pos)?;
        Ok(())
    }

    fn write_tkhd(&self, w: &mut Cursor<Vec<u8>>) -> Result<()> {
        let pos = box_size_placeholder(w)?;
        w.write_all(b"tkhd")?;
        // version=0, flags = track_enabled | track_in_movie
        w.write_u32::<BigEndian>(0x0000_0003)?;

        let now = mp4_time_now();
        w.write_u32::<BigEndian>(now)?;
        w.write_u32::<BigEndian>(now)?;
        w.write_u32::<BigEndian>(AUDIO_TRACK_ID)?;
        write_zeros(w, 4)?;
        w.write_u32::<BigEndian>(self.movie_duration() as u32)?;

        write_zeros(w, 8)?; // reserved
        w.write_i16::<BigEndian>(0)?; // layer
        w.write_i16::<BigEndian>(0)?; // alternate_group
        write_fixed_8_8(w, 1.0)?; // volume (audio track)
        write_zeros(w, 2)?;
        self.write_unity_matrix(w)?;
        write_fixed_16_16(w, 0.0)?; // width
        write_fixed_16_16(w, 0.0)?; // height

        fill_box_size(w, pos)?;
        Ok(())
    }

    fn write_mdia(
        &self,
        w: &mut Cursor<Vec<u8>>,
        mdat_payload_start: u64,
        use_co64: bool,
    ) -> Result<()> {
        let pos = box_size_placeholder(w)?;
        w.write_all(b"mdia")?;

        // mdhd
        let mdhd_pos = box_size_placeholder(w)?;
        w.write_all(b"mdhd")?;
        w.write_u32::<BigEndian>(0)?;
        let now = mp4_time_now();
        w.write_u32::<BigEndian>(now)?;
        w.write_u32::<BigEndian>(now)?;
        w.write_u32::<BigEndian>(self.track.timescale)?;
        w.write_u32::<BigEndian>(self.duration_ticks as u32)?;
        w.write_u16::<BigEndian>(encode_language("und"))?;
        w.write_u16::<BigEndian>(0)?;
        fill_box_size(w, mdhd_pos)?;

        // hdlr
        let hdlr_pos = box_size_placeholder(w)?;
        w.write_all(b"hdlr")?;
        w.write_u32::<BigEndian>(0)?;
        write_zeros(w, 4)?;
        w.write_all(b"soun")?;
        write_zeros(w, 12)?;
        w.write_all(b"SoundHandler\0")?;
        fill_box_size(w, hdlr_pos)?;

        self.write_minf(w, mdat_payload_start, use_co64)?;
        fill_box_size(w, pos)?;
        Ok(())
    }

    fn write_minf(
        &self,
        w: &mut Cursor<Vec<u8>>,
        mdat_payload_start: u64,
        use_co64: bool,
    ) -> Result<()> {
        let pos = box_size_placeholder(w)?;
        w.write_all(b"minf")?;

        // smhd
        write_full_box_header(w, b"smhd", 16, 0, 0)?;
        w.write_i16::<BigEndian>(0)?; // balance
        write_zeros(w, 2)?;

        // dinf/dref with a self-contained url entry
        let dinf_pos = box_size_placeholder(w)?;
        w.write_all(b"dinf")?;
        let dref_pos = box_size_placeholder(w)?;
        w.write_all(b"dref")?;
        w.write_u32::<BigEndian>(0)?;
        w.write_u32::<BigEndian>(1)?;
        write_full_box_header(w, b"url ", 12, 0, 0x000001)?;
        fill_box_size(w, dref_pos)?;
        fill_box_size(w, dinf_pos)?;

        self.write_stbl(w, mdat_payload_start, use_co64)?;
        fill_box_size(w, pos)?;
        Ok(())
    }

    fn write_stbl(
        &self,
        w: &mut Cursor<Vec<u8>>,
        mdat_payload_start: u64,
        use_co64: bool,
    ) -> Result<()> {
        let pos = box_size_placeholder(w)?;
        w.write_all(b"stbl")?;

        self.write_stsd(w)?;
        self.write_stts(w)?;

        // stsc: one sample per chunk throughout
        let stsc_pos = box_size_placeholder(w)?;
        w.write_all(b"stsc")?;
        w.write_u32::<BigEndian>(0)?;
        if self.samples.is_empty() {
            w.write_u32::<BigEndian>(0)?;
        } else {
            w.write_u32::<BigEndian>(1)?;
            w.write_u32::<BigEndian>(1)?; // first_chunk
            w.write_u32::<BigEndian>(1)?; // samples_per_chunk
            w.write_u32::<BigEndian>(1)?; // sample_description_index
        }
        fill_box_size(w, stsc_pos)?;

        // stsz
        let stsz_pos = box_size_placeholder(w)?;
        w.write_all(b"stsz")?;
        w.write_u32::<BigEndian>(0)?;
        w.write_u32::<BigEndian>(0)?; // variable sizes
        w.write_u32::<BigEndian>(self.samples.len() as u32)?;
        for sample in &self.samples {
            w.write_u32::<BigEndian>(sample.size)?;
        }
        fill_box_size(w, stsz_pos)?;

        // stco / co64
        let co_pos = box_size_placeholder(w)?;
        w.write_all(if use_co64 { b"co64" } else { b"stco" })?;
        w.write_u32::<BigEndian>(0)?;
        w.write_u32::<BigEndian>(self.samples.len() as u32)?;
        let mut offset = mdat_payload_start;
        for sample in &self.samples {
            if use_co64 {
                w.write_u64::<BigEndian>(offset)?;
            } else {
                w.write_u32::<BigEndian>(offset as u32)?;
            }
            offset += sample.size as u64;
        }
        fill_box_size(w, co_pos)?;

        fill_box_size(w, pos)?;
        Ok(())
    }

    /// stts: run-length encoded (sample_count, sample_delta) pairs.
    fn write_stts(&self, w: &mut Cursor<Vec<u8>>) -> Result<()> {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for sample in &self.samples {
            match runs.last_mut() {
                Some((count, delta)) if *delta == sample.duration => {
                    *count += 1;
                }
                _ => runs.push((1, sample.duration)),
            }
        }

        let pos = box_size_placeholder(w)?;
        w.write_all(b"stts")?;
        w.write_u32::<BigEndian>(0)?;
        w.write_u32::<BigEndian>(runs.len() as u32)?;
        for (count, delta) in runs {
            w.write_u32::<BigEndian>(count)?;
            w.write_u32::<BigEndian>(delta)?;
        }
        fill_box_size(w, pos)?;
        Ok(())
    }

    fn write_stsd(&self, w: &mut Cursor<Vec<u8>>) -> Result<()> {
        let pos = box_size_placeholder(w)?;
        w.write_all(b"stsd")?;
        w.write_u32::<BigEndian>(0)?;
        w.write_u32::<BigEndian>(1)?; // entry_count

        // mp4a AudioSampleEntry
        let entry_pos = box_size_placeholder(w)?;
        w.write_all(b"mp4a")?;
        write_zeros(w, 6)?; // reserved
        w.write_u16::<BigEndian>(1)?; // data_reference_index
        write_zeros(w, 8)?; // reserved
        w.write_u16::<BigEndian>(self.track.channels)?;
        w.write_u16::<BigEndian>(16)?; // samplesize
        write_zeros(w, 4)?; // pre_defined + reserved
        w.write_u32::<BigEndian>(self.track.sample_rate << 16)?;

        self.write_esds(w)?;
        fill_box_size(w, entry_pos)?;
        fill_box_size(w, pos)?;
        Ok(())
    }

    /// esds: the descriptor chain around the copied AudioSpecificConfig.
    fn write_esds(&self, w: &mut Cursor<Vec<u8>>) -> Result<()> {
        let config = &self.track.codec_config;
        let pos = box_size_placeholder(w)?;
        w.write_all(b"esds")?;
        w.write_u32::<BigEndian>(0)?;

        let dec_config_len = 13 + 5 + config.len();
        let es_desc_len = 3 + 5 + dec_config_len;

        w.write_u8(0x03)?; // ES_DescrTag
        write_descriptor_len(w, es_desc_len)?;
        w.write_u16::<BigEndian>(AUDIO_TRACK_ID as u16)?; // ES_ID
        w.write_u8(0)?; // stream priority

        w.write_u8(0x04)?; // DecoderConfigDescrTag
        write_descriptor_len(w, dec_config_len)?;
        w.write_u8(0x40)?; // objectTypeIndication: ISO/IEC 14496-3 audio
        w.write_u8(0x15)?; // streamType: audio
        write_zeros(w, 3)?; // bufferSizeDB
        w.write_u32::<BigEndian>(128_000)?; // maxBitrate
        w.write_u32::<BigEndian>(128_000)?; // avgBitrate

        w.write_u8(0x05)?; // DecoderSpecificInfoTag
        write_descriptor_len(w, config.len())?;
        w.write_all(config)?;

        w.write_u8(0x06)?; // SLConfigDescrTag
        write_descriptor_len(w, 1)?;
        w.write_u8(0x02)?; // predefined: MP4

        fill_box_size(w, pos)?;
        Ok(())
    }

    fn write_udta(&self, w: &mut Cursor<Vec<u8>>) -> Result<()> {
        let has_tags = self.metadata.title.is_some()
            || self.metadata.author.is_some()
            || self.metadata.narrator.is_some()
            || self.metadata.publisher.is_some()
            || self.metadata.year.is_some()
            || self.metadata.copyright.is_some()
            || self.metadata.description.is_some()
            || self.metadata.cover.is_some();
        if !has_tags && self.chapters.is_empty() {
            return Ok(());
        }

        let pos = box_size_placeholder(w)?;
        w.write_all(b"udta")?;
        if has_tags {
            self.write_meta(w)?;
        }
        if !self.chapters.is_empty() {
            self.write_chpl(w)?;
        }
        fill_box_size(w, pos)?;
        Ok(())
    }

    fn write_meta(&self, w: &mut Cursor<Vec<u8>>) -> Result<()> {
        let pos = box_size_placeholder(w)?;
        w.write_all(b"meta")?;
        w.write_u32::<BigEndian>(0)?; // full box version + flags

        // hdlr for the metadata handler
        let hdlr_pos = box_size_placeholder(w)?;
        w.write_all(b"hdlr")?;
        w.write_u32::<BigEndian>(0)?;
        write_zeros(w, 4)?;
        w.write_all(b"mdir")?;
        w.write_all(b"appl")?;
        write_zeros(w, 8)?;
        w.write_u8(0)?; // empty name
        fill_box_size(w, hdlr_pos)?;

        let ilst_pos = box_size_placeholder(w)?;
        w.write_all(b"ilst")?;
        write_text_item(w, b"\xa9nam", self.metadata.title.as_deref())?;
        write_text_item(w, b"\xa9ART", self.metadata.author.as_deref())?;
        write_text_item(w, b"aART", self.metadata.narrator.as_deref())?;
        write_text_item(w, b"\xa9pub", self.metadata.publisher.as_deref())?;
        write_text_item(w, b"\xa9day", self.metadata.year.as_deref())?;
        write_text_item(w, b"cprt", self.metadata.copyright.as_deref())?;
        write_text_item(w, b"desc", self.metadata.description.as_deref())?;
        if let Some(cover) = &self.metadata.cover {
            let type_code: u32 = if cover.is_jpeg() { 13 } else { 14 };
            write_data_item(w, b"covr", type_code, cover.data())?;
        }
        fill_box_size(w, ilst_pos)?;

        fill_box_size(w, pos)?;
        Ok(())
    }

    /// Nero-style chapter list. Start times are converted from
    /// milliseconds to the box's 100 ns unit; the u8 fields cap a list at
    /// 255 chapters and titles at 255 bytes.
    fn write_chpl(&self, w: &mut Cursor<Vec<u8>>) -> Result<()> {
        let count = self.chapters.len().min(255);
        if count < self.chapters.len() {
            debug!("chpl holds at most 255 chapters; writing first {}", count);
        }

        let pos = box_size_placeholder(w)?;
        w.write_all(b"chpl")?;
        w.write_u32::<BigEndian>(0x0100_0000)?; // version 1, flags 0
        w.write_u32::<BigEndian>(0)?; // reserved
        w.write_u8(count as u8)?;
        for chapter in &self.chapters[..count] {
            w.write_u64::<BigEndian>(chapter.start_ms() * CHPL_TICKS_PER_MS)?;
            let title = truncate_utf8(&chapter.title, 255);
            w.write_u8(title.len() as u8)?;
            w.write_all(title.as_bytes())?;
        }
        fill_box_size(w, pos)?;
        Ok(())
    }
}

fn write_text_item(w: &mut Cursor<Vec<u8>>, ident: &[u8; 4], value: Option<&str>) -> Result<()> {
    match value {
        Some(text) => write_data_item(w, ident, 1, text.as_bytes()),
        None => Ok(()),
    }
}

fn write_data_item(
    w: &mut Cursor<Vec<u8>>,
    ident: &[u8; 4],
    type_code: u32,
    payload: &[u8],
) -> Result<()> {
    let pos = box_size_placeholder(w)?;
    w.write_all(ident)?;
    let data_pos = box_size_placeholder(w)?;
    w.write_all(b"data")?;
    w.write_u32::<BigEndian>(type_code)?;
    w.write_u32::<BigEndian>(0)?; // locale
    w.write_all(payload)?;
    fill_box_size(w, data_pos)?;
    fill_box_size(w, pos)?;
    Ok(())
}

fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Stream one decrypted source sample into the muxer, keeping the running
/// timestamp in source ticks to avoid floating-point drift.
pub fn packet_from_ticks<'a>(
    data: &'a [u8],
    cumulative_ticks: u64,
    duration_ticks: u32,
    timescale: u32,
    is_keyframe: bool,
) -> Packet<'a> {
    Packet {
        data,
        timestamp_seconds: cumulative_ticks as f64 / timescale as f64,
        duration_seconds: duration_ticks as f64 / timescale as f64,
        is_keyframe,
    }
}
