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


//! Low-level box-writing primitives
//!
//! Container boxes are written with a placeholder size that gets patched
//! once the content length is known: [`box_size_placeholder`] records the
//! position, [`fill_box_size`] seeks back and writes the final size.

use byteorder::{BigEndian, WriteBytesExt};
use chrono::Utc;
use std::io::{Seek, SeekFrom, Write};

use crate::error::Result;

/// Offset between the Unix epoch and the MP4 epoch (1904-01-01).
const MP4_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Write a box header with a known size.
pub fn write_box_header<W: Write>(writer: &mut W, fourcc: &[u8; 4], size: u32) -> Result<()> {
    writer.write_u32::<BigEndian>(size)?;
    writer.write_all(fourcc)?;
    Ok(())
}

/// Write a full box header (version + flags) with a known size.
pub fn write_full_box_header<W: Write>(
    writer: &mut W,
    fourcc: &[u8; 4],
    size: u32,
    version: u8,
    flags: u32,
) -> Result<()> {
    write_box_header(writer, fourcc, size)?;
    writer.write_u32::<BigEndian>(((version as u32) << 24) | (flags & 0x00FF_FFFF))?;
    Ok(())
}

/// Start a box whose size is not yet known; returns the position of the
/// size field for [`fill_box_size`].
pub fn box_size_placeholder<W: Write + Seek>(writer: &mut W) -> Result<u64> {
    let pos = writer.stream_position()?;
    writer.write_u32::<BigEndian>(0)?;
    Ok(pos)
}

/// Patch the size of a box started with [`box_size_placeholder`].
pub fn fill_box_size<W: Write + Seek>(writer: &mut W, size_pos: u64) -> Result<()> {
    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(size_pos))?;
    writer.write_u32::<BigEndian>((end - size_pos) as u32)?;
    writer.seek(SeekFrom::Start(end))?;
    Ok(())
}

pub fn write_zeros<W: Write>(writer: &mut W, count: usize) -> Result<()> {
    const ZEROS: [u8; 32] = [0u8; 32];
    let mut remaining = count;
    while remaining > 0 {
        let n = remaining.min(ZEROS.len());
        writer.write_all(&ZEROS[..n])?;
        remaining -= n;
    }
    Ok(())
}

/// 16.16 fixed-point value.
pub fn write_fixed_16_16<W: Write>(writer: &mut W, value: f64) -> Result<()> {
    writer.write_u32::<BigEndian>((value * 65536.0).round() as u32)?;
    Ok(())
}

/// 8.8 fixed-point value.
pub fn write_fixed_8_8<W: Write>(writer: &mut W, value: f64) -> Result<()> {
    writer.write_u16::<BigEndian>((value * 256.0).round() as u16)?;
    Ok(())
}

/// Pack an ISO-639-2 code into the 15-bit mdhd language field.
pub fn encode_language(code: &str) -> u16 {
    let bytes = code.as_bytes();
    if bytes.len() != 3 {
        return encode_language("und");
    }
    let mut packed = 0u16;
    for &b in bytes {
        packed = (packed << 5) | ((b.saturating_sub(0x60)) as u16 & 0x1F);
    }
    packed
}

/// Current time in seconds since the MP4 epoch.
pub fn mp4_time_now() -> u32 {
    let unix = Utc::now().timestamp();
    (unix + MP4_EPOCH_OFFSET).max(0) as u32
}

/// Convert seconds to timescale ticks, rounding to the nearest tick.
pub fn seconds_to_ticks(seconds: f64, timescale: u32) -> u64 {
    (seconds * timescale as f64).round().max(0.0) as u64
}

/// Convert timescale ticks to seconds.
pub fn ticks_to_seconds(ticks: u64, timescale: u32) -> f64 {
    if timescale == 0 {
        return 0.0;
    }
    ticks as f64 / timescale as f64
}

/// MPEG-4 expandable descriptor length (1-4 bytes of 7 payload bits).
pub fn write_descriptor_len<W: Write>(writer: &mut W, len: usize) -> Result<()> {
    if len < 0x80 {
        writer.write_u8(len as u8)?;
        return Ok(());
    }
    let mut groups = Vec::new();
    let mut value = len;
    while value > 0 {
        groups.push((value & 0x7F) as u8);
        value >>= 7;
    }
    groups.reverse();
    let last = groups.len() - 1;
    for (i, group) in groups.iter().enumerate() {
        if i < last {
            writer.write_u8(group | 0x80)?;
        } else {
            writer.write_u8(*group)?;
        }
    }
    Ok(())
}
