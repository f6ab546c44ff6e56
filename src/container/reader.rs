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


//! Buffered, seekable byte-level access to the source file
//!
//! Everything the parser reads goes through [`ByteReader`]: big-endian
//! integer fields, fourcc codes, and raw payload slices. Sequential reads
//! coalesce in the underlying `BufReader`; a short read at EOF surfaces as
//! an I/O error rather than a truncated buffer.

use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;

/// Read-only random access over a file-like source.
#[derive(Debug)]
pub struct ByteReader<R: Read + Seek> {
    inner: R,
    len: u64,
}

impl ByteReader<BufReader<File>> {
    /// Open a file for buffered reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ByteReader<R> {
    /// Wrap an existing source, measuring its total length once.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len })
    }

    /// Total source length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current read position.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Seek to an absolute offset.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Skip forward over `n` bytes.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Current(n as i64))?;
        Ok(())
    }

    /// Read exactly `n` bytes into a fresh buffer.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read exactly 4 bytes, the size of a fourcc.
    pub fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.inner.read_u16::<BigEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<BigEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.inner.read_u64::<BigEndian>()?)
    }
}
