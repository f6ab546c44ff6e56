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


//! ISO-BMFF box header decoding
//!
//! A box starts with a 32-bit big-endian size and a 4-byte type code. A
//! size of 1 switches to a 64-bit extended size; a size of 0 means the box
//! runs to end of file and is tolerated only at the top level. The walker
//! decodes headers and box boundaries; it never interprets content.

use std::fmt;
use std::io::{Read, Seek};

use crate::container::reader::ByteReader;
use crate::error::{AaxError, Result};

/// A four-character box type code.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

impl PartialEq<&[u8; 4]> for FourCc {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

/// A decoded box header.
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    pub fourcc: FourCc,
    /// Absolute offset of the box's first header byte.
    pub start: u64,
    /// Absolute offset of the first content byte.
    pub content_start: u64,
    /// Total box size including the header.
    pub total_size: u64,
}

impl BoxHeader {
    /// Absolute offset one past the last content byte.
    pub fn end(&self) -> u64 {
        self.start + self.total_size
    }

    /// Content length in bytes.
    pub fn content_len(&self) -> u64 {
        self.end() - self.content_start
    }
}

/// Decode the box header at the reader's current position.
///
/// `top_level` permits the size-0 run-to-EOF form. Sizes below the header
/// length or extending past the end of the source are rejected as
/// `MalformedContainer`.
pub fn read_box_header<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    top_level: bool,
) -> Result<BoxHeader> {
    let start = reader.position()?;
    let size32 = reader.read_u32()?;
    let fourcc = FourCc(reader.read_fourcc()?);

    let (total_size, header_len) = match size32 {
        0 => {
            if !top_level {
                return Err(AaxError::MalformedContainer(format!(
                    "box '{}' at offset {} uses run-to-EOF size below top level",
                    fourcc, start
                )));
            }
            (reader.len() - start, 8u64)
        }
        1 => {
            let large = reader.read_u64()?;
            (large, 16u64)
        }
        n => (n as u64, 8u64),
    };

    if total_size < header_len {
        return Err(AaxError::MalformedContainer(format!(
            "box '{}' at offset {} has impossible size {}",
            fourcc, start, total_size
        )));
    }
    if start + total_size > reader.len() {
        return Err(AaxError::MalformedContainer(format!(
            "box '{}' at offset {} extends past end of file ({} > {})",
            fourcc,
            start,
            start + total_size,
            reader.len()
        )));
    }

    Ok(BoxHeader {
        fourcc,
        start,
        content_start: start + header_len,
        total_size,
    })
}

/// Seek past the given box.
pub fn skip_box<R: Read + Seek>(reader: &mut ByteReader<R>, header: &BoxHeader) -> Result<()> {
    reader.seek_to(header.end())
}

/// Walk the child boxes of a container box, invoking `visit` for each.
///
/// The visitor is free to consume the child's content; the walker reseeks
/// to the next sibling afterwards either way.
pub fn walk_children<R, F>(
    reader: &mut ByteReader<R>,
    content_start: u64,
    content_end: u64,
    mut visit: F,
) -> Result<()>
where
    R: Read + Seek,
    F: FnMut(&mut ByteReader<R>, &BoxHeader) -> Result<()>,
{
    let mut pos = content_start;
    // A truncated trailing header (under 8 bytes of room) ends the walk.
    while pos + 8 <= content_end {
        reader.seek_to(pos)?;
        let child = read_box_header(reader, false)?;
        if child.end() > content_end {
            return Err(AaxError::MalformedContainer(format!(
                "box '{}' at offset {} overruns its parent",
                child.fourcc, child.start
            )));
        }
        visit(reader, &child)?;
        pos = child.end();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader_over(bytes: Vec<u8>) -> ByteReader<Cursor<Vec<u8>>> {
        ByteReader::new(Cursor::new(bytes)).unwrap()
    }

    fn plain_box(fourcc: &[u8; 4], content: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&((content.len() as u32 + 8).to_be_bytes()));
        out.extend_from_slice(fourcc);
        out.extend_from_slice(content);
        out
    }

    #[test]
    fn test_plain_header() {
        let mut r = reader_over(plain_box(b"ftyp", &[0u8; 12]));
        let h = read_box_header(&mut r, true).unwrap();
        assert_eq!(h.fourcc, b"ftyp");
        assert_eq!(h.total_size, 20);
        assert_eq!(h.content_start, 8);
        assert_eq!(h.content_len(), 12);
    }

    #[test]
    fn test_extended_size() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(b"mdat");
        bytes.extend_from_slice(&24u64.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        let mut r = reader_over(bytes);
        let h = read_box_header(&mut r, true).unwrap();
        assert_eq!(h.fourcc, b"mdat");
        assert_eq!(h.total_size, 24);
        assert_eq!(h.content_start, 16);
    }

    #[test]
    fn test_size_zero_runs_to_eof_at_top_level() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(b"mdat");
        bytes.extend_from_slice(&[0xFFu8; 32]);
        let mut r = reader_over(bytes);
        let h = read_box_header(&mut r, true).unwrap();
        assert_eq!(h.total_size, 40);
        assert_eq!(h.end(), 40);
    }

    #[test]
    fn test_size_zero_rejected_below_top_level() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(b"free");
        bytes.extend_from_slice(&[0u8; 8]);
        let mut r = reader_over(bytes);
        assert!(matches!(
            read_box_header(&mut r, false),
            Err(AaxError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_undersized_box_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(b"free");
        bytes.extend_from_slice(&[0u8; 16]);
        let mut r = reader_over(bytes);
        assert!(matches!(
            read_box_header(&mut r, true),
            Err(AaxError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_box_past_eof_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(b"moov");
        bytes.extend_from_slice(&[0u8; 8]);
        let mut r = reader_over(bytes);
        assert!(matches!(
            read_box_header(&mut r, true),
            Err(AaxError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_walk_children_visits_each() {
        let mut content = Vec::new();
        content.extend_from_slice(&plain_box(b"tst1", &[1, 2, 3]));
        content.extend_from_slice(&plain_box(b"tst2", &[]));
        let parent = plain_box(b"moov", &content);
        let end = parent.len() as u64;
        let mut r = reader_over(parent);

        let mut seen = Vec::new();
        walk_children(&mut r, 8, end, |_, child| {
            seen.push(child.fourcc.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["tst1", "tst2"]);
    }

    #[test]
    fn test_walk_children_rejects_overrun() {
        // Child claims 32 bytes but the parent only holds 19.
        let mut parent = Vec::new();
        let mut child = Vec::new();
        child.extend_from_slice(&32u32.to_be_bytes());
        child.extend_from_slice(b"tstX");
        child.extend_from_slice(&[0u8; 3]);
        parent.extend_from_slice(&((child.len() as u32 + 8).to_be_bytes()));
        parent.extend_from_slice(b"moov");
        parent.extend_from_slice(&child);
        // Pad the file so the child's claimed size stays inside EOF.
        parent.extend_from_slice(&[0u8; 40]);
        let mut r = reader_over(parent);
        let result = walk_children(&mut r, 8, 8 + 11, |_, _| Ok(()));
        assert!(matches!(result, Err(AaxError::MalformedContainer(_))));
    }

    #[test]
    fn test_fourcc_display() {
        assert_eq!(FourCc(*b"moov").to_string(), "moov");
        assert_eq!(FourCc([0xA9, b'n', b'a', b'm']).to_string(), "\\xa9nam");
    }
}
