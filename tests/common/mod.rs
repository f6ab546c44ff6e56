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

//! Shared test fixture: a complete, valid AAX file synthesized in memory.
//!
//! The fixture mirrors what Audible ships: an `aax `-branded container
//! with one aavd sound track (esds + adrm in the sample entry), a text
//! chapter track, ilst metadata with cover art, and an mdat holding
//! AES-CBC encrypted samples. Keys are derived exactly the way the
//! converter derives them, so the whole pipeline can be exercised without
//! real Audible content.

use aes::Aes128;
use byteorder::{BigEndian, WriteBytesExt};
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use sha1::{Digest, Sha1};
use std::io::Write;

use aaxtract::crypto::FIXED_KEY;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

/// The fixture's activation code.
pub const ACTIVATION: &str = "1CEB00DA";

/// Audio parameters: 44.1 kHz stereo, 150 samples, 2321 s total.
pub const SAMPLE_RATE: u32 = 44_100;
pub const CHANNELS: u16 = 2;
pub const AUDIO_SAMPLES: usize = 150;
pub const AUDIO_DELTA: u32 = 682_374; // ticks; 150 * delta = 2321 s exactly
pub const DURATION_SECONDS: f64 = 2321.0;

/// The AAC AudioSpecificConfig carried through esds: AAC-LC, 44100, stereo.
pub const ASC: [u8; 2] = [0x12, 0x10];

pub const CHAPTER_TITLES: [&str; 4] = [
    "Opening Credits",
    "Part One",
    "Part Two",
    "End Credits",
];
/// Chapter durations in text-track ticks (milliseconds), summing to 2321 s.
pub const CHAPTER_DURATIONS_MS: [u32; 4] = [300_000, 600_000, 700_000, 721_000];

pub const TITLE: &str = "The Test Tome";
pub const AUTHOR: &str = "Ada Lovecraft";
pub const NARRATOR: &str = "Voice Talent";

const FILE_KEY: [u8; 16] = [
    0xC0, 0xFF, 0xEE, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB,
    0xCC,
];

pub struct Fixture {
    pub bytes: Vec<u8>,
    /// Decrypted payload of every audio sample, in order.
    pub plaintexts: Vec<Vec<u8>>,
}

fn sha1_digest(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let mut cipher = Aes128CbcEnc::new(key.into(), iv.into());
    for block in data.chunks_exact_mut(16) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn activation_bytes() -> [u8; 4] {
    let mut bytes = [0u8; 4];
    hex::decode_to_slice(ACTIVATION, &mut bytes).unwrap();
    bytes
}

fn intermediate_keys() -> ([u8; 16], [u8; 16]) {
    let activation = activation_bytes();
    let ik_full = sha1_digest(&[&FIXED_KEY, &activation]);
    let iv_full = sha1_digest(&[&FIXED_KEY, &ik_full, &activation]);
    (
        ik_full[..16].try_into().unwrap(),
        iv_full[..16].try_into().unwrap(),
    )
}

/// The decrypted 48-byte DRM payload embedded in the adrm blob.
fn drm_payload() -> [u8; 48] {
    let mut activation = activation_bytes();
    activation.reverse();
    let mut payload = [0u8; 48];
    payload[0..4].copy_from_slice(&activation);
    payload[4..8].copy_from_slice(&[0, 0, 0, 1]);
    payload[8..24].copy_from_slice(&FILE_KEY);
    for (i, b) in payload[24..48].iter_mut().enumerate() {
        *b = 0x5A ^ i as u8;
    }
    payload
}

/// The per-file key/IV the converter will derive.
pub fn file_keys() -> ([u8; 16], [u8; 16]) {
    let payload = drm_payload();
    let iv_full = sha1_digest(&[&payload[26..42], &FILE_KEY, &FIXED_KEY]);
    (FILE_KEY, iv_full[..16].try_into().unwrap())
}

fn adrm_blob() -> Vec<u8> {
    let (ik, iv) = intermediate_keys();
    let mut encrypted = drm_payload();
    cbc_encrypt(&ik, &iv, &mut encrypted);

    let mut blob = Vec::with_capacity(88);
    blob.extend_from_slice(&[0, 0, 0, 0x38, 0, 0, 0, 1]);
    blob.extend_from_slice(&encrypted);
    blob.extend_from_slice(&[0u8; 12]);
    blob.extend_from_slice(&sha1_digest(&[&ik, &iv]));
    blob
}

fn boxed(fourcc: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 8);
    out.write_u32::<BigEndian>(content.len() as u32 + 8).unwrap();
    out.write_all(fourcc).unwrap();
    out.write_all(content).unwrap();
    out
}

fn audio_plaintext(index: usize) -> Vec<u8> {
    // Variable sizes including non-block-aligned tails.
    let size = 160 + (index % 13) * 7;
    (0..size).map(|j| ((index * 31 + j * 3) % 251) as u8).collect()
}

fn encrypt_audio_sample(plaintext: &[u8]) -> Vec<u8> {
    let (key, iv) = file_keys();
    let aligned = plaintext.len() - (plaintext.len() % 16);
    let mut out = plaintext.to_vec();
    cbc_encrypt(&key, &iv, &mut out[..aligned]);
    out
}

fn chapter_sample(title: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u16::<BigEndian>(title.len() as u16).unwrap();
    out.write_all(title.as_bytes()).unwrap();
    out
}

fn write_stts(content: &mut Vec<u8>, runs: &[(u32, u32)]) {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(0).unwrap();
    body.write_u32::<BigEndian>(runs.len() as u32).unwrap();
    for &(count, delta) in runs {
        body.write_u32::<BigEndian>(count).unwrap();
        body.write_u32::<BigEndian>(delta).unwrap();
    }
    content.extend_from_slice(&boxed(b"stts", &body));
}

fn write_stsz(content: &mut Vec<u8>, sizes: &[u32]) {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(0).unwrap();
    body.write_u32::<BigEndian>(0).unwrap(); // variable sizes
    body.write_u32::<BigEndian>(sizes.len() as u32).unwrap();
    for &size in sizes {
        body.write_u32::<BigEndian>(size).unwrap();
    }
    content.extend_from_slice(&boxed(b"stsz", &body));
}

fn write_stsc(content: &mut Vec<u8>) {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(0).unwrap();
    body.write_u32::<BigEndian>(1).unwrap();
    body.write_u32::<BigEndian>(1).unwrap(); // first_chunk
    body.write_u32::<BigEndian>(1).unwrap(); // samples_per_chunk
    body.write_u32::<BigEndian>(1).unwrap(); // sample_description_index
    content.extend_from_slice(&boxed(b"stsc", &body));
}

fn write_stco(content: &mut Vec<u8>, offsets: &[u64]) {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(0).unwrap();
    body.write_u32::<BigEndian>(offsets.len() as u32).unwrap();
    for &offset in offsets {
        body.write_u32::<BigEndian>(offset as u32).unwrap();
    }
    content.extend_from_slice(&boxed(b"stco", &body));
}

fn esds_box() -> Vec<u8> {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(0).unwrap(); // version + flags
    body.write_u8(0x03).unwrap();
    body.write_u8(3 + 5 + 13 + 5 + ASC.len() as u8).unwrap();
    body.write_u16::<BigEndian>(1).unwrap(); // ES_ID
    body.write_u8(0).unwrap();
    body.write_u8(0x04).unwrap();
    body.write_u8(13 + 5 + ASC.len() as u8).unwrap();
    body.write_u8(0x40).unwrap();
    body.write_u8(0x15).unwrap();
    body.write_all(&[0, 0, 0]).unwrap();
    body.write_u32::<BigEndian>(128_000).unwrap();
    body.write_u32::<BigEndian>(128_000).unwrap();
    body.write_u8(0x05).unwrap();
    body.write_u8(ASC.len() as u8).unwrap();
    body.write_all(&ASC).unwrap();
    body.write_u8(0x06).unwrap();
    body.write_u8(1).unwrap();
    body.write_u8(0x02).unwrap();
    boxed(b"esds", &body)
}

fn audio_sample_entry() -> Vec<u8> {
    let mut body = Vec::new();
    body.write_all(&[0u8; 6]).unwrap(); // reserved
    body.write_u16::<BigEndian>(1).unwrap(); // data_reference_index
    body.write_all(&[0u8; 8]).unwrap(); // reserved
    body.write_u16::<BigEndian>(CHANNELS).unwrap();
    body.write_u16::<BigEndian>(16).unwrap(); // samplesize
    body.write_all(&[0u8; 4]).unwrap(); // pre_defined + reserved
    body.write_u32::<BigEndian>(SAMPLE_RATE << 16).unwrap();
    body.extend_from_slice(&esds_box());
    body.extend_from_slice(&boxed(b"adrm", &adrm_blob()));
    boxed(b"aavd", &body)
}

fn text_sample_entry() -> Vec<u8> {
    boxed(b"tx3g", &[0u8; 16])
}

fn stsd_box(entry: Vec<u8>) -> Vec<u8> {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(0).unwrap();
    body.write_u32::<BigEndian>(1).unwrap();
    body.extend_from_slice(&entry);
    boxed(b"stsd", &body)
}

fn mdhd_box(timescale: u32, duration: u32) -> Vec<u8> {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(0).unwrap(); // version + flags
    body.write_u32::<BigEndian>(0).unwrap(); // creation
    body.write_u32::<BigEndian>(0).unwrap(); // modification
    body.write_u32::<BigEndian>(timescale).unwrap();
    body.write_u32::<BigEndian>(duration).unwrap();
    body.write_u16::<BigEndian>(0x55C4).unwrap(); // "und"
    body.write_u16::<BigEndian>(0).unwrap();
    boxed(b"mdhd", &body)
}

fn hdlr_box(handler: &[u8; 4]) -> Vec<u8> {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(0).unwrap();
    body.write_u32::<BigEndian>(0).unwrap();
    body.write_all(handler).unwrap();
    body.write_all(&[0u8; 12]).unwrap();
    body.write_all(b"Handler\0").unwrap();
    boxed(b"hdlr", &body)
}

fn trak_box(
    timescale: u32,
    duration: u32,
    handler: &[u8; 4],
    sample_entry: Vec<u8>,
    stts_runs: &[(u32, u32)],
    sizes: &[u32],
    offsets: &[u64],
) -> Vec<u8> {
    let mut stbl = Vec::new();
    stbl.extend_from_slice(&stsd_box(sample_entry));
    write_stts(&mut stbl, stts_runs);
    write_stsz(&mut stbl, sizes);
    write_stsc(&mut stbl);
    write_stco(&mut stbl, offsets);
    let stbl = boxed(b"stbl", &stbl);

    let minf = boxed(b"minf", &stbl);

    let mut mdia = Vec::new();
    mdia.extend_from_slice(&mdhd_box(timescale, duration));
    mdia.extend_from_slice(&hdlr_box(handler));
    mdia.extend_from_slice(&minf);
    boxed(b"trak", &boxed(b"mdia", &mdia))
}

fn data_atom(type_code: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.write_u32::<BigEndian>(type_code).unwrap();
    body.write_u32::<BigEndian>(0).unwrap();
    body.write_all(payload).unwrap();
    boxed(b"data", &body)
}

fn ilst_box() -> Vec<u8> {
    let mut items = Vec::new();
    items.extend_from_slice(&boxed(b"\xa9nam", &data_atom(1, TITLE.as_bytes())));
    items.extend_from_slice(&boxed(b"\xa9ART", &data_atom(1, AUTHOR.as_bytes())));
    items.extend_from_slice(&boxed(b"aART", &data_atom(1, NARRATOR.as_bytes())));
    items.extend_from_slice(&boxed(b"\xa9day", &data_atom(1, b"2020")));
    // Minimal JPEG-magic cover.
    items.extend_from_slice(&boxed(
        b"covr",
        &data_atom(13, &[0xFF, 0xD8, 0xFF, 0xE0, 0x10, 0x20, 0x30]),
    ));
    boxed(b"ilst", &items)
}

fn udta_box() -> Vec<u8> {
    let mut meta = vec![0u8; 4]; // full box version + flags
    meta.extend_from_slice(&hdlr_box(b"mdir"));
    meta.extend_from_slice(&ilst_box());
    boxed(b"udta", &boxed(b"meta", &meta))
}

/// Build the fixture: `ftyp` + `mdat` + `moov`.
pub fn build_fixture() -> Fixture {
    // ftyp: brand "aax " like real Audible files.
    let mut ftyp_content = Vec::new();
    ftyp_content.write_all(b"aax ").unwrap();
    ftyp_content.write_u32::<BigEndian>(0).unwrap();
    ftyp_content.write_all(b"aax ").unwrap();
    let ftyp = boxed(b"ftyp", &ftyp_content);

    // mdat payload: encrypted audio samples, then chapter text samples.
    let plaintexts: Vec<Vec<u8>> = (0..AUDIO_SAMPLES).map(audio_plaintext).collect();
    let encrypted: Vec<Vec<u8>> = plaintexts.iter().map(|p| encrypt_audio_sample(p)).collect();
    let text_samples: Vec<Vec<u8>> = CHAPTER_TITLES.iter().map(|t| chapter_sample(t)).collect();

    let mdat_content_start = ftyp.len() as u64 + 8;
    let mut payload = Vec::new();
    let mut audio_offsets = Vec::new();
    for sample in &encrypted {
        audio_offsets.push(mdat_content_start + payload.len() as u64);
        payload.extend_from_slice(sample);
    }
    let mut text_offsets = Vec::new();
    for sample in &text_samples {
        text_offsets.push(mdat_content_start + payload.len() as u64);
        payload.extend_from_slice(sample);
    }
    let mdat = boxed(b"mdat", &payload);

    // moov: audio track, text track, metadata.
    let audio_sizes: Vec<u32> = encrypted.iter().map(|s| s.len() as u32).collect();
    let audio_trak = trak_box(
        SAMPLE_RATE,
        AUDIO_SAMPLES as u32 * AUDIO_DELTA,
        b"soun",
        audio_sample_entry(),
        &[(AUDIO_SAMPLES as u32, AUDIO_DELTA)],
        &audio_sizes,
        &audio_offsets,
    );

    let text_sizes: Vec<u32> = text_samples.iter().map(|s| s.len() as u32).collect();
    let text_runs: Vec<(u32, u32)> =
        CHAPTER_DURATIONS_MS.iter().map(|&ms| (1u32, ms)).collect();
    let text_trak = trak_box(
        1000,
        CHAPTER_DURATIONS_MS.iter().sum(),
        b"text",
        text_sample_entry(),
        &text_runs,
        &text_sizes,
        &text_offsets,
    );

    let mut moov_content = Vec::new();
    moov_content.extend_from_slice(&audio_trak);
    moov_content.extend_from_slice(&text_trak);
    moov_content.extend_from_slice(&udta_box());
    let moov = boxed(b"moov", &moov_content);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&ftyp);
    bytes.extend_from_slice(&mdat);
    bytes.extend_from_slice(&moov);

    Fixture { bytes, plaintexts }
}

/// Write the fixture to `dir` and return its path.
pub fn write_fixture(dir: &std::path::Path) -> (std::path::PathBuf, Fixture) {
    let fixture = build_fixture();
    let path = dir.join("fixture.aax");
    std::fs::write(&path, &fixture.bytes).unwrap();
    (path, fixture)
}
