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


//! Activation validation and file key derivation
//!
//! # adrm Blob Layout
//! The adrm box content is at least 88 bytes:
//! - bytes 0..8: size/version header, opaque here
//! - bytes 8..56: 48-byte DRM payload (three AES blocks); decrypted, it
//!   yields the file key
//! - bytes 56..68: separator, opaque
//! - bytes 68..88: SHA-1 checksum used to validate the activation
//!
//! # Derivation Pipeline
//! All hashing is SHA-1; all symmetric crypto is AES-128-CBC without
//! padding. From activation bytes `A`:
//! ```text
//! ik = SHA1(FIXED_KEY || A)[0..16]
//! iv = SHA1(FIXED_KEY || ik_full || A)[0..16]
//! valid iff SHA1(ik || iv) == adrm[68..88]
//! dec = AES-CBC-Dec(ik, iv, adrm[8..56])
//! dec[0..4] must equal the byte-reversed activation value
//! file_key = dec[8..24]
//! file_iv  = SHA1(dec[26..42] || file_key || FIXED_KEY)[0..16]
//! ```
//! The `dec[26..42]` window overlaps `file_key` on purpose; it is part of
//! the scheme, not an off-by-two.

use aes::Aes128;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::crypto::activation::ActivationBytes;
use crate::error::{AaxError, Result};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Process-wide constant mixed into every SHA-1 derivation step.
pub const FIXED_KEY: [u8; 16] = [
    0x77, 0x21, 0x4d, 0x4b, 0x19, 0x6a, 0x87, 0xcd, 0x52, 0x00, 0x45, 0xfd, 0x20, 0xa5, 0x1d, 0x67,
];

/// Minimum adrm content length covering payload, separator and checksum.
pub const ADRM_MIN_LEN: usize = 88;

const DRM_PAYLOAD_START: usize = 8;
const DRM_PAYLOAD_END: usize = 56;
const CHECKSUM_START: usize = 68;
const CHECKSUM_END: usize = 88;

/// The derived per-file key/IV pair.
///
/// Derived once per conversion and borrowed read-only by the sample loop.
#[derive(Clone)]
pub struct FileKeys {
    pub key: [u8; 16],
    pub iv: [u8; 16],
}

impl std::fmt::Debug for FileKeys {
    // Key material stays out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKeys").finish_non_exhaustive()
    }
}

fn sha1_digest(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// The intermediate key/IV pair derived from the activation value alone.
fn intermediate_keys(activation: &ActivationBytes) -> ([u8; 16], [u8; 16]) {
    let ik_full = sha1_digest(&[&FIXED_KEY, activation.as_bytes()]);
    let iv_full = sha1_digest(&[&FIXED_KEY, &ik_full, activation.as_bytes()]);

    let mut ik = [0u8; 16];
    let mut iv = [0u8; 16];
    ik.copy_from_slice(&ik_full[..16]);
    iv.copy_from_slice(&iv_full[..16]);
    (ik, iv)
}

fn cbc_decrypt_in_place(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let mut cipher = Aes128CbcDec::new(key.into(), iv.into());
    for block in data.chunks_exact_mut(16) {
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

/// Check whether an activation value matches an adrm blob.
///
/// This is a predicate, not a fallible operation: structurally broken
/// input (blob shorter than 88 bytes) yields `false`, never an error,
/// because callers consult it speculatively before committing to a
/// conversion.
pub fn validate(adrm: &[u8], activation: &ActivationBytes) -> bool {
    if adrm.len() < ADRM_MIN_LEN {
        return false;
    }

    let (ik, iv) = intermediate_keys(activation);
    let computed = sha1_digest(&[&ik, &iv]);
    computed[..] == adrm[CHECKSUM_START..CHECKSUM_END]
}

/// Derive the per-file AES key and IV from a validated adrm blob.
///
/// Call [`validate`] first; this function re-checks the decrypted payload
/// against the byte-reversed activation value and fails with
/// `ActivationMismatch` if the sanity check does not hold.
///
/// # Errors
/// - `MalformedContainer` if the blob is shorter than 88 bytes
/// - `ActivationMismatch` if the decrypted payload does not open with the
///   reversed activation value
pub fn derive_file_keys(adrm: &[u8], activation: &ActivationBytes) -> Result<FileKeys> {
    if adrm.len() < ADRM_MIN_LEN {
        return Err(AaxError::MalformedContainer(format!(
            "adrm content too short: {} bytes, need at least {}",
            adrm.len(),
            ADRM_MIN_LEN
        )));
    }

    let (ik, iv) = intermediate_keys(activation);

    let mut payload = [0u8; DRM_PAYLOAD_END - DRM_PAYLOAD_START];
    payload.copy_from_slice(&adrm[DRM_PAYLOAD_START..DRM_PAYLOAD_END]);
    cbc_decrypt_in_place(&ik, &iv, &mut payload);

    if payload[0..4] != activation.reversed() {
        return Err(AaxError::ActivationMismatch);
    }

    let mut file_key = [0u8; 16];
    file_key.copy_from_slice(&payload[8..24]);

    let iv_full = sha1_digest(&[&payload[26..42], &file_key, &FIXED_KEY]);
    let mut file_iv = [0u8; 16];
    file_iv.copy_from_slice(&iv_full[..16]);

    debug!("derived file keys for activation {}", activation.to_hex());

    Ok(FileKeys {
        key: file_key,
        iv: file_iv,
    })
}
