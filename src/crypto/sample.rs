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


//! Per-sample AES decryption
//!
//! AAX encrypts each audio access unit independently: every sample is a
//! fresh AES-128-CBC stream starting from the same file IV. Trailing bytes
//! that do not fill a 16-byte block are stored unencrypted and pass
//! through verbatim.

use aes::Aes128;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};

use crate::crypto::drm::FileKeys;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Decrypt one audio sample.
///
/// Output length always equals input length. Samples shorter than one AES
/// block contain no encrypted data and are returned unchanged.
pub fn decrypt_sample(ciphertext: &[u8], keys: &FileKeys) -> Vec<u8> {
    let aligned = ciphertext.len() - (ciphertext.len() % 16);
    let mut plaintext = ciphertext.to_vec();
    if aligned == 0 {
        return plaintext;
    }

    let mut cipher = Aes128CbcDec::new(&keys.key.into(), &keys.iv.into());
    for block in plaintext[..aligned].chunks_exact_mut(16) {
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }

    plaintext
}
