// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! WARC block and payload digests.
//!
//! Digests are rendered the way WARC tools expect them: `sha1:` followed by
//! the RFC 4648 base32 encoding of the hash.

use std::fmt;

use sha1::{Digest as _, Sha1};

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// A labelled digest value such as `sha1:3I42H3S6NNFQ2MSVX7XZKYAYSCX5QBYJ`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: &'static str,
    value: String,
}

impl Digest {
    /// SHA-1 digest of `data`.
    pub fn sha1(data: &[u8]) -> Self {
        let mut hasher = DigestBuilder::new();
        hasher.update(data);
        hasher.finish()
    }

    pub fn algorithm(&self) -> &'static str {
        self.algorithm
    }

    /// Encoded digest value without the algorithm label.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Check whether `data` hashes to this digest.
    pub fn verify(&self, data: &[u8]) -> bool {
        *self == Digest::sha1(data)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Incremental digest computation, used where the hashed bytes are not
/// contiguous (e.g. the de-chunked body of an HTTP message).
#[derive(Default)]
pub struct DigestBuilder {
    hasher: Sha1,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finish(self) -> Digest {
        let hash = self.hasher.finalize();
        Digest {
            algorithm: "sha1",
            value: base32_encode(&hash),
        }
    }
}

/// RFC 4648 base32 with padding.
pub(crate) fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() + 4) / 5 * 8);
    for chunk in data.chunks(5) {
        let mut buf = [0u8; 5];
        buf[..chunk.len()].copy_from_slice(chunk);
        let bits = buf.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);

        // Number of significant output characters for a partial chunk.
        let chars = (chunk.len() * 8 + 4) / 5;
        for i in 0..8 {
            if i < chars {
                let idx = (bits >> (35 - i * 5)) & 0x1f;
                out.push(BASE32_ALPHABET[idx as usize] as char);
            } else {
                out.push('=');
            }
        }
    }
    out
}
