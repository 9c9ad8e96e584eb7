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

//! Per-record compression.
//!
//! Every call to [`Compressor::encode`] yields a self-contained unit that can
//! be decoded without any of the surrounding bytes, so WARC readers can seek to
//! a record offset and start decompressing there.

use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use tracing::debug;
use zstd::dict::{DecoderDictionary, EncoderDictionary};

use crate::error::{Result, WarcError};

pub const MIN_ZSTD_LEVEL: i32 = 1;
pub const MAX_ZSTD_LEVEL: i32 = 22;
pub const DEFAULT_ZSTD_LEVEL: i32 = 11;

/// Record compressor.
#[derive(Debug, Clone, Default)]
pub enum Compressor {
    /// Records are written as-is.
    #[default]
    None,
    /// Every record is an independent zstd frame.
    Zstd(ZstdCompressor),
}

impl Compressor {
    /// Compress one serialized record.
    pub fn encode<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self {
            Compressor::None => Ok(Cow::Borrowed(data)),
            Compressor::Zstd(zstd) => Ok(Cow::Owned(zstd.compress(data)?)),
        }
    }

    /// Decompress one or more concatenated encoded records.
    pub fn decode<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self {
            Compressor::None => Ok(Cow::Borrowed(data)),
            Compressor::Zstd(zstd) => Ok(Cow::Owned(zstd.decompress(data)?)),
        }
    }

    /// Extension appended to `.warc` for files written with this compressor.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Compressor::None => "",
            Compressor::Zstd(_) => ".zst",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compressor::None => "none",
            Compressor::Zstd(_) => "zstd",
        }
    }
}

/// zstd compressor with an optional shared dictionary.
///
/// Cloning is cheap: the prepared dictionary is reference-counted and never
/// mutated after construction.
#[derive(Debug, Clone)]
pub struct ZstdCompressor {
    level: i32,
    dictionary: Option<Arc<ZstdDictionary>>,
}

/// Raw dictionary bytes plus the prepared encoder and decoder tables.
pub struct ZstdDictionary {
    raw: Vec<u8>,
    encoder: EncoderDictionary<'static>,
    decoder: DecoderDictionary<'static>,
}

impl fmt::Debug for ZstdDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZstdDictionary")
            .field("len", &self.raw.len())
            .finish_non_exhaustive()
    }
}

impl ZstdDictionary {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

impl ZstdCompressor {
    /// Plain zstd compressor.
    pub fn new(level: i32) -> Result<Self> {
        if !(MIN_ZSTD_LEVEL..=MAX_ZSTD_LEVEL).contains(&level) {
            return Err(WarcError::InvalidCompressionLevel(level));
        }
        Ok(ZstdCompressor {
            level,
            dictionary: None,
        })
    }

    /// zstd compressor using `dictionary` for every record.
    ///
    /// The dictionary is prepared once here. It is not embedded in the output,
    /// readers need the same dictionary to decode the records.
    pub fn with_dictionary(level: i32, dictionary: Vec<u8>) -> Result<Self> {
        let mut compressor = Self::new(level)?;
        if dictionary.is_empty() {
            return Err(WarcError::InvalidDictionary("dictionary is empty".to_string()));
        }
        debug!("Preparing {} byte zstd dictionary at level {}", dictionary.len(), level);
        let encoder = EncoderDictionary::copy(&dictionary, level);
        let decoder = DecoderDictionary::copy(&dictionary);
        compressor.dictionary = Some(Arc::new(ZstdDictionary {
            raw: dictionary,
            encoder,
            decoder,
        }));
        Ok(compressor)
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn dictionary(&self) -> Option<&ZstdDictionary> {
        self.dictionary.as_deref()
    }

    /// Compress `data` into one complete frame with content checksum.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let out = Vec::with_capacity(data.len() / 4 + 64);
        let mut encoder = match &self.dictionary {
            Some(dict) => zstd::stream::write::Encoder::with_prepared_dictionary(out, &dict.encoder)?,
            None => zstd::stream::write::Encoder::new(out, self.level)?,
        };
        encoder.include_checksum(true)?;
        encoder.include_contentsize(true)?;
        encoder.set_pledged_src_size(Some(data.len() as u64))?;
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    /// Decompress one frame or a concatenation of frames.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match &self.dictionary {
            Some(dict) => {
                let mut decoder = zstd::stream::read::Decoder::with_prepared_dictionary(data, &dict.decoder)?;
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
            None => Ok(zstd::stream::decode_all(data)?),
        }
    }
}
