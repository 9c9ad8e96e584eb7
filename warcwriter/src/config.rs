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

//! Deserializable writer configuration.
//!
//! Reading the configuration document is left to the caller; any serde format
//! works, e.g. JSON:
//!
//! ```json
//! {
//!   "template": "/data/crawl-$date-$number",
//!   "rotate_mb": 1024,
//!   "compression": { "kind": "zstd", "level": 19, "dictionary": "/data/warc.dict" },
//!   "warcinfo_fields": { "operator": "Jane Doe" },
//!   "software": "my-crawler/0.3"
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::compression::{Compressor, ZstdCompressor, DEFAULT_ZSTD_LEVEL};
use crate::error::{Result, WarcError};
use crate::record::WarcVersion;
use crate::rotation::RotationPolicy;
use crate::writer::{WarcWriter, WriterOptions};

#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Output path template without the `.warc` extension.
    pub template: String,

    /// Rotation threshold in MiB, `0` disables (default: 15360 = 15 GiB)
    #[serde(default = "default_rotate_mb")]
    pub rotate_mb: u64,

    /// Maximum number of records per file, `0` disables
    #[serde(default)]
    pub max_records: u64,

    #[serde(default)]
    pub compression: CompressionConfig,

    /// Operator fields of warcinfo records, written in key order
    #[serde(default)]
    pub warcinfo_fields: BTreeMap<String, String>,

    #[serde(default)]
    pub software: String,

    /// Deduplicate identical response payloads into revisit records
    #[serde(default)]
    pub revisit: bool,

    #[serde(default)]
    pub warc_version: WarcVersion,
}

fn default_rotate_mb() -> u64 {
    15 * 1024
}

fn default_zstd_level() -> i32 {
    DEFAULT_ZSTD_LEVEL
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompressionConfig {
    #[default]
    None,
    Zstd {
        #[serde(default = "default_zstd_level")]
        level: i32,
        /// Path of a raw zstd dictionary file
        #[serde(default)]
        dictionary: Option<PathBuf>,
    },
}

impl CompressionConfig {
    /// Build the compressor, loading the dictionary file if one is configured.
    pub fn compressor(&self) -> Result<Compressor> {
        match self {
            CompressionConfig::None => Ok(Compressor::None),
            CompressionConfig::Zstd { level, dictionary: None } => Ok(Compressor::Zstd(ZstdCompressor::new(*level)?)),
            CompressionConfig::Zstd {
                level,
                dictionary: Some(path),
            } => {
                let bytes = std::fs::read(path).map_err(|e| {
                    WarcError::InvalidDictionary(format!("cannot read {}: {}", path.display(), e))
                })?;
                debug!("Loaded zstd dictionary {} ({} bytes)", path.display(), bytes.len());
                Ok(Compressor::Zstd(ZstdCompressor::with_dictionary(*level, bytes)?))
            }
        }
    }
}

impl WriterConfig {
    pub fn new(template: impl Into<String>) -> Self {
        WriterConfig {
            template: template.into(),
            rotate_mb: default_rotate_mb(),
            max_records: 0,
            compression: CompressionConfig::default(),
            warcinfo_fields: BTreeMap::new(),
            software: String::new(),
            revisit: false,
            warc_version: WarcVersion::default(),
        }
    }

    pub fn compressor(&self) -> Result<Compressor> {
        self.compression.compressor()
    }

    pub fn rotation(&self) -> RotationPolicy {
        RotationPolicy::by_megabytes(self.rotate_mb).with_max_records(self.max_records)
    }

    pub fn options(&self) -> Result<WriterOptions> {
        Ok(WriterOptions {
            compressor: self.compressor()?,
            rotation: self.rotation(),
            warcinfo_fields: self
                .warcinfo_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            software: self.software.clone(),
            version: self.warc_version,
            revisit: self.revisit,
        })
    }

    /// Open a writer session with this configuration.
    pub fn open(&self) -> Result<WarcWriter> {
        WarcWriter::open_with(&self.template, self.options()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config: WriterConfig = serde_json::from_str(r#"{"template": "out-$number"}"#).unwrap();
        assert_eq!(config.rotate_mb, 15360);
        assert_eq!(config.max_records, 0);
        assert_eq!(config.compression, CompressionConfig::None);
        assert_eq!(config.warc_version, WarcVersion::V1_0);
        assert!(!config.revisit);
        assert_eq!(config.rotation(), RotationPolicy::by_megabytes(15360));
    }

    #[test]
    fn test_full_document() {
        let config: WriterConfig = serde_json::from_str(
            r#"{
                "template": "crawl-$date",
                "rotate_mb": 0,
                "max_records": 1000,
                "compression": {"kind": "zstd", "level": 19},
                "warcinfo_fields": {"operator": "Jane", "description": "test crawl"},
                "software": "crawler/1.0",
                "revisit": true,
                "warc_version": "1.1"
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.compression,
            CompressionConfig::Zstd {
                level: 19,
                dictionary: None
            }
        );
        assert_eq!(config.warc_version, WarcVersion::V1_1);
        assert_eq!(config.rotation(), RotationPolicy::never().with_max_records(1000));

        let options = config.options().unwrap();
        assert!(options.revisit);
        assert_eq!(options.compressor.name(), "zstd");
        let keys: Vec<&str> = options.warcinfo_fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["description", "operator"]);
    }

    #[test]
    fn test_zstd_default_level() {
        let config: CompressionConfig = serde_json::from_str(r#"{"kind": "zstd"}"#).unwrap();
        match config.compressor().unwrap() {
            Compressor::Zstd(zstd) => assert_eq!(zstd.level(), DEFAULT_ZSTD_LEVEL),
            other => panic!("unexpected compressor {:?}", other),
        }
    }

    #[test]
    fn test_invalid_level_and_missing_dictionary() {
        let config: CompressionConfig = serde_json::from_str(r#"{"kind": "zstd", "level": 40}"#).unwrap();
        assert!(matches!(config.compressor(), Err(WarcError::InvalidCompressionLevel(40))));

        let config = CompressionConfig::Zstd {
            level: 3,
            dictionary: Some(PathBuf::from("/nonexistent/warc.dict")),
        };
        assert!(matches!(config.compressor(), Err(WarcError::InvalidDictionary(_))));
    }

    #[test]
    fn test_unknown_compression_rejected() {
        assert!(serde_json::from_str::<CompressionConfig>(r#"{"kind": "gzip"}"#).is_err());
    }

    #[test]
    fn test_open_from_config() {
        let dir = TempDir::new().unwrap();
        let dict_path = dir.path().join("warc.dict");
        std::fs::write(&dict_path, b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n".repeat(4)).unwrap();

        let mut config = WriterConfig::new(dir.path().join("cfg-$number").to_str().unwrap());
        config.compression = CompressionConfig::Zstd {
            level: 5,
            dictionary: Some(dict_path),
        };
        let writer = config.open().unwrap();
        assert_eq!(writer.current_path(), Some(dir.path().join("cfg-00000.warc.zst")));
        writer.close().unwrap();
    }
}
