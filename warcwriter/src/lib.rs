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

//! Writing captured HTTP traffic to WARC files.
//!
//! Every request/response exchange is turned into a `request` and a
//! `response` record, compressed record by record (optionally as zstd frames
//! with a shared dictionary), and appended to a rotating set of WARC files.
//! The most recent exchange can be retracted again with
//! [`WarcWriter::discard`] or [`WarcWriter::discard_last`].
//!
//! ```no_run
//! use chrono::Utc;
//! use warcwriter::{Compressor, RotationPolicy, WarcWriter, ZstdCompressor};
//!
//! # fn main() -> warcwriter::Result<()> {
//! let writer = WarcWriter::open(
//!     "/data/crawl-$date-$number",
//!     Compressor::Zstd(ZstdCompressor::new(11)?),
//!     RotationPolicy::by_megabytes(1024),
//!     vec![("operator".to_string(), "Jane Doe".to_string())],
//!     "my-crawler/0.1",
//! )?;
//! writer.write_exchange(
//!     b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n",
//!     b"HTTP/1.1 204 No Content\r\n\r\n",
//!     Utc::now(),
//! )?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod capture;
pub mod compression;
pub mod config;
pub mod digest;
pub mod error;
pub mod headers;
pub mod http;
pub mod record;
pub mod rotation;
pub mod writer;

pub use builder::{CapturedExchange, RecordBuilder, TlsInfo};
pub use capture::{CaptureSession, ExchangeSink};
pub use compression::{Compressor, ZstdCompressor};
pub use config::{CompressionConfig, WriterConfig};
pub use digest::Digest;
pub use error::{Result, WarcError};
pub use headers::{HeaderEncoding, HeaderMap};
pub use record::{WarcRecord, WarcRecordType, WarcVersion};
pub use rotation::{PathTemplate, RotationPolicy};
pub use writer::{RecordHandle, RecordLocation, WarcWriter, WriterOptions, WriterStats};
