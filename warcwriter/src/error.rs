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

//! Error types for WARC writing.
//!
//! Every fallible operation in this crate returns [`Result<T>`], aliased to
//! `Result<T, WarcError>`, so errors propagate with `?`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarcError {
    /// The output file could not be created (missing directory, permissions,
    /// or the path already exists).
    #[error("cannot create WARC file {}: {source}", path.display())]
    CannotCreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The captured exchange is truncated or malformed.
    #[error("captured exchange is incomplete: {0}")]
    CaptureIncomplete(String),

    #[error("invalid zstd compression level {0} (expected 1..=22)")]
    InvalidCompressionLevel(i32),

    #[error("invalid compression dictionary: {0}")]
    InvalidDictionary(String),

    #[error("invalid file name template: {0}")]
    InvalidTemplate(String),

    /// The handle no longer describes a live exchange of the current file.
    #[error("record handle is stale")]
    StaleHandle,

    /// The exchange is live but other exchanges were appended after it.
    #[error("exchange is not at the tail of the file")]
    NotTail,

    #[error("WARC writer is closed")]
    WriterClosed,

    #[error("I/O failure: {0}")]
    IoFailure(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, WarcError>;

impl WarcError {
    pub(crate) fn incomplete(msg: impl Into<String>) -> Self {
        WarcError::CaptureIncomplete(msg.into())
    }
}
