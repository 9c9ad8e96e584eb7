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

//! File rotation and output file naming.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, WarcError};

const MIB: u64 = 1024 * 1024;
const SERIAL_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SERIAL_LEN: usize = 8;

/// Decides when the writer starts a new physical file.
///
/// Both limits are evaluated against the state the file would be in after the
/// next exchange. A limit of `0` is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotationPolicy {
    max_bytes: u64,
    max_records: u64,
}

impl RotationPolicy {
    /// Never rotate.
    pub fn never() -> Self {
        Self::default()
    }

    /// Rotate once a file would grow beyond `mb` MiB.
    pub fn by_megabytes(mb: u64) -> Self {
        RotationPolicy {
            max_bytes: mb.saturating_mul(MIB),
            max_records: 0,
        }
    }

    pub fn by_bytes(max_bytes: u64) -> Self {
        RotationPolicy {
            max_bytes,
            max_records: 0,
        }
    }

    /// Additionally rotate once a file would hold more than `max_records` records.
    pub fn with_max_records(mut self, max_records: u64) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn max_records(&self) -> u64 {
        self.max_records
    }

    /// Whether the file has to be rotated before writing the next exchange.
    ///
    /// `bytes_written` and `record_count` already include the next exchange.
    pub fn should_rotate(&self, bytes_written: u64, record_count: u64) -> bool {
        (self.max_bytes > 0 && bytes_written > self.max_bytes)
            || (self.max_records > 0 && record_count > self.max_records)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Date,
    Number,
    Serial,
}

/// Parsed output file name template.
///
/// Supported placeholders are `$date` (`YYYYmmddHHMMSS`, UTC), `$number`
/// (zero-padded file counter), and `$serial` (8 random `[a-z0-9]` characters).
/// Braced forms like `${number}` and the `$$` escape work as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        if template.is_empty() {
            return Err(WarcError::InvalidTemplate("template is empty".to_string()));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;
        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            let (name, consumed) = if let Some(stripped) = after.strip_prefix('$') {
                literal.push('$');
                rest = stripped;
                continue;
            } else if let Some(braced) = after.strip_prefix('{') {
                let end = braced.find('}').ok_or_else(|| {
                    WarcError::InvalidTemplate(format!("unterminated placeholder in {template:?}"))
                })?;
                (&braced[..end], end + 2)
            } else {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            };

            let segment = match name {
                "date" => Segment::Date,
                "number" => Segment::Number,
                "serial" => Segment::Serial,
                "" => {
                    return Err(WarcError::InvalidTemplate(format!(
                        "dangling '$' in {template:?}"
                    )))
                }
                other => {
                    return Err(WarcError::InvalidTemplate(format!(
                        "unknown placeholder ${other} in {template:?}"
                    )))
                }
            };
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
            rest = &after[consumed..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(PathTemplate {
            source: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether consecutive files get distinct names without relying on the clock.
    pub fn is_unique_per_file(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Number | Segment::Serial))
    }

    pub fn resolve(&self, date: &DateTime<Utc>, number: u64, serial: &str) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Date => out.push_str(&date.format("%Y%m%d%H%M%S").to_string()),
                Segment::Number => out.push_str(&format!("{number:05}")),
                Segment::Serial => out.push_str(serial),
            }
        }
        out
    }
}

/// Random 8 character `[a-z0-9]` token for `$serial`.
pub fn new_serial() -> String {
    let base = SERIAL_ALPHABET.len() as u128;
    let mut value = Uuid::new_v4().as_u128();
    (0..SERIAL_LEN)
        .map(|_| {
            let c = SERIAL_ALPHABET[(value % base) as usize] as char;
            value /= base;
            c
        })
        .collect()
}
