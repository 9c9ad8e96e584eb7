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

use std::io;

use encoding::all::WINDOWS_1252;
use encoding::{DecoderTrap, Encoding};

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum HeaderEncoding {
    Unicode,
    Latin1,
}

/// Ordered header block with an optional status line.
///
/// Used for WARC header blocks (which are written) and for captured HTTP
/// header blocks (which are only inspected). Keys are matched
/// case-insensitively, insertion order is preserved on output.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    encoding: HeaderEncoding,
    status_line: Vec<u8>,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
}

impl HeaderMap {
    /// Create a new header map with the specified encoding.
    ///
    /// # Arguments
    ///
    /// * `encoding` - Header source encoding
    pub fn new(encoding: HeaderEncoding) -> Self {
        HeaderMap {
            encoding,
            status_line: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Parse an HTTP-style header block.
    ///
    /// `block` is everything before the empty line terminating the header
    /// block. The first line is taken as the status line. Folded continuation
    /// lines are appended to the previous header, lines without a colon are
    /// preserved as continuations as well.
    pub fn parse(block: &[u8], encoding: HeaderEncoding) -> Self {
        let mut map = HeaderMap::new(encoding);
        let mut lines = block
            .split(|&b| b == b'\n')
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l));

        if let Some(first) = lines.next() {
            map.set_status_line(first.trim_ascii());
        }
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if line[0] == b' ' || line[0] == b'\t' {
                map.add_continuation(line.trim_ascii());
                continue;
            }
            match line.iter().position(|&b| b == b':') {
                Some(colon) => map.append_bytes(&line[..colon], &line[colon + 1..]),
                None => map.add_continuation(line.trim_ascii()),
            }
        }
        map
    }

    pub fn encoding(&self) -> HeaderEncoding {
        self.encoding
    }

    /// Get the header status line.
    pub fn status_line(&self) -> String {
        self.decode(&self.status_line)
    }

    /// Get the raw status line as bytes.
    pub fn status_line_bytes(&self) -> &[u8] {
        &self.status_line
    }

    /// Set status line contents.
    pub fn set_status_line(&mut self, status_line: impl AsRef<[u8]>) {
        self.status_line = status_line.as_ref().to_vec();
    }

    /// HTTP status code (unset if header block is not an HTTP response header block).
    pub fn status_code(&self) -> Option<u16> {
        if !self.status_line.starts_with(b"HTTP/") {
            return None;
        }
        let mut parts = self.status_line.splitn(3, |&b| b == b' ');
        // Skip HTTP/
        parts.next()?;
        String::from_utf8_lossy(parts.next()?).parse::<u16>().ok()
    }

    fn decode(&self, byte_str: &[u8]) -> String {
        match self.encoding {
            HeaderEncoding::Unicode => String::from_utf8_lossy(byte_str).to_string(),
            HeaderEncoding::Latin1 => WINDOWS_1252
                .decode(byte_str, DecoderTrap::Replace)
                .unwrap_or_else(|_| String::from_utf8_lossy(byte_str).to_string()),
        }
    }

    /// Get value for (case-insensitive) header key a string.
    /// Duplicate headers are returned as a single value joined with `","`.
    pub fn get(&self, key: &str) -> Option<String> {
        Some(self.decode(&self.get_bytes(key.as_bytes())?))
    }

    /// Get value for (case-insensitive) header key as bytes.
    /// Duplicate headers are returned as a single value joined with `","`.
    pub fn get_bytes(&self, key: &[u8]) -> Option<Vec<u8>> {
        let values: Vec<&[u8]> = self.get_all(key).collect();
        if !values.is_empty() {
            Some(values.as_slice().join(b",".as_slice()))
        } else {
            None
        }
    }

    /// All values of a (case-insensitive) header key, in order of appearance.
    pub fn get_all<'a>(&'a self, key: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_slice())
    }

    /// Check if a (case-insensitive) header key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        let key_bytes = key.as_bytes();
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(key_bytes))
    }

    /// Insert new header and overwrite existing header(s) if the key already exists.
    ///
    /// If a header already exists, its first occurrence will be updated and
    /// all following occurrences will be dropped.
    pub fn set(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.set_bytes(key.as_ref().as_bytes(), value.as_ref().as_bytes());
    }

    fn set_bytes(&mut self, key: &[u8], value: &[u8]) {
        let entry = (sanitize(key), sanitize(value));
        let mut found = false;
        self.headers.retain_mut(|h| {
            if !h.0.eq_ignore_ascii_case(key.trim_ascii()) {
                true
            } else if !found {
                *h = entry.clone();
                found = true;
                true
            } else {
                false
            }
        });
        if !found {
            self.headers.push(entry);
        }
    }

    /// Append header without checking for existing headers with the same name.
    pub fn append(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.append_bytes(key.as_ref().as_bytes(), value.as_ref().as_bytes());
    }

    /// Append header as bytes.
    ///
    /// Line breaks inside keys or values are replaced with spaces so that a
    /// value can never terminate the header block early.
    pub fn append_bytes(&mut self, key: &[u8], value: &[u8]) {
        self.headers.push((sanitize(key), sanitize(value)));
    }

    /// Iterator of keys and values.
    pub fn items(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.headers
            .iter()
            .map(|(k, v)| (self.decode(k), self.decode(v)))
    }

    /// Get the number of headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if the header map is empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Write header block into stream. The terminating empty line is not written.
    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bytes_written = 0usize;
        if !self.status_line.is_empty() {
            writer.write_all(&self.status_line)?;
            writer.write_all(b"\r\n")?;
            bytes_written += self.status_line.len() + 2;
        }
        for (key, value) in &self.headers {
            if !key.is_empty() {
                writer.write_all(key)?;
                writer.write_all(b": ")?;
                bytes_written += key.len() + 2;
            }
            writer.write_all(value)?;
            writer.write_all(b"\r\n")?;
            bytes_written += value.len() + 2;
        }
        Ok(bytes_written)
    }

    fn add_continuation(&mut self, value: &[u8]) {
        if let Some(last) = self.headers.last_mut() {
            last.1.push(b' ');
            last.1.extend_from_slice(value);
        } else {
            self.headers.push((Vec::new(), value.to_vec()));
        }
    }
}

fn sanitize(bytes: &[u8]) -> Vec<u8> {
    bytes
        .trim_ascii()
        .iter()
        .map(|&b| if b == b'\r' || b == b'\n' { b' ' } else { b })
        .collect()
}
