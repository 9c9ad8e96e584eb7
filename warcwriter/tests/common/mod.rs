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

#![allow(dead_code)]

use std::path::Path;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use warcwriter::Compressor;

/// A WARC record read back from disk.
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl ParsedRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn record_type(&self) -> &str {
        self.header("WARC-Type").unwrap_or("")
    }

    pub fn record_id(&self) -> &str {
        self.header("WARC-Record-ID").unwrap_or("")
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse a sequence of uncompressed WARC records, panicking on any framing error.
pub fn parse_records(mut data: &[u8]) -> Vec<ParsedRecord> {
    let mut records = Vec::new();
    while !data.is_empty() {
        let head_end = find(data, b"\r\n\r\n").expect("unterminated WARC header block");
        let head = std::str::from_utf8(&data[..head_end]).expect("WARC headers are not UTF-8");
        let mut lines = head.split("\r\n");
        let version = lines.next().unwrap_or_default().to_string();
        assert!(version.starts_with("WARC/"), "bad version line {version:?}");

        let headers: Vec<(String, String)> = lines
            .map(|line| {
                let (k, v) = line.split_once(':').expect("header line without colon");
                (k.trim().to_string(), v.trim().to_string())
            })
            .collect();
        let length: usize = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .expect("missing Content-Length")
            .1
            .parse()
            .expect("invalid Content-Length");

        let payload_start = head_end + 4;
        let payload_end = payload_start + length;
        assert!(data.len() >= payload_end + 4, "record payload is truncated");
        assert_eq!(&data[payload_end..payload_end + 4], b"\r\n\r\n", "missing record terminator");
        records.push(ParsedRecord {
            version,
            headers,
            payload: data[payload_start..payload_end].to_vec(),
        });
        data = &data[payload_end + 4..];
    }
    records
}

/// Read and decode a whole WARC file.
pub fn read_warc(path: &Path, compressor: &Compressor) -> Vec<ParsedRecord> {
    let raw = std::fs::read(path).expect("cannot read WARC file");
    let decoded = compressor.decode(&raw).expect("cannot decode WARC file");
    parse_records(&decoded)
}

pub fn template(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_str().expect("temp path is not UTF-8").to_string()
}

/// A GET request and a matching `200 OK` response with a `body_len` byte body.
pub fn exchange(path: &str, body_len: usize) -> (Vec<u8>, Vec<u8>) {
    let request = format!("GET {path} HTTP/1.1\r\nHost: example.com\r\nUser-Agent: warcwriter-tests\r\n\r\n");
    let body: String = (0..body_len).map(|i| (b'a' + (i % 26) as u8) as char).collect();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    (request.into_bytes(), response.into_bytes())
}
