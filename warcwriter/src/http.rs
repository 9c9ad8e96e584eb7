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

//! Inspection of captured HTTP/1.x messages.
//!
//! The writer stores captured bytes verbatim. This module only looks at them
//! to find out whether a message is complete, to compute the payload digest of
//! the entity body and to extract the few fields that end up in WARC headers
//! (protocol version, target URI, status code).
//!
//! Truncated or malformed messages are rejected with
//! [`WarcError::CaptureIncomplete`](crate::WarcError::CaptureIncomplete).

use crate::digest::{Digest, DigestBuilder};
use crate::error::{Result, WarcError};
use crate::headers::{HeaderEncoding, HeaderMap};

/// First line of an HTTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: String, target: String },
    Response { status: u16 },
}

/// A parsed view of one captured HTTP message.
#[derive(Debug, Clone)]
pub struct HttpMessage {
    start: StartLine,
    version: String,
    headers: HeaderMap,
    head_len: usize,
    payload_len: usize,
    payload_digest: Digest,
}

impl HttpMessage {
    /// Parse a captured request.
    pub fn parse_request(bytes: &[u8]) -> Result<Self> {
        let (headers, head_len) = split_head(bytes, 0)?;
        let line = headers.status_line();
        let mut parts = line.split(' ').filter(|p| !p.is_empty());
        let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v)) if v.starts_with("HTTP/") => (m, t, v),
            _ => return Err(WarcError::incomplete(format!("invalid request line {:?}", line))),
        };
        let start = StartLine::Request {
            method: method.to_string(),
            target: target.to_string(),
        };
        let version = version.to_string();

        let body = &bytes[head_len..];
        let (payload_len, payload_digest) = match body_framing(&headers, true)? {
            Framing::Chunked => dechunk(body)?,
            Framing::Length(len) => fixed_length(body, len)?,
            Framing::UntilClose | Framing::Empty => fixed_length(body, 0)?,
        };

        Ok(HttpMessage {
            start,
            version,
            headers,
            head_len,
            payload_len,
            payload_digest,
        })
    }

    /// Parse a captured response.
    ///
    /// `request_method` decides whether a body is expected at all (responses
    /// to `HEAD` never carry one). Interim `1xx` responses preceding the final
    /// response are kept in the head.
    pub fn parse_response(bytes: &[u8], request_method: Option<&str>) -> Result<Self> {
        let mut offset = 0;
        loop {
            let (headers, head_len) = split_head(bytes, offset)?;
            let status = headers.status_code().ok_or_else(|| {
                WarcError::incomplete(format!("invalid status line {:?}", headers.status_line()))
            })?;
            if (100..200).contains(&status) && status != 101 {
                offset = head_len;
                continue;
            }

            let version = headers
                .status_line()
                .split(' ')
                .next()
                .unwrap_or_default()
                .to_string();

            let no_body = request_method.is_some_and(|m| m.eq_ignore_ascii_case("HEAD"))
                || status == 204
                || status == 304;
            let framing = if no_body {
                Framing::Empty
            } else if status == 101 {
                Framing::UntilClose
            } else {
                body_framing(&headers, false)?
            };

            let body = &bytes[head_len..];
            let (payload_len, payload_digest) = match framing {
                Framing::Chunked => dechunk(body)?,
                Framing::Length(len) => fixed_length(body, len)?,
                Framing::Empty => fixed_length(body, 0)?,
                Framing::UntilClose => (body.len(), Digest::sha1(body)),
            };

            return Ok(HttpMessage {
                start: StartLine::Response { status },
                version,
                headers,
                head_len,
                payload_len,
                payload_digest,
            });
        }
    }

    pub fn start_line(&self) -> &StartLine {
        &self.start
    }

    pub fn method(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.start {
            StartLine::Response { status } => Some(status),
            StartLine::Request { .. } => None,
        }
    }

    /// Protocol version as written in the start line, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Protocol version in the lower-case form used by `WARC-Protocol`.
    pub fn protocol(&self) -> String {
        self.version.to_ascii_lowercase()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Length of the head (start line, headers and terminating empty line).
    pub fn head_len(&self) -> usize {
        self.head_len
    }

    /// Length of the entity body after removing any chunked framing.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub fn payload_digest(&self) -> &Digest {
        &self.payload_digest
    }

    /// Absolute URI of a request, reconstructed from the request target and
    /// the `Host` header if the target is not absolute already.
    pub fn target_uri(&self, secure: bool) -> Option<String> {
        let target = match &self.start {
            StartLine::Request { target, .. } => target,
            StartLine::Response { .. } => return None,
        };
        let lower = target.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(target.clone());
        }

        let host = self.headers.get("host")?;
        let host = host.trim();
        if host.is_empty() {
            return None;
        }
        let scheme = if secure { "https" } else { "http" };
        if target.starts_with('/') {
            Some(format!("{}://{}{}", scheme, host, target))
        } else {
            Some(format!("{}://{}/", scheme, host))
        }
    }
}

enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

fn split_head(bytes: &[u8], offset: usize) -> Result<(HeaderMap, usize)> {
    let rest = &bytes[offset..];
    if rest.is_empty() {
        return Err(WarcError::incomplete("message is empty"));
    }
    let (block_end, head_end) =
        find_head_end(rest).ok_or_else(|| WarcError::incomplete("header block is not terminated"))?;
    let headers = HeaderMap::parse(&rest[..block_end], HeaderEncoding::Latin1);
    Ok((headers, offset + head_end))
}

/// Locate the empty line ending a head. Lines may end in CRLF or a bare LF.
///
/// Returns the start of the empty line and the offset just past it.
fn find_head_end(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let line = &bytes[line_start..i];
        if line_start > 0 && (line.is_empty() || line == b"\r") {
            return Some((line_start, i + 1));
        }
        line_start = i + 1;
    }
    None
}

/// Next line starting at `pos`: the end of its content (line break excluded)
/// and the offset of the following line.
fn next_line(bytes: &[u8], pos: usize) -> Option<(usize, usize)> {
    let nl = pos + bytes[pos..].iter().position(|&b| b == b'\n')?;
    let end = if nl > pos && bytes[nl - 1] == b'\r' { nl - 1 } else { nl };
    Some((end, nl + 1))
}

fn body_framing(headers: &HeaderMap, is_request: bool) -> Result<Framing> {
    if let Some(te) = headers.get("transfer-encoding") {
        let last = te.rsplit(',').next().unwrap_or_default().trim();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(Framing::Chunked);
        }
        if is_request {
            return Err(WarcError::incomplete(format!(
                "request transfer coding {:?} does not end in chunked",
                te
            )));
        }
        return Ok(Framing::UntilClose);
    }

    let mut length: Option<usize> = None;
    for value in headers.get_all(b"content-length") {
        for item in value.split(|&b| b == b',') {
            let parsed = std::str::from_utf8(item.trim_ascii())
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| {
                    WarcError::incomplete(format!(
                        "invalid Content-Length {:?}",
                        String::from_utf8_lossy(item)
                    ))
                })?;
            match length {
                Some(l) if l != parsed => {
                    return Err(WarcError::incomplete("conflicting Content-Length values"));
                }
                _ => length = Some(parsed),
            }
        }
    }

    Ok(match length {
        Some(len) => Framing::Length(len),
        None if is_request => Framing::Empty,
        None => Framing::UntilClose,
    })
}

fn fixed_length(body: &[u8], expected: usize) -> Result<(usize, Digest)> {
    if body.len() < expected {
        return Err(WarcError::incomplete(format!(
            "body truncated: expected {} bytes, got {}",
            expected,
            body.len()
        )));
    }
    if body.len() > expected {
        return Err(WarcError::incomplete(format!(
            "{} unexpected bytes after message body",
            body.len() - expected
        )));
    }
    Ok((body.len(), Digest::sha1(body)))
}

fn dechunk(body: &[u8]) -> Result<(usize, Digest)> {
    let mut digest = DigestBuilder::new();
    let mut payload_len = 0usize;
    let mut pos = 0usize;

    loop {
        let (eol, next) =
            next_line(body, pos).ok_or_else(|| WarcError::incomplete("chunk size line is not terminated"))?;
        let size_line = String::from_utf8_lossy(&body[pos..eol]);
        let size_str = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| WarcError::incomplete(format!("invalid chunk size {:?}", size_str)))?;
        pos = next;

        if size == 0 {
            // Trailer section, terminated by an empty line.
            loop {
                let (eol, next) = next_line(body, pos)
                    .ok_or_else(|| WarcError::incomplete("trailer section is not terminated"))?;
                let empty = eol == pos;
                pos = next;
                if empty {
                    break;
                }
            }
            break;
        }

        let data_end = pos
            .checked_add(size)
            .filter(|&end| end < body.len())
            .ok_or_else(|| WarcError::incomplete("chunk data truncated"))?;
        digest.update(&body[pos..data_end]);
        payload_len += size;
        pos = if body[data_end..].starts_with(b"\r\n") {
            data_end + 2
        } else if body[data_end] == b'\n' {
            data_end + 1
        } else {
            return Err(WarcError::incomplete("chunk data is not followed by a line break"));
        };
    }

    if pos != body.len() {
        return Err(WarcError::incomplete(format!(
            "{} unexpected bytes after chunked body",
            body.len() - pos
        )));
    }
    Ok((payload_len, digest.finish()))
}
