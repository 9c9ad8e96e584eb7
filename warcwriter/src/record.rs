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

use std::fmt;
use std::io;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::digest::Digest;
use crate::headers::{HeaderEncoding, HeaderMap};

pub const WARC_TYPE: &str = "WARC-Type";
pub const WARC_RECORD_ID: &str = "WARC-Record-ID";
pub const WARC_DATE: &str = "WARC-Date";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const WARC_CONCURRENT_TO: &str = "WARC-Concurrent-To";
pub const WARC_BLOCK_DIGEST: &str = "WARC-Block-Digest";
pub const WARC_PAYLOAD_DIGEST: &str = "WARC-Payload-Digest";
pub const WARC_IP_ADDRESS: &str = "WARC-IP-Address";
pub const WARC_REFERS_TO: &str = "WARC-Refers-To";
pub const WARC_REFERS_TO_TARGET_URI: &str = "WARC-Refers-To-Target-URI";
pub const WARC_REFERS_TO_DATE: &str = "WARC-Refers-To-Date";
pub const WARC_TARGET_URI: &str = "WARC-Target-URI";
pub const WARC_WARCINFO_ID: &str = "WARC-Warcinfo-ID";
pub const WARC_FILENAME: &str = "WARC-Filename";
pub const WARC_PROFILE: &str = "WARC-Profile";
pub const WARC_PROTOCOL: &str = "WARC-Protocol";
pub const WARC_CIPHER_SUITE: &str = "WARC-Cipher-Suite";

pub const CONTENT_HTTP_REQUEST: &str = "application/http;msgtype=request";
pub const CONTENT_HTTP_RESPONSE: &str = "application/http;msgtype=response";
pub const CONTENT_WARC_FIELDS: &str = "application/warc-fields";

/// WARC record type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarcRecordType {
    WarcInfo,
    Response,
    Resource,
    Request,
    Metadata,
    Revisit,
    Conversion,
    Continuation,
}

impl WarcRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarcRecordType::WarcInfo => "warcinfo",
            WarcRecordType::Response => "response",
            WarcRecordType::Resource => "resource",
            WarcRecordType::Request => "request",
            WarcRecordType::Metadata => "metadata",
            WarcRecordType::Revisit => "revisit",
            WarcRecordType::Conversion => "conversion",
            WarcRecordType::Continuation => "continuation",
        }
    }
}

impl TryFrom<&str> for WarcRecordType {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "warcinfo" => Ok(WarcRecordType::WarcInfo),
            "response" => Ok(WarcRecordType::Response),
            "resource" => Ok(WarcRecordType::Resource),
            "request" => Ok(WarcRecordType::Request),
            "metadata" => Ok(WarcRecordType::Metadata),
            "revisit" => Ok(WarcRecordType::Revisit),
            "conversion" => Ok(WarcRecordType::Conversion),
            "continuation" => Ok(WarcRecordType::Continuation),
            _ => Err("Invalid WARC record type."),
        }
    }
}

impl From<WarcRecordType> for &'static str {
    fn from(value: WarcRecordType) -> Self {
        value.as_str()
    }
}

impl fmt::Display for WarcRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WARC format version written in each record's version line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum WarcVersion {
    #[default]
    #[serde(rename = "1.0")]
    V1_0,
    #[serde(rename = "1.1")]
    V1_1,
}

impl WarcVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarcVersion::V1_0 => "WARC/1.0",
            WarcVersion::V1_1 => "WARC/1.1",
        }
    }

    /// Value of the `format` field in warcinfo records.
    pub fn format_name(&self) -> &'static str {
        match self {
            WarcVersion::V1_0 => "WARC File Format 1.0",
            WarcVersion::V1_1 => "WARC File Format 1.1",
        }
    }

    /// Value of the `conformsTo` field in warcinfo records.
    pub fn conforms_to(&self) -> &'static str {
        match self {
            WarcVersion::V1_0 => "http://bibnum.bnf.fr/WARC/WARC_ISO_28500_version1_latestdraft.pdf",
            WarcVersion::V1_1 => "https://bibnum.bnf.fr/WARC/WARC_ISO_28500_version1-1_latestdraft.pdf",
        }
    }

    /// `WARC-Profile` of identical-payload-digest revisit records.
    pub fn revisit_profile(&self) -> &'static str {
        match self {
            WarcVersion::V1_0 => "http://netpreserve.org/warc/1.0/revisit/identical-payload-digest",
            WarcVersion::V1_1 => "http://netpreserve.org/warc/1.1/revisit/identical-payload-digest",
        }
    }
}

/// Format a timestamp the way `WARC-Date` expects it.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Generate a fresh `WARC-Record-ID` value (including angle brackets).
pub fn new_record_id() -> String {
    format!("<urn:uuid:{}>", Uuid::new_v4())
}

/// Header fields of a record that has no payload yet.
///
/// The mandatory fields (`WARC-Type`, `WARC-Date`, `WARC-Record-ID`) are
/// generated up front so that other records can reference the ID before the
/// payload is known. [`RecordDraft::finish`] adds the digest and length and
/// freezes the record.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    version: WarcVersion,
    record_type: WarcRecordType,
    record_id: String,
    date: DateTime<Utc>,
    fields: Vec<(String, String)>,
    content_type: Option<String>,
}

impl RecordDraft {
    pub fn new(version: WarcVersion, record_type: WarcRecordType, date: DateTime<Utc>) -> Self {
        RecordDraft {
            version,
            record_type,
            record_id: new_record_id(),
            date,
            fields: Vec::new(),
            content_type: None,
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Append a WARC field. Fields are written in the order they were added.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Attach the payload and freeze the record.
    ///
    /// `block_digest` may be passed when it has already been computed over
    /// exactly `payload`; otherwise it is computed here.
    pub fn finish(self, payload: Vec<u8>, block_digest: Option<Digest>) -> WarcRecord {
        let block_digest = block_digest.unwrap_or_else(|| Digest::sha1(&payload));

        let mut headers = HeaderMap::new(HeaderEncoding::Unicode);
        headers.set_status_line(self.version.as_str());
        headers.append(WARC_TYPE, self.record_type.as_str());
        headers.append(WARC_DATE, format_date(&self.date));
        headers.append(WARC_RECORD_ID, &self.record_id);
        for (name, value) in &self.fields {
            headers.append(name, value);
        }
        if let Some(content_type) = &self.content_type {
            headers.append(CONTENT_TYPE, content_type);
        }
        headers.append(WARC_BLOCK_DIGEST, block_digest.to_string());
        headers.append(CONTENT_LENGTH, payload.len().to_string());

        WarcRecord {
            record_type: self.record_type,
            record_id: self.record_id,
            date: self.date,
            headers,
            block_digest,
            payload,
        }
    }
}

/// A finished, immutable WARC record.
#[derive(Debug, Clone)]
pub struct WarcRecord {
    record_type: WarcRecordType,
    record_id: String,
    date: DateTime<Utc>,
    headers: HeaderMap,
    block_digest: Digest,
    payload: Vec<u8>,
}

impl WarcRecord {
    /// Record type (same as `headers['WARC-Type']`).
    pub fn record_type(&self) -> WarcRecordType {
        self.record_type
    }

    /// Record ID including angle brackets (same as `headers['WARC-Record-ID']`).
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// WARC record headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn block_digest(&self) -> &Digest {
        &self.block_digest
    }

    /// Value of `Content-Length`, always the exact payload length.
    pub fn content_length(&self) -> usize {
        self.payload.len()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Write the serialized record (header block, payload and the trailing
    /// record separator) into a stream.
    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bytes_written = self.headers.write(writer)?;
        writer.write_all(b"\r\n")?;
        writer.write_all(&self.payload)?;
        writer.write_all(b"\r\n\r\n")?;
        bytes_written += 2 + self.payload.len() + 4;
        Ok(bytes_written)
    }

    /// Serialized record as bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 512);
        // Writing into a Vec cannot fail.
        let _ = self.write(&mut out);
        out
    }
}
