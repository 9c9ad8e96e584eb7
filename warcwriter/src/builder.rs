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

//! Assembly of WARC records from captured HTTP exchanges.
//!
//! Building happens in two steps. [`RecordBuilder::prepare`] parses both
//! messages and computes every digest; it is the expensive part and runs
//! without holding the writer lock. [`RecordBuilder::build`] then only has to
//! attach the per-file information (warcinfo ID, revisit target) and is run
//! inside the writer's critical section.

use std::net::IpAddr;

use chrono::{DateTime, Utc};

use crate::digest::Digest;
use crate::error::{Result, WarcError};
use crate::http::HttpMessage;
use crate::record::*;

/// Smallest payload for which a revisit record is worth writing.
pub const MIN_REVISIT_BYTES: usize = 128;

/// Negotiated TLS parameters of a captured connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    protocol: String,
    cipher_suite: String,
}

impl TlsInfo {
    /// `protocol` like `tls/1.3`, `cipher_suite` like `TLS_AES_128_GCM_SHA256`.
    pub fn new(protocol: impl Into<String>, cipher_suite: impl Into<String>) -> Self {
        TlsInfo {
            protocol: protocol.into(),
            cipher_suite: cipher_suite.into(),
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn cipher_suite(&self) -> &str {
        &self.cipher_suite
    }
}

/// Raw bytes of one HTTP exchange as seen on the wire.
#[derive(Debug, Clone)]
pub struct CapturedExchange {
    request: Vec<u8>,
    response: Vec<u8>,
    timestamp: DateTime<Utc>,
    peer: Option<IpAddr>,
    tls: Option<TlsInfo>,
    metadata: Vec<(String, String)>,
}

impl CapturedExchange {
    pub fn new(request: impl Into<Vec<u8>>, response: impl Into<Vec<u8>>, timestamp: DateTime<Utc>) -> Self {
        CapturedExchange {
            request: request.into(),
            response: response.into(),
            timestamp,
            peer: None,
            tls: None,
            metadata: Vec::new(),
        }
    }

    pub fn with_peer(mut self, peer: IpAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_tls(mut self, tls: TlsInfo) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Add a field to the exchange's metadata record.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn request(&self) -> &[u8] {
        &self.request
    }

    pub fn response(&self) -> &[u8] {
        &self.response
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn peer(&self) -> Option<IpAddr> {
        self.peer
    }

    pub fn tls(&self) -> Option<&TlsInfo> {
        self.tls.as_ref()
    }

    pub fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }
}

/// A validated exchange with all digests computed.
#[derive(Debug)]
pub struct PreparedExchange {
    exchange: CapturedExchange,
    request: HttpMessage,
    response: HttpMessage,
    request_digest: Digest,
    response_digest: Digest,
    target_uri: Option<String>,
}

impl PreparedExchange {
    pub fn exchange(&self) -> &CapturedExchange {
        &self.exchange
    }

    pub fn request(&self) -> &HttpMessage {
        &self.request
    }

    pub fn response(&self) -> &HttpMessage {
        &self.response
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.target_uri.as_deref()
    }

    /// Entity body digest of the response.
    pub fn payload_digest(&self) -> &Digest {
        self.response.payload_digest()
    }

    /// Whether the response payload is large enough to be deduplicated.
    pub fn revisit_eligible(&self) -> bool {
        self.response.payload_len() >= MIN_REVISIT_BYTES
    }

    /// Uncompressed size of the records built from this exchange, without
    /// WARC headers.
    pub fn raw_len(&self) -> usize {
        self.exchange.request.len() + self.exchange.response.len()
    }
}

/// Earlier response with an identical payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisitTarget {
    pub record_id: String,
    pub date: DateTime<Utc>,
    pub target_uri: Option<String>,
}

/// Records of one exchange in the order they are written.
#[derive(Debug)]
pub struct ExchangeRecords {
    pub request: WarcRecord,
    pub response: WarcRecord,
    pub metadata: Option<WarcRecord>,
}

impl ExchangeRecords {
    pub fn iter(&self) -> impl Iterator<Item = &WarcRecord> {
        [&self.request, &self.response]
            .into_iter()
            .chain(self.metadata.as_ref())
    }

    pub fn len(&self) -> usize {
        2 + usize::from(self.metadata.is_some())
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Builds warcinfo and exchange records for one writer session.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    version: WarcVersion,
    software: String,
    warcinfo_fields: Vec<(String, String)>,
}

impl RecordBuilder {
    pub fn new(version: WarcVersion, software: &str, warcinfo_fields: Vec<(String, String)>) -> Self {
        let software = match software.trim() {
            "" => format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            s => format!("{}/{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), s),
        };
        RecordBuilder {
            version,
            software,
            warcinfo_fields,
        }
    }

    pub fn version(&self) -> WarcVersion {
        self.version
    }

    /// Full software identification written to warcinfo records.
    pub fn software(&self) -> &str {
        &self.software
    }

    /// warcinfo record for a newly created file named `filename`.
    pub fn warcinfo(&self, filename: &str) -> WarcRecord {
        const RESERVED: [&str; 3] = ["software", "format", "conformsTo"];

        let mut body = String::new();
        for (key, value) in &self.warcinfo_fields {
            if RESERVED.iter().any(|r| r.eq_ignore_ascii_case(key)) {
                continue;
            }
            push_field(&mut body, key, value);
        }
        push_field(&mut body, "software", &self.software);
        push_field(&mut body, "format", self.version.format_name());
        push_field(&mut body, "conformsTo", self.version.conforms_to());

        RecordDraft::new(self.version, WarcRecordType::WarcInfo, Utc::now())
            .field(WARC_FILENAME, filename)
            .content_type(CONTENT_WARC_FIELDS)
            .finish(body.into_bytes(), None)
    }

    /// Validate an exchange and compute its digests.
    pub fn prepare(&self, exchange: CapturedExchange) -> Result<PreparedExchange> {
        if exchange.request.is_empty() {
            return Err(WarcError::incomplete("request is empty"));
        }
        if exchange.response.is_empty() {
            return Err(WarcError::incomplete("response is empty"));
        }

        let request = HttpMessage::parse_request(&exchange.request)?;
        let response = HttpMessage::parse_response(&exchange.response, request.method())?;
        let target_uri = request.target_uri(exchange.tls.is_some());
        let request_digest = Digest::sha1(&exchange.request);
        let response_digest = Digest::sha1(&exchange.response);

        Ok(PreparedExchange {
            exchange,
            request,
            response,
            request_digest,
            response_digest,
            target_uri,
        })
    }

    /// Build the records of a prepared exchange.
    ///
    /// With a `revisit` target the response is written as a revisit record
    /// holding only the HTTP response header block.
    pub fn build(
        &self,
        prepared: &PreparedExchange,
        warcinfo_id: &str,
        revisit: Option<&RevisitTarget>,
    ) -> ExchangeRecords {
        let timestamp = prepared.exchange.timestamp;
        let response_type = if revisit.is_some() {
            WarcRecordType::Revisit
        } else {
            WarcRecordType::Response
        };
        let request_draft = RecordDraft::new(self.version, WarcRecordType::Request, timestamp);
        let response_draft = RecordDraft::new(self.version, response_type, timestamp);
        let request_id = request_draft.record_id().to_string();
        let response_id = response_draft.record_id().to_string();

        let request_draft = self
            .common_fields(request_draft, prepared, warcinfo_id, &prepared.request)
            .field(WARC_CONCURRENT_TO, &response_id)
            .content_type(CONTENT_HTTP_REQUEST);
        let request = request_draft.finish(
            prepared.exchange.request.clone(),
            Some(prepared.request_digest.clone()),
        );

        let mut response_draft = self
            .common_fields(response_draft, prepared, warcinfo_id, &prepared.response)
            .field(WARC_CONCURRENT_TO, &request_id)
            .field(WARC_PAYLOAD_DIGEST, prepared.payload_digest().to_string());
        let response = match revisit {
            Some(target) => {
                response_draft = response_draft
                    .field(WARC_PROFILE, self.version.revisit_profile())
                    .field(WARC_REFERS_TO, &target.record_id)
                    .field(WARC_REFERS_TO_DATE, format_date(&target.date));
                if let Some(uri) = &target.target_uri {
                    response_draft = response_draft.field(WARC_REFERS_TO_TARGET_URI, uri);
                }
                let head = prepared.exchange.response[..prepared.response.head_len()].to_vec();
                response_draft.content_type(CONTENT_HTTP_RESPONSE).finish(head, None)
            }
            None => response_draft.content_type(CONTENT_HTTP_RESPONSE).finish(
                prepared.exchange.response.clone(),
                Some(prepared.response_digest.clone()),
            ),
        };

        let metadata = (!prepared.exchange.metadata.is_empty()).then(|| {
            let mut body = String::new();
            for (key, value) in &prepared.exchange.metadata {
                push_field(&mut body, key, value);
            }
            let mut draft = RecordDraft::new(self.version, WarcRecordType::Metadata, timestamp);
            if let Some(uri) = &prepared.target_uri {
                draft = draft.field(WARC_TARGET_URI, uri);
            }
            draft
                .field(WARC_WARCINFO_ID, warcinfo_id)
                .field(WARC_CONCURRENT_TO, &request_id)
                .content_type(CONTENT_WARC_FIELDS)
                .finish(body.into_bytes(), None)
        });

        ExchangeRecords {
            request,
            response,
            metadata,
        }
    }

    fn common_fields(
        &self,
        mut draft: RecordDraft,
        prepared: &PreparedExchange,
        warcinfo_id: &str,
        message: &HttpMessage,
    ) -> RecordDraft {
        if let Some(uri) = &prepared.target_uri {
            draft = draft.field(WARC_TARGET_URI, uri);
        }
        draft = draft.field(WARC_WARCINFO_ID, warcinfo_id);
        if let Some(peer) = prepared.exchange.peer {
            draft = draft.field(WARC_IP_ADDRESS, peer.to_string());
        }
        draft = draft.field(WARC_PROTOCOL, message.protocol());
        if let Some(tls) = &prepared.exchange.tls {
            draft = draft
                .field(WARC_PROTOCOL, tls.protocol())
                .field(WARC_CIPHER_SUITE, tls.cipher_suite());
        }
        draft
    }
}

fn push_field(body: &mut String, key: &str, value: &str) {
    let clean = |s: &str| s.replace(['\r', '\n'], " ");
    body.push_str(&clean(key));
    body.push_str(": ");
    body.push_str(&clean(value));
    body.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const REQUEST: &[u8] = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";

    fn response(body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    fn builder() -> RecordBuilder {
        RecordBuilder::new(
            WarcVersion::V1_0,
            "tests",
            vec![("operator".to_string(), "Jane".to_string())],
        )
    }

    #[test]
    fn test_warcinfo_body() {
        let builder = RecordBuilder::new(
            WarcVersion::V1_1,
            "crawler/2",
            vec![
                ("operator".to_string(), "Jane".to_string()),
                ("software".to_string(), "ignored".to_string()),
            ],
        );
        let info = builder.warcinfo("out-00000.warc.zst");
        assert_eq!(info.record_type(), WarcRecordType::WarcInfo);
        assert_eq!(info.headers().status_line(), "WARC/1.1");
        assert_eq!(info.headers().get(WARC_FILENAME).as_deref(), Some("out-00000.warc.zst"));
        assert_eq!(info.headers().get(CONTENT_TYPE).as_deref(), Some(CONTENT_WARC_FIELDS));

        let body = String::from_utf8(info.payload().to_vec()).unwrap();
        let expected_software = format!("software: warcwriter/{} crawler/2\r\n", env!("CARGO_PKG_VERSION"));
        assert!(body.starts_with("operator: Jane\r\n"));
        assert!(body.contains(&expected_software));
        assert!(body.contains("format: WARC File Format 1.1\r\n"));
        assert!(body.contains("conformsTo: "));
        assert!(!body.contains("ignored"));
    }

    #[test]
    fn test_exchange_records() {
        let builder = builder();
        let exchange = CapturedExchange::new(REQUEST, response("Hello, World!"), Utc::now())
            .with_peer(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)));
        let prepared = builder.prepare(exchange).unwrap();
        assert_eq!(prepared.target_uri(), Some("http://example.com/index.html"));

        let records = builder.build(&prepared, "<urn:uuid:info>", None);
        assert_eq!(records.len(), 2);
        let (req, resp) = (&records.request, &records.response);

        assert_eq!(req.record_type(), WarcRecordType::Request);
        assert_eq!(resp.record_type(), WarcRecordType::Response);
        assert_eq!(resp.headers().get(WARC_CONCURRENT_TO).as_deref(), Some(req.record_id()));
        assert_eq!(req.headers().get(WARC_CONCURRENT_TO).as_deref(), Some(resp.record_id()));
        assert_eq!(req.date(), resp.date());
        assert_eq!(req.payload(), REQUEST);
        assert_eq!(req.headers().get(WARC_IP_ADDRESS).as_deref(), Some("93.184.216.34"));
        assert_eq!(req.headers().get(WARC_PROTOCOL).as_deref(), Some("http/1.1"));
        assert_eq!(req.headers().get(WARC_WARCINFO_ID).as_deref(), Some("<urn:uuid:info>"));
        assert_eq!(
            resp.headers().get(WARC_PAYLOAD_DIGEST),
            Some(Digest::sha1(b"Hello, World!").to_string())
        );
        assert_eq!(
            resp.headers().get(CONTENT_LENGTH),
            Some(resp.payload().len().to_string())
        );
        assert!(resp.block_digest().verify(resp.payload()));
    }

    #[test]
    fn test_tls_fields_and_https_uri() {
        let builder = builder();
        let exchange = CapturedExchange::new(REQUEST, response("x"), Utc::now())
            .with_tls(TlsInfo::new("tls/1.3", "TLS_AES_256_GCM_SHA384"));
        let prepared = builder.prepare(exchange).unwrap();
        let records = builder.build(&prepared, "<urn:uuid:info>", None);
        let protocols: Vec<&[u8]> = records.request.headers().get_all(b"warc-protocol").collect();
        assert_eq!(protocols, vec![b"http/1.1".as_slice(), b"tls/1.3".as_slice()]);
        assert_eq!(
            records.response.headers().get(WARC_CIPHER_SUITE).as_deref(),
            Some("TLS_AES_256_GCM_SHA384")
        );
        assert_eq!(
            records.request.headers().get(WARC_TARGET_URI).as_deref(),
            Some("https://example.com/index.html")
        );
    }

    #[test]
    fn test_revisit_record() {
        let builder = builder();
        let body = "z".repeat(MIN_REVISIT_BYTES);
        let raw_response = response(&body);
        let prepared = builder
            .prepare(CapturedExchange::new(REQUEST, raw_response.clone(), Utc::now()))
            .unwrap();
        assert!(prepared.revisit_eligible());

        let target = RevisitTarget {
            record_id: "<urn:uuid:first>".to_string(),
            date: Utc::now(),
            target_uri: Some("http://example.com/other".to_string()),
        };
        let records = builder.build(&prepared, "<urn:uuid:info>", Some(&target));
        let revisit = &records.response;
        assert_eq!(revisit.record_type(), WarcRecordType::Revisit);
        assert_eq!(revisit.headers().get(WARC_REFERS_TO).as_deref(), Some("<urn:uuid:first>"));
        assert_eq!(
            revisit.headers().get(WARC_REFERS_TO_TARGET_URI).as_deref(),
            Some("http://example.com/other")
        );
        assert_eq!(revisit.payload(), &raw_response[..raw_response.len() - body.len()]);
        assert_eq!(
            revisit.headers().get(WARC_PAYLOAD_DIGEST),
            Some(Digest::sha1(body.as_bytes()).to_string())
        );
    }

    #[test]
    fn test_metadata_record() {
        let builder = builder();
        let exchange = CapturedExchange::new(REQUEST, response("x"), Utc::now())
            .with_metadata("via", "proxy-1")
            .with_metadata("outlinks", "http://example.com/a");
        let prepared = builder.prepare(exchange).unwrap();
        let records = builder.build(&prepared, "<urn:uuid:info>", None);
        assert_eq!(records.len(), 3);
        let metadata = records.metadata.as_ref().unwrap();
        assert_eq!(metadata.record_type(), WarcRecordType::Metadata);
        assert_eq!(
            metadata.headers().get(WARC_CONCURRENT_TO).as_deref(),
            Some(records.request.record_id())
        );
        assert_eq!(metadata.payload(), b"via: proxy-1\r\noutlinks: http://example.com/a\r\n");
        assert_eq!(records.iter().count(), 3);
    }

    #[test]
    fn test_incomplete_exchanges_rejected() {
        let builder = builder();
        let cases: Vec<(&[u8], Vec<u8>)> = vec![
            (&b""[..], response("x")),
            (REQUEST, Vec::new()),
            (&b"GET / HTTP/1.1\r\nHost: a"[..], response("x")),
            (REQUEST, b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort".to_vec()),
        ];
        for (request, response) in cases {
            let result = builder.prepare(CapturedExchange::new(request, response, Utc::now()));
            assert!(matches!(result, Err(WarcError::CaptureIncomplete(_))));
        }
    }
}
