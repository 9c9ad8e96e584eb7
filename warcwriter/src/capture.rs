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

//! Interface between traffic interception and the writer.
//!
//! An interceptor creates one [`CaptureSession`] per HTTP exchange, feeds it
//! the bytes it sees going out and coming in, and finally hands the exchange
//! to whatever [`ExchangeSink`] it was given.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::builder::{CapturedExchange, TlsInfo};
use crate::error::Result;
use crate::writer::{RecordHandle, WarcWriter};

/// Destination for captured exchanges.
pub trait ExchangeSink: Send + Sync {
    fn submit(&self, exchange: CapturedExchange) -> Result<RecordHandle>;
}

impl ExchangeSink for WarcWriter {
    fn submit(&self, exchange: CapturedExchange) -> Result<RecordHandle> {
        self.write_captured(exchange)
    }
}

impl<T: ExchangeSink + ?Sized> ExchangeSink for &T {
    fn submit(&self, exchange: CapturedExchange) -> Result<RecordHandle> {
        (**self).submit(exchange)
    }
}

impl<T: ExchangeSink + ?Sized> ExchangeSink for Arc<T> {
    fn submit(&self, exchange: CapturedExchange) -> Result<RecordHandle> {
        (**self).submit(exchange)
    }
}

/// Accumulates the bytes of a single exchange.
#[derive(Debug)]
pub struct CaptureSession<S: ExchangeSink> {
    sink: S,
    request: Vec<u8>,
    response: Vec<u8>,
    started: Option<DateTime<Utc>>,
    peer: Option<IpAddr>,
    tls: Option<TlsInfo>,
    metadata: Vec<(String, String)>,
}

impl<S: ExchangeSink> CaptureSession<S> {
    pub fn new(sink: S) -> Self {
        CaptureSession {
            sink,
            request: Vec::new(),
            response: Vec::new(),
            started: None,
            peer: None,
            tls: None,
            metadata: Vec::new(),
        }
    }

    /// Record bytes sent to the server. The first call fixes the capture time.
    pub fn sent(&mut self, bytes: &[u8]) {
        self.started.get_or_insert_with(Utc::now);
        self.request.extend_from_slice(bytes);
    }

    /// Record bytes received from the server.
    pub fn received(&mut self, bytes: &[u8]) {
        self.started.get_or_insert_with(Utc::now);
        self.response.extend_from_slice(bytes);
    }

    pub fn set_peer(&mut self, peer: IpAddr) {
        self.peer = Some(peer);
    }

    pub fn set_tls(&mut self, tls: TlsInfo) {
        self.tls = Some(tls);
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.push((key.into(), value.into()));
    }

    pub fn bytes_sent(&self) -> usize {
        self.request.len()
    }

    pub fn bytes_received(&self) -> usize {
        self.response.len()
    }

    /// Captured exchange without submitting it.
    pub fn into_exchange(self) -> CapturedExchange {
        self.split().1
    }

    /// Submit the exchange to the sink.
    pub fn finish(self) -> Result<RecordHandle> {
        let (sink, exchange) = self.split();
        sink.submit(exchange)
    }

    /// Drop the captured bytes without writing anything.
    pub fn abandon(self) {
        debug!(
            "Abandoned capture of {} bytes sent, {} bytes received",
            self.request.len(),
            self.response.len()
        );
    }

    fn split(self) -> (S, CapturedExchange) {
        let CaptureSession {
            sink,
            request,
            response,
            started,
            peer,
            tls,
            metadata,
        } = self;

        let mut exchange = CapturedExchange::new(request, response, started.unwrap_or_else(Utc::now));
        if let Some(peer) = peer {
            exchange = exchange.with_peer(peer);
        }
        if let Some(tls) = tls {
            exchange = exchange.with_tls(tls);
        }
        for (key, value) in metadata {
            exchange = exchange.with_metadata(key, value);
        }
        (sink, exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarcError;
    use crate::writer::WriterOptions;
    use parking_lot::Mutex;
    use std::net::Ipv6Addr;
    use tempfile::TempDir;

    /// Keeps submitted exchanges in memory and reports them as not written.
    #[derive(Default)]
    struct MemorySink {
        exchanges: Mutex<Vec<CapturedExchange>>,
    }

    impl ExchangeSink for MemorySink {
        fn submit(&self, exchange: CapturedExchange) -> Result<RecordHandle> {
            self.exchanges.lock().push(exchange);
            Err(WarcError::WriterClosed)
        }
    }

    #[test]
    fn test_session_accumulates_bytes() {
        let sink = MemorySink::default();
        let mut session = CaptureSession::new(&sink);
        session.sent(b"GET / HTTP/1.1\r\n");
        session.sent(b"Host: example.com\r\n\r\n");
        session.received(b"HTTP/1.1 204 No Content\r\n\r\n");
        session.set_peer(IpAddr::V6(Ipv6Addr::LOCALHOST));
        session.add_metadata("note", "test");
        assert_eq!(session.bytes_sent(), 37);

        assert!(session.finish().is_err());
        let exchanges = sink.exchanges.lock();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].request(), b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(exchanges[0].response(), b"HTTP/1.1 204 No Content\r\n\r\n");
        assert_eq!(exchanges[0].peer(), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(exchanges[0].metadata().len(), 1);
    }

    #[test]
    fn test_abandon_submits_nothing() {
        let sink = Arc::new(MemorySink::default());
        let mut session = CaptureSession::new(Arc::clone(&sink));
        session.sent(b"GET / HTTP/1.1\r\n");
        session.abandon();
        assert!(sink.exchanges.lock().is_empty());
    }

    #[test]
    fn test_writer_as_shared_sink() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("capture");
        let writer = Arc::new(WarcWriter::open_with(template.to_str().unwrap(), WriterOptions::default()).unwrap());

        let mut session = CaptureSession::new(Arc::clone(&writer));
        session.sent(b"GET /a HTTP/1.1\r\nHost: example.com\r\n\r\n");
        session.received(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
        let handle = session.finish().unwrap();
        assert_eq!(writer.get_last(), Some(handle));
    }
}
