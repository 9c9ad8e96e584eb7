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

//! The WARC writer session.
//!
//! A [`WarcWriter`] owns one physical output file at a time. Every exchange is
//! serialized, compressed record by record, and appended with a single write
//! while the session lock is held, so concurrent writers never interleave
//! partial exchanges.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::builder::{CapturedExchange, ExchangeRecords, PreparedExchange, RecordBuilder, RevisitTarget};
use crate::compression::Compressor;
use crate::error::{Result, WarcError};
use crate::record::{WarcRecord, WarcRecordType, WarcVersion};
use crate::rotation::{new_serial, PathTemplate, RotationPolicy};

/// Session settings besides the file name template.
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    pub compressor: Compressor,
    pub rotation: RotationPolicy,
    /// Operator fields for every warcinfo record, in output order.
    pub warcinfo_fields: Vec<(String, String)>,
    /// Appended to this crate's name and version in warcinfo records.
    pub software: String,
    pub version: WarcVersion,
    /// Write responses whose payload was seen before as revisit records.
    pub revisit: bool,
}

/// Identity and byte range of one written exchange.
///
/// Handles are only meaningful for the session and file they were issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordHandle {
    session: Uuid,
    file_number: u64,
    concurrency_id: String,
    response_id: String,
    start: u64,
    end: u64,
}

impl RecordHandle {
    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Sequence number of the file the exchange was written to.
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Record ID of the request, which the other records of the exchange
    /// reference in `WARC-Concurrent-To`.
    pub fn concurrency_id(&self) -> &str {
        &self.concurrency_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    /// Offset of the first byte of the exchange in the file.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Offset one past the last byte of the exchange.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Position of one record in the current file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    pub record_id: String,
    pub record_type: WarcRecordType,
    /// Offset of the (compressed) record.
    pub offset: u64,
    /// On-disk length of the (compressed) record.
    pub length: u64,
    pub content_length: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub files_created: u64,
    pub exchanges_written: u64,
    pub exchanges_discarded: u64,
    pub records_written: u64,
    pub revisits_written: u64,
    /// On-disk bytes of all files, after discards.
    pub bytes_written: u64,
}

#[derive(Debug)]
struct ExchangeEntry {
    handle: RecordHandle,
    first_record: usize,
    uncompressed_before: u64,
    revisit_key: Option<String>,
}

#[derive(Debug)]
struct ActiveFile {
    path: PathBuf,
    number: u64,
    file: File,
    warcinfo_id: String,
    offset: u64,
    uncompressed: u64,
    records: Vec<RecordLocation>,
    exchanges: Vec<ExchangeEntry>,
    /// Set when a truncation failed and the file no longer matches the
    /// bookkeeping above.
    failed: bool,
}

impl ActiveFile {
    /// Append `buf` in one piece. A partial write is truncated away again.
    fn append(&mut self, buf: &[u8]) -> Result<()> {
        if let Err(err) = self.file.write_all(buf) {
            if let Err(e) = self.truncate(self.offset) {
                error!("Failed to roll back partial write to {}: {}", self.path.display(), e);
            }
            return Err(err.into());
        }
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let result = self
            .file
            .seek(SeekFrom::Start(len))
            .and_then(|_| self.file.set_len(len));
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }

    /// Bookkeeping for records that were just encoded into one buffer
    /// starting at `base`.
    fn push_locations(&mut self, base: u64, records: &ExchangeRecords, lengths: &[u64]) {
        let mut offset = base;
        for (record, &length) in records.iter().zip(lengths) {
            self.records.push(location(record, offset, length));
            offset += length;
        }
    }
}

fn location(record: &WarcRecord, offset: u64, length: u64) -> RecordLocation {
    RecordLocation {
        record_id: record.record_id().to_string(),
        record_type: record.record_type(),
        offset,
        length,
        content_length: record.content_length() as u64,
    }
}

#[derive(Debug, Default)]
struct WriterState {
    file: Option<ActiveFile>,
    closed: bool,
    files: Vec<PathBuf>,
    next_number: u64,
    revisit_cache: HashMap<String, RevisitTarget>,
    stats: WriterStats,
}

impl WriterState {
    fn open_file(&mut self) -> Result<&mut ActiveFile> {
        match &mut self.file {
            Some(file) if !self.closed && !file.failed => Ok(file),
            _ => Err(WarcError::WriterClosed),
        }
    }

    /// Remove the last exchange of the current file and return the new tail.
    fn remove_tail(&mut self) -> Result<Option<RecordHandle>> {
        let file = self.open_file()?;
        let Some(entry) = file.exchanges.last() else {
            return Ok(None);
        };
        let start = entry.handle.start;
        if let Err(e) = file.truncate(start) {
            error!("Failed to discard exchange from {}: {}", file.path.display(), e);
            return Err(e.into());
        }

        let Some(entry) = file.exchanges.pop() else {
            return Ok(None);
        };
        file.records.truncate(entry.first_record);
        file.offset = start;
        file.uncompressed = entry.uncompressed_before;
        let new_tail = file.exchanges.last().map(|e| e.handle.clone());

        if let Some(key) = &entry.revisit_key {
            self.revisit_cache.remove(key);
        }
        self.stats.exchanges_discarded += 1;
        self.stats.bytes_written -= entry.handle.len();
        info!(
            "Discarded exchange {} ({} bytes at offset {})",
            entry.handle.concurrency_id,
            entry.handle.len(),
            start
        );
        Ok(new_tail)
    }
}

/// Thread-safe writer of one WARC session.
///
/// All methods take `&self`; share the writer between threads with an `Arc`
/// or by reference.
#[derive(Debug)]
pub struct WarcWriter {
    session: Uuid,
    template: PathTemplate,
    compressor: Compressor,
    rotation: RotationPolicy,
    builder: RecordBuilder,
    revisit: bool,
    state: Mutex<WriterState>,
    last: RwLock<Option<RecordHandle>>,
}

impl WarcWriter {
    /// Open a new session and create its first file.
    ///
    /// # Arguments
    ///
    /// * `template` - Output path template without the `.warc` extension
    /// * `compressor` - Per-record compressor
    /// * `rotation` - When to start a new file
    /// * `warcinfo_fields` - Operator fields for warcinfo records
    /// * `software` - Software identification for warcinfo records
    pub fn open(
        template: &str,
        compressor: Compressor,
        rotation: RotationPolicy,
        warcinfo_fields: Vec<(String, String)>,
        software: &str,
    ) -> Result<Self> {
        Self::open_with(
            template,
            WriterOptions {
                compressor,
                rotation,
                warcinfo_fields,
                software: software.to_string(),
                ..WriterOptions::default()
            },
        )
    }

    pub fn open_with(template: &str, options: WriterOptions) -> Result<Self> {
        let template = PathTemplate::parse(template)?;
        let builder = RecordBuilder::new(options.version, &options.software, options.warcinfo_fields);
        let writer = WarcWriter {
            session: Uuid::new_v4(),
            template,
            compressor: options.compressor,
            rotation: options.rotation,
            builder,
            revisit: options.revisit,
            state: Mutex::new(WriterState::default()),
            last: RwLock::new(None),
        };

        {
            let mut state = writer.state.lock();
            let file = writer.create_file(&mut state)?;
            state.file = Some(file);
        }
        debug!(
            "Opened WARC session {} (compression: {}, rotation: {:?})",
            writer.session,
            writer.compressor.name(),
            writer.rotation
        );
        Ok(writer)
    }

    /// Write one exchange captured at `timestamp`.
    pub fn write_exchange(&self, request: &[u8], response: &[u8], timestamp: DateTime<Utc>) -> Result<RecordHandle> {
        self.write_captured(CapturedExchange::new(request, response, timestamp))
    }

    /// Write one exchange with its connection details.
    pub fn write_captured(&self, exchange: CapturedExchange) -> Result<RecordHandle> {
        let prepared = self.builder.prepare(exchange)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.open_file()?;

        if self.needs_rotation(state, &prepared) {
            self.rotate(state)?;
        }

        let revisit_key = prepared.payload_digest().to_string();
        let revisit_target = if self.revisit && prepared.revisit_eligible() {
            state.revisit_cache.get(&revisit_key).cloned()
        } else {
            None
        };

        let file = state.open_file()?;
        let records = self.builder.build(&prepared, &file.warcinfo_id, revisit_target.as_ref());

        let mut buf = Vec::new();
        let mut lengths = Vec::with_capacity(records.len());
        let mut uncompressed = 0u64;
        for record in records.iter() {
            let bytes = record.to_bytes();
            let encoded = self.compressor.encode(&bytes)?;
            buf.extend_from_slice(&encoded);
            lengths.push(encoded.len() as u64);
            uncompressed += bytes.len() as u64;
        }

        let start = file.offset;
        let uncompressed_before = file.uncompressed;
        file.append(&buf)?;
        file.uncompressed += uncompressed;
        let first_record = file.records.len();
        file.push_locations(start, &records, &lengths);

        let handle = RecordHandle {
            session: self.session,
            file_number: file.number,
            concurrency_id: records.request.record_id().to_string(),
            response_id: records.response.record_id().to_string(),
            start,
            end: file.offset,
        };

        let inserted_key = if self.revisit
            && revisit_target.is_none()
            && prepared.revisit_eligible()
            && !state.revisit_cache.contains_key(&revisit_key)
        {
            state.revisit_cache.insert(
                revisit_key.clone(),
                RevisitTarget {
                    record_id: records.response.record_id().to_string(),
                    date: records.response.date(),
                    target_uri: prepared.target_uri().map(str::to_string),
                },
            );
            Some(revisit_key)
        } else {
            None
        };

        let file = state.open_file()?;
        file.exchanges.push(ExchangeEntry {
            handle: handle.clone(),
            first_record,
            uncompressed_before,
            revisit_key: inserted_key,
        });

        state.stats.exchanges_written += 1;
        state.stats.records_written += records.len() as u64;
        state.stats.bytes_written += handle.len();
        if revisit_target.is_some() {
            state.stats.revisits_written += 1;
        }
        *self.last.write() = Some(handle.clone());

        debug!(
            "Wrote exchange {} ({} records, {} bytes at offset {})",
            handle.concurrency_id,
            records.len(),
            handle.len(),
            handle.start
        );
        Ok(handle)
    }

    /// Remove the most recent exchange of the current file.
    ///
    /// This trusts that the tail is the exchange the caller has in mind. With
    /// several threads writing, another exchange may have been appended in the
    /// meantime; use [`WarcWriter::discard`] with a handle in that case.
    ///
    /// Returns the removed exchange, or `None` if the current file holds no
    /// exchange.
    pub fn discard_last(&self) -> Result<Option<RecordHandle>> {
        let mut state = self.state.lock();
        let removed = match state.open_file()?.exchanges.last() {
            Some(entry) => entry.handle.clone(),
            None => return Ok(None),
        };
        let new_tail = state.remove_tail()?;
        *self.last.write() = new_tail;
        Ok(Some(removed))
    }

    /// Snapshot of the last exchange of the current file, or `None` if the
    /// current file holds none or the session is closed.
    pub fn get_last(&self) -> Option<RecordHandle> {
        self.last.read().clone()
    }

    /// Remove the exchange described by `handle`.
    ///
    /// Only the last exchange of the current file can be removed. Afterwards
    /// the file is byte-identical to never having received the exchange.
    pub fn discard(&self, handle: &RecordHandle) -> Result<()> {
        let mut state = self.state.lock();
        let file = state.open_file()?;
        if handle.session != self.session || handle.file_number != file.number {
            return Err(WarcError::StaleHandle);
        }
        let position = file
            .exchanges
            .iter()
            .rposition(|e| e.handle == *handle)
            .ok_or(WarcError::StaleHandle)?;
        if position + 1 != file.exchanges.len() {
            return Err(WarcError::NotTail);
        }
        let new_tail = state.remove_tail()?;
        *self.last.write() = new_tail;
        Ok(())
    }

    /// Flush, sync, and close the current file.
    ///
    /// Calling this more than once is a no-op. The session is closed even if
    /// the final sync fails.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        *self.last.write() = None;
        if let Some(mut file) = state.file.take() {
            file.sync()?;
            info!(
                "Closed WARC file {} ({} records, {} bytes)",
                file.path.display(),
                file.records.len(),
                file.offset
            );
        }
        Ok(())
    }

    /// Whether the session accepts no more writes, either after [`close`]
    /// or after a failed rollback left the current file unusable.
    ///
    /// [`close`]: WarcWriter::close
    pub fn is_closed(&self) -> bool {
        let state = self.state.lock();
        state.closed || state.file.as_ref().is_some_and(|f| f.failed)
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub fn rotation(&self) -> RotationPolicy {
        self.rotation
    }

    pub fn version(&self) -> WarcVersion {
        self.builder.version()
    }

    /// Path of the file currently written to.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.state.lock().file.as_ref().map(|f| f.path.clone())
    }

    /// All files created by this session, oldest first.
    pub fn files(&self) -> Vec<PathBuf> {
        self.state.lock().files.clone()
    }

    /// Records of the current file, starting with its warcinfo record.
    pub fn records(&self) -> Vec<RecordLocation> {
        self.state
            .lock()
            .file
            .as_ref()
            .map(|f| f.records.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> WriterStats {
        self.state.lock().stats
    }

    fn needs_rotation(&self, state: &WriterState, prepared: &PreparedExchange) -> bool {
        let Some(file) = &state.file else {
            return false;
        };
        // A file holding only its warcinfo record takes any exchange.
        if file.records.len() <= 1 {
            return false;
        }
        let record_count = file.records.len() as u64 + 2 + u64::from(!prepared.exchange().metadata().is_empty());
        let bytes = file.uncompressed + prepared.raw_len() as u64;
        self.rotation.should_rotate(bytes, record_count)
    }

    /// Replace the current file with a fresh one. On failure the writer keeps
    /// using the current file.
    fn rotate(&self, state: &mut WriterState) -> Result<()> {
        state.open_file()?.sync()?;
        let new_file = self.create_file(state)?;
        if let Some(old) = state.file.replace(new_file) {
            info!(
                "Rotated WARC file {} after {} records ({} bytes)",
                old.path.display(),
                old.records.len(),
                old.offset
            );
        }
        Ok(())
    }

    /// Create the next file of the session and write its warcinfo record.
    fn create_file(&self, state: &mut WriterState) -> Result<ActiveFile> {
        let number = state.next_number;
        let name = self.template.resolve(&Utc::now(), number, &new_serial());
        let path = PathBuf::from(format!("{}.warc{}", name, self.compressor.file_extension()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| WarcError::CannotCreateFile {
                path: path.clone(),
                source,
            })?;

        let mut active = ActiveFile {
            path,
            number,
            file,
            warcinfo_id: String::new(),
            offset: 0,
            uncompressed: 0,
            records: Vec::new(),
            exchanges: Vec::new(),
            failed: false,
        };

        let warcinfo = self.builder.warcinfo(&file_name(&active.path));
        let bytes = warcinfo.to_bytes();
        let encoded = self.compressor.encode(&bytes)?;
        if let Err(err) = active.append(&encoded) {
            drop(active.file);
            if let Err(e) = std::fs::remove_file(&active.path) {
                warn!("Failed to remove unusable WARC file {}: {}", active.path.display(), e);
            }
            return Err(err);
        }
        active.uncompressed = bytes.len() as u64;
        active.warcinfo_id = warcinfo.record_id().to_string();
        active.records.push(location(&warcinfo, 0, encoded.len() as u64));

        state.next_number += 1;
        state.files.push(active.path.clone());
        state.stats.files_created += 1;
        state.stats.records_written += 1;
        state.stats.bytes_written += active.offset;
        info!("Created WARC file {}", active.path.display());
        Ok(active)
    }
}

impl Drop for WarcWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close WARC session {}: {}", self.session, e);
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
