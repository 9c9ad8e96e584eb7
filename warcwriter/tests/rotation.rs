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

mod common;

use chrono::Utc;
use tempfile::TempDir;
use warcwriter::{Compressor, RotationPolicy, WarcWriter, WriterOptions, ZstdCompressor};

use common::*;

fn assert_file_layout(path: &std::path::Path, compressor: &Compressor) -> usize {
    let records = read_warc(path, compressor);
    assert_eq!(records[0].record_type(), "warcinfo");
    assert_eq!(
        records[0].header("WARC-Filename"),
        path.file_name().and_then(|n| n.to_str())
    );
    assert_eq!(records.iter().filter(|r| r.record_type() == "warcinfo").count(), 1);
    for pair in records[1..].chunks(2) {
        assert_eq!(pair[0].record_type(), "request");
        assert_eq!(pair[1].record_type(), "response");
        assert_eq!(pair[1].header("WARC-Concurrent-To"), Some(pair[0].record_id()));
        assert_eq!(pair[0].header("WARC-Warcinfo-ID"), Some(records[0].record_id()));
    }
    (records.len() - 1) / 2
}

#[test]
fn test_rotate_by_size() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let compressor = Compressor::Zstd(ZstdCompressor::new(1).unwrap());
    let writer = WarcWriter::open(
        &template(&dir, "size-$number"),
        compressor.clone(),
        RotationPolicy::by_megabytes(1),
        Vec::new(),
        "",
    )
    .unwrap();

    // 8 x 300 KiB is well over 1 MiB of uncompressed data.
    let (request, response) = exchange("/big", 300 * 1024);
    for _ in 0..8 {
        writer.write_exchange(&request, &response, Utc::now()).unwrap();
    }
    writer.close().unwrap();

    let files = writer.files();
    assert!(files.len() >= 2, "expected rotation, got {:?}", files);
    assert_eq!(files[0], dir.path().join("size-00000.warc.zst"));
    assert_eq!(files[1], dir.path().join("size-00001.warc.zst"));

    let exchanges: usize = files.iter().map(|f| assert_file_layout(f, &compressor)).sum();
    assert_eq!(exchanges, 8);
    assert_eq!(writer.stats().files_created, files.len() as u64);
}

#[test]
fn test_oversized_exchange_goes_into_fresh_file() {
    let dir = TempDir::new().unwrap();
    let writer = WarcWriter::open(
        &template(&dir, "huge-$number"),
        Compressor::None,
        RotationPolicy::by_megabytes(1),
        Vec::new(),
        "",
    )
    .unwrap();

    let (request, response) = exchange("/huge", 1536 * 1024);
    writer.write_exchange(&request, &response, Utc::now()).unwrap();
    writer.write_exchange(&request, &response, Utc::now()).unwrap();
    writer.close().unwrap();

    let files = writer.files();
    assert_eq!(files.len(), 2);
    for file in &files {
        assert_eq!(assert_file_layout(file, &Compressor::None), 1);
    }
}

#[test]
fn test_rotate_by_record_count() {
    let dir = TempDir::new().unwrap();
    let writer = WarcWriter::open_with(
        &template(&dir, "count-$number-$serial"),
        WriterOptions {
            rotation: RotationPolicy::never().with_max_records(5),
            ..WriterOptions::default()
        },
    )
    .unwrap();

    let (request, response) = exchange("/n", 20);
    for _ in 0..5 {
        writer.write_exchange(&request, &response, Utc::now()).unwrap();
    }
    writer.close().unwrap();

    // warcinfo + 2 exchanges per file.
    let files = writer.files();
    assert_eq!(files.len(), 3);
    let counts: Vec<usize> = files
        .iter()
        .map(|f| assert_file_layout(f, &Compressor::None))
        .collect();
    assert_eq!(counts, vec![2, 2, 1]);

    let name = files[2].file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("count-00002-"));
    assert_eq!(name.len(), "count-00002-".len() + 8 + ".warc".len());
}

#[test]
fn test_zero_threshold_never_rotates() {
    let dir = TempDir::new().unwrap();
    let writer = WarcWriter::open(
        &template(&dir, "never-$number"),
        Compressor::None,
        RotationPolicy::by_megabytes(0),
        Vec::new(),
        "",
    )
    .unwrap();
    let (request, response) = exchange("/z", 512 * 1024);
    for _ in 0..4 {
        writer.write_exchange(&request, &response, Utc::now()).unwrap();
    }
    assert_eq!(writer.files().len(), 1);
    assert_eq!(writer.records().len(), 9);
}
