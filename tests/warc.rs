use std::io::{Cursor, Write};

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;

use corpusflow::{DecompressReader, WarcReader};

const NO_LIMIT: usize = usize::MAX;

fn gz(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn record(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"WARC/1.0\r\n");
    out.extend_from_slice(b"WARC-Type: resource\r\n");
    out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

fn reader_over(bytes: Vec<u8>) -> WarcReader {
    WarcReader::new(DecompressReader::new(Cursor::new(bytes)).unwrap())
}

#[test]
fn reads_records_in_sequence() -> Result<()> {
    let records = [
        record(b"first body"),
        record(b"the second, slightly longer body"),
        record(b""),
    ];
    let input: Vec<u8> = records.concat();
    let total = input.len() as u64;

    let mut reader = reader_over(input);
    let mut seen_bytes = 0u64;
    for expected in &records {
        let got = reader.read(NO_LIMIT)?.expect("a record");
        assert_eq!(&got.payload, expected);
        assert_eq!(got.skipped, 0);
        assert!(got.payload.ends_with(b"\r\n\r\n"));
        seen_bytes += got.payload.len() as u64;
    }
    assert!(reader.read(NO_LIMIT)?.is_none());
    assert_eq!(seen_bytes, total);
    Ok(())
}

#[test]
fn reparsing_concatenated_payloads_is_identity() -> Result<()> {
    let input = [record(b"alpha"), record(b"beta"), record(b"gamma")].concat();

    let mut first_pass = Vec::new();
    let mut reader = reader_over(input);
    while let Some(rec) = reader.read(NO_LIMIT)? {
        first_pass.push(rec.payload);
    }

    let mut reader = reader_over(first_pass.concat());
    let mut second_pass = Vec::new();
    while let Some(rec) = reader.read(NO_LIMIT)? {
        second_pass.push(rec.payload);
    }
    assert_eq!(first_pass, second_pass);
    Ok(())
}

#[test]
fn oversize_record_reports_an_elided_gap() -> Result<()> {
    let big = record(&vec![b'x'; 50_000]);
    let big_len = big.len() as u64;
    let input = [big, record(b"small survivor")].concat();

    let mut reader = reader_over(input);
    let gap = reader.read(1000)?.expect("a gap record");
    assert!(gap.payload.is_empty());
    assert_eq!(gap.skipped, big_len);

    let next = reader.read(1000)?.expect("the record after the gap");
    assert_eq!(next.payload, record(b"small survivor"));
    assert!(reader.read(1000)?.is_none());
    Ok(())
}

#[test]
fn corrupt_header_recovers_at_the_next_boundary() -> Result<()> {
    let garbage = b"HTTP/1.1 200 OK\r\nthis is not a warc header\r\n";
    let input = [
        record(b"good one").as_slice(),
        garbage,
        record(b"good two").as_slice(),
    ]
    .concat();

    let mut reader = reader_over(input);
    assert_eq!(reader.read(NO_LIMIT)?.unwrap().payload, record(b"good one"));

    let gap = reader.read(NO_LIMIT)?.expect("a recovery record");
    assert!(gap.payload.is_empty());
    assert_eq!(gap.skipped, garbage.len() as u64);

    assert_eq!(reader.read(NO_LIMIT)?.unwrap().payload, record(b"good two"));
    assert!(reader.read(NO_LIMIT)?.is_none());
    Ok(())
}

#[test]
fn missing_content_length_is_skipped_not_fatal() -> Result<()> {
    let mut input = b"WARC/1.0\r\nWARC-Type: response\r\n\r\n".to_vec();
    let tail = record(b"after the broken one");
    input.extend_from_slice(&tail);

    let mut reader = reader_over(input);
    let gap = reader.read(NO_LIMIT)?.expect("a recovery record");
    assert!(gap.payload.is_empty());
    assert!(gap.skipped > 0);
    assert_eq!(reader.read(NO_LIMIT)?.unwrap().payload, tail);
    Ok(())
}

#[test]
fn gzipped_input_is_transparent() -> Result<()> {
    let records = [record(b"zipped one"), record(b"zipped two")];
    let input = gz(&records.concat());

    let mut reader = reader_over(input);
    assert_eq!(reader.read(NO_LIMIT)?.unwrap().payload, records[0]);
    assert_eq!(reader.read(NO_LIMIT)?.unwrap().payload, records[1]);
    assert!(reader.read(NO_LIMIT)?.is_none());
    Ok(())
}

#[test]
fn decode_error_jumps_via_the_sidecar_index() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let first = gz(&record(b"before the damage"));
    let mut junk = vec![0x1f, 0x8b];
    junk.extend_from_slice(&[0xde; 64]);
    let second_at = (first.len() + junk.len()) as u64;

    let mut input = first;
    input.extend(&junk);
    input.extend(gz(&record(b"after the damage")));

    let warc_path = dir.path().join("crawl.warc.gz");
    std::fs::write(&warc_path, &input)?;
    std::fs::write(dir.path().join("crawl.txt"), format!("0\n{second_at}\n"))?;

    let mut reader = WarcReader::open(&warc_path)?;
    assert_eq!(
        reader.read(NO_LIMIT)?.unwrap().payload,
        record(b"before the damage")
    );
    let gap = reader.read(NO_LIMIT)?.expect("a recovery record");
    assert!(gap.payload.is_empty());
    assert!(gap.skipped > 0);
    assert_eq!(
        reader.read(NO_LIMIT)?.unwrap().payload,
        record(b"after the damage")
    );
    assert!(reader.read(NO_LIMIT)?.is_none());
    Ok(())
}

#[test]
fn decode_error_without_index_scans_for_xz_magic() -> Result<()> {
    fn xz(data: &[u8]) -> Vec<u8> {
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    let mut input = xz(&record(b"leading record"));
    // A gzip-looking shim that fails to decode, then a clean xz stream.
    input.extend_from_slice(&[0x1f, 0x8b]);
    input.extend_from_slice(&[0xad; 48]);
    input.extend(xz(&record(b"trailing record")));

    let mut reader = reader_over(input);
    assert_eq!(
        reader.read(NO_LIMIT)?.unwrap().payload,
        record(b"leading record")
    );
    let gap = reader.read(NO_LIMIT)?.expect("a recovery record");
    assert!(gap.payload.is_empty());
    assert_eq!(
        reader.read(NO_LIMIT)?.unwrap().payload,
        record(b"trailing record")
    );
    assert!(reader.read(NO_LIMIT)?.is_none());
    Ok(())
}
