use std::io::{Cursor, Read, Write};
use std::path::PathBuf;

use anyhow::Result;
use tempfile::{tempdir, NamedTempFile};

use corpusflow::io::split::{RecordWrite, SplitWriter, StreamOut};
use corpusflow::pipeline::slot::{ChannelSlot, SwapSlot};
use corpusflow::pipeline::{line, round_robin, warc};
use corpusflow::{DecompressReader, WarcReader};

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn numbered_lines(n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..n {
        writeln!(out, "line {i}").unwrap();
    }
    out
}

/// Run a pipeline into a temp file and return (exit code, bytes).
fn run_to_file<F>(run: F) -> Result<(i32, Vec<u8>)>
where
    F: FnOnce(std::fs::File) -> Result<i32>,
{
    let out_file = NamedTempFile::new()?;
    let code = run(out_file.reopen()?)?;
    let mut bytes = Vec::new();
    out_file.reopen()?.read_to_end(&mut bytes)?;
    Ok((code, bytes))
}

#[test]
fn identity_cat_preserves_order_channel_slot() -> Result<()> {
    let input = numbered_lines(200);
    let (code, output) = run_to_file(|out| {
        line::run::<ChannelSlot>(3, &argv(&["cat"]), Cursor::new(input.clone()), out)
    })?;
    assert_eq!(code, 0);
    assert_eq!(output, input);
    Ok(())
}

#[test]
fn identity_cat_preserves_order_swap_slot() -> Result<()> {
    let input = numbered_lines(200);
    let (code, output) = run_to_file(|out| {
        line::run::<SwapSlot>(3, &argv(&["cat"]), Cursor::new(input.clone()), out)
    })?;
    assert_eq!(code, 0);
    assert_eq!(output, input);
    Ok(())
}

#[test]
fn identity_cat_preserves_order_round_robin() -> Result<()> {
    let input = numbered_lines(200);
    let (code, output) = run_to_file(|out| {
        round_robin::run(3, &argv(&["cat"]), Cursor::new(input.clone()), out)
    })?;
    assert_eq!(code, 0);
    assert_eq!(output, input);
    Ok(())
}

#[test]
fn empty_input_shuts_down_cleanly() -> Result<()> {
    let (code, output) = run_to_file(|out| {
        line::run::<ChannelSlot>(4, &argv(&["cat"]), Cursor::new(Vec::new()), out)
    })?;
    assert_eq!(code, 0);
    assert!(output.is_empty());
    Ok(())
}

#[test]
fn thousand_lines_through_four_workers() -> Result<()> {
    let input = numbered_lines(1000);
    let (code, output) = run_to_file(|out| {
        line::run::<ChannelSlot>(4, &argv(&["cat"]), Cursor::new(input.clone()), out)
    })?;
    assert_eq!(code, 0);
    assert_eq!(output.iter().filter(|&&b| b == b'\n').count(), 1000);
    assert_eq!(output, input);
    Ok(())
}

#[test]
fn worst_child_exit_code_wins() -> Result<()> {
    let input = numbered_lines(10);
    let (code, output) = run_to_file(|out| {
        line::run::<ChannelSlot>(
            2,
            &argv(&["sh", "-c", "cat; exit 3"]),
            Cursor::new(input.clone()),
            out,
        )
    })?;
    assert_eq!(code, 3);
    assert_eq!(output, input);
    Ok(())
}

#[test]
fn child_that_produces_no_output_fails_the_pipeline() {
    let input = numbered_lines(10);
    let result = run_to_file(|out| {
        line::run::<ChannelSlot>(2, &argv(&["false"]), Cursor::new(input), out)
    });
    assert!(result.is_err());
}

fn record(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"WARC/1.0\r\n");
    out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

fn read_warc_payloads(path: &std::path::Path) -> Result<Vec<Vec<u8>>> {
    let mut reader = WarcReader::new(DecompressReader::open(path)?);
    let mut payloads = Vec::new();
    while let Some(rec) = reader.read(usize::MAX)? {
        assert!(!rec.payload.is_empty(), "no gaps expected");
        payloads.push(rec.payload);
    }
    Ok(payloads)
}

#[test]
fn warc_identity_cat_single_worker() -> Result<()> {
    let records = vec![
        record(b"one"),
        record(b"two, a little longer"),
        record(b"three"),
    ];
    let dir = tempdir()?;
    let in_path = dir.path().join("in.warc");
    std::fs::write(&in_path, records.concat())?;
    let out_path = dir.path().join("out.warc");

    let out = StreamOut::new(std::fs::File::create(&out_path)?);
    let code = warc::run(&[in_path], Box::new(out), 1, false, &argv(&["cat"]))?;
    assert_eq!(code, 0);
    assert_eq!(read_warc_payloads(&out_path)?, records);
    Ok(())
}

#[test]
fn warc_gzip_output_decodes_back() -> Result<()> {
    let records: Vec<Vec<u8>> = (0..6)
        .map(|i| record(format!("record body number {i}").as_bytes()))
        .collect();
    let dir = tempdir()?;
    let in_path = dir.path().join("in.warc");
    std::fs::write(&in_path, records.concat())?;
    let out_path = dir.path().join("out.warc.gz");

    let out = StreamOut::new(std::fs::File::create(&out_path)?);
    let code = warc::run(&[in_path], Box::new(out), 2, true, &argv(&["cat"]))?;
    assert_eq!(code, 0);

    let mut payloads = read_warc_payloads(&out_path)?;
    payloads.sort();
    let mut expected = records;
    expected.sort();
    assert_eq!(payloads, expected);
    Ok(())
}

#[test]
fn warc_split_output_rolls_over_whole_records() -> Result<()> {
    let records: Vec<Vec<u8>> = (0..8)
        .map(|i| record(format!("padding padding padding {i}").as_bytes()))
        .collect();
    let record_len = records[0].len() as u64;
    let bytes_limit = record_len * 2; // two records per shard
    let dir = tempdir()?;
    let in_path = dir.path().join("in.warc");
    std::fs::write(&in_path, records.concat())?;
    let template: PathBuf = dir.path().join("shard-XX.warc");

    let out = SplitWriter::new(template.to_str().unwrap(), bytes_limit)?;
    let code = warc::run(&[in_path], Box::new(out), 2, false, &argv(&["cat"]))?;
    assert_eq!(code, 0);

    let mut shards = Vec::new();
    for n in 0.. {
        let path = dir.path().join(format!("shard-{n:02}.warc"));
        if !path.exists() {
            break;
        }
        let len = std::fs::metadata(&path)?.len();
        assert!(len <= bytes_limit, "shard over the byte limit");
        assert_eq!(len % record_len, 0, "a record was split across shards");
        shards.push(path);
    }
    assert!(shards.len() >= 4);

    let mut payloads = Vec::new();
    for shard in &shards {
        payloads.extend(read_warc_payloads(shard)?);
    }
    payloads.sort();
    let mut expected = records;
    expected.sort();
    assert_eq!(payloads, expected);
    Ok(())
}

#[test]
fn split_writer_respects_the_byte_limit() -> Result<()> {
    let dir = tempdir()?;
    let template = dir.path().join("part-XXX.bin");
    let mut writer = SplitWriter::new(template.to_str().unwrap(), 100)?;
    for i in 0..5u8 {
        writer.write_record(&[i; 60])?;
    }
    writer.finish()?;
    drop(writer);

    let mut all = Vec::new();
    for n in 0..5 {
        let path = dir.path().join(format!("part-{n:03}.bin"));
        let bytes = std::fs::read(&path)?;
        assert_eq!(bytes.len(), 60, "one record per shard at this limit");
        all.extend(bytes);
    }
    assert_eq!(all.len(), 300);
    Ok(())
}
