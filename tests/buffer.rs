// SPDX-License-Identifier: Apache-2.0

#[macro_use]
mod common;

use pretty_assertions::assert_eq;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use rayo::{Buffer, ByteString, SEGMENT_SIZE};
use rayo::streams::{BufSink, BufSource};

#[quickcheck]
fn bytes_round_trip(bytes: Vec<u8>) -> TestResult {
	let mut buf = Buffer::default();
	if let Err(error) = buf.write_from_slice(&bytes) {
		return TestResult::error(error.to_string())
	}

	match buf.read_byte_str(bytes.len()) {
		Ok(read) => qc_assert_eq!(read, ByteString::of(bytes)),
		Err(error) => TestResult::error(error.to_string()),
	}
}

#[quickcheck]
fn utf8_round_trip(str: String) -> TestResult {
	let mut buf = Buffer::default();
	if let Err(error) = buf.write_utf8(&str) {
		return TestResult::error(error.to_string())
	}

	match buf.read_utf8(str.len()) {
		Ok(read) => qc_assert_eq!(read, str),
		Err(error) => TestResult::error(error.to_string()),
	}
}

#[quickcheck]
fn ints_round_trip(a: u64, b: i32, c: u16, d: i8) -> TestResult {
	let mut buf = Buffer::default();
	buf.write_u64(a).unwrap();
	buf.write_i32_le(b).unwrap();
	buf.write_u16(c).unwrap();
	buf.write_i8(d).unwrap();

	let read = (
		buf.read_u64().unwrap(),
		buf.read_i32_le().unwrap(),
		buf.read_u16().unwrap(),
		buf.read_i8().unwrap(),
	);
	qc_assert_eq!(read, (a, b, c, d))
}

#[quickcheck]
fn transfer_conserves_bytes(a: Vec<u8>, b: Vec<u8>) -> TestResult {
	let mut from = Buffer::default();
	let mut to = Buffer::default();
	from.write_from_slice(&a).unwrap();
	to.write_from_slice(&b).unwrap();

	to.transfer_from(&mut from).unwrap();
	if from.count() != 0 {
		return TestResult::error("transfer should drain the source");
	}
	if to.count() != a.len() + b.len() {
		return TestResult::error("transfer should conserve the byte count");
	}

	let mut expected = b;
	expected.extend_from_slice(&a);
	let read = to.read_byte_str(to.count()).unwrap();
	qc_assert_eq!(read, ByteString::of(expected))
}

#[quickcheck]
fn clone_isolation(shared: Vec<u8>, appended: Vec<u8>) -> TestResult {
	let mut original = Buffer::default();
	original.write_from_slice(&shared).unwrap();

	let mut clone = original.clone();
	original.write_from_slice(&appended).unwrap();
	clone.write_from_slice(b"unrelated").unwrap();
	clone.skip(clone.count()).unwrap();

	let mut expected = shared;
	expected.extend_from_slice(&appended);
	let read = original.read_byte_str(original.count()).unwrap();
	qc_assert_eq!(read, ByteString::of(expected))
}

#[quickcheck]
fn accounting_survives_interleaved_ops(chunks: Vec<Vec<u8>>, reads: Vec<u8>) -> TestResult {
	let mut buf = Buffer::default();
	let mut expected = 0usize;

	let mut reads = reads.into_iter();
	for chunk in &chunks {
		buf.write_from_slice(chunk).unwrap();
		expected += chunk.len();

		let take = usize::from(reads.next().unwrap_or(0)).min(expected);
		buf.skip(take).unwrap();
		expected -= take;

		if buf.count() != expected {
			return TestResult::error(format!(
				"count {} diverged from expected {expected}", buf.count()
			));
		}
	}

	let tail = buf.read_byte_str(buf.count()).unwrap();
	qc_assert_eq!(tail.len(), expected)
}

#[test]
fn clone_snapshots_at_clone_time() {
	let mut original = Buffer::default();
	original.write_utf8("abc").unwrap();

	let mut clone = original.clone();
	original.write_utf8("de").unwrap();

	assert_eq!(clone.read_utf8(clone.count()).unwrap(), "abc");
	assert_eq!(original.read_utf8(original.count()).unwrap(), "abcde");
}

#[test]
fn moves_span_segment_boundaries() {
	let mut from = Buffer::default();
	let big = vec![0xA5u8; SEGMENT_SIZE * 2 + 17];
	from.write_from_slice(&big).unwrap();

	let mut to = Buffer::default();
	to.transfer_from(&mut from).unwrap();
	assert_eq!(to.count(), big.len());
	assert_eq!(to.read_byte_str(big.len()).unwrap(), ByteString::of(big));
}

#[test]
fn partial_write_moves_exact_count() {
	let mut from = Buffer::default();
	from.write_utf8("hello world").unwrap();

	let mut to = Buffer::default();
	use rayo::streams::Sink;
	let moved = to.write(&mut from, 5).unwrap();
	assert_eq!(moved, 5);
	assert_eq!(to.read_utf8(5).unwrap(), "hello");
	assert_eq!(from.read_utf8(from.count()).unwrap(), " world");
}

#[test]
fn copy_to_does_not_consume() {
	let mut buf = Buffer::default();
	buf.write_utf8("abcdef").unwrap();

	let mut copy = Buffer::default();
	buf.copy_to(&mut copy, 2, 3).unwrap();
	assert_eq!(copy.read_utf8(3).unwrap(), "cde");
	assert_eq!(buf.count(), 6, "copying should not consume");
	assert_eq!(buf.read_utf8(6).unwrap(), "abcdef");
}

#[test]
fn copy_to_shares_aligned_segments() {
	let big = vec![0x5Au8; SEGMENT_SIZE];
	let mut buf = Buffer::default();
	buf.write_from_slice(&big).unwrap();

	let mut copy = Buffer::default();
	buf.copy_to(&mut copy, 0, SEGMENT_SIZE).unwrap();
	assert_eq!(copy.count(), SEGMENT_SIZE);
	assert_eq!(buf.count(), SEGMENT_SIZE);
	assert_eq!(copy.read_byte_str(SEGMENT_SIZE).unwrap(), ByteString::of(big));
}

#[test]
fn index_of_scans_range() {
	let mut buf = Buffer::default();
	buf.write_utf8("abcabc").unwrap();

	assert_eq!(buf.index_of(b'b', 0, 6), Some(1));
	assert_eq!(buf.index_of(b'b', 2, 6), Some(4));
	assert_eq!(buf.index_of(b'b', 2, 4), None);
	assert_eq!(buf.index_of(b'z', 0, 6), None);
}

#[test]
fn snapshot_reads_without_consuming() {
	let mut buf = Buffer::default();
	buf.write_utf8("snapshot").unwrap();

	assert_eq!(buf.snapshot(4), ByteString::from("snap"));
	assert_eq!(buf.count(), 8);
	assert_eq!(buf.read_utf8(8).unwrap(), "snapshot");
}

#[test]
fn read_past_end_is_end_of_input() {
	let mut buf = Buffer::default();
	buf.write_utf8("ab").unwrap();

	let error = buf.read_utf8(3).unwrap_err();
	assert!(error.is_eos());
	assert_eq!(buf.count(), 2, "a failed require should consume nothing");
}

#[test]
fn decimal_and_hex_longs() {
	let mut buf = Buffer::default();
	buf.write_utf8("-9223372036854775808 cafeBabe!").unwrap();

	assert_eq!(buf.read_decimal_long().unwrap(), i64::MIN);
	buf.skip(1).unwrap();
	assert_eq!(buf.read_hexadecimal_unsigned_long().unwrap(), 0xCAFE_BABE);
	assert_eq!(buf.read_utf8(1).unwrap(), "!");
}

#[test]
fn write_decimal_long_formats() {
	let mut buf = Buffer::default();
	buf.write_decimal_long(-42).unwrap();
	assert_eq!(buf.read_utf8(3).unwrap(), "-42");
}

#[test]
fn utf8_line_reading() {
	let mut buf = Buffer::default();
	buf.write_utf8("one\r\ntwo\nthree").unwrap();

	let mut line = String::new();
	assert!(buf.read_utf8_line(&mut line).unwrap());
	assert_eq!(line, "one");

	line.clear();
	assert!(buf.read_utf8_line(&mut line).unwrap());
	assert_eq!(line, "two");

	line.clear();
	assert!(!buf.read_utf8_line(&mut line).unwrap(), "no terminator at end");
	assert_eq!(line, "three");
}

#[test]
fn clear_releases_everything() {
	let mut buf = Buffer::default();
	buf.write_from_slice(&vec![1u8; SEGMENT_SIZE * 3]).unwrap();
	buf.clear().unwrap();
	assert_eq!(buf.count(), 0);
	assert!(buf.is_empty());
}

#[test]
fn compact_preserves_content() {
	let mut buf = Buffer::default();
	let mut other = Buffer::default();
	other.write_utf8("0123456789").unwrap();

	use rayo::streams::Sink;
	for _ in 0..5 {
		buf.write(&mut other, 2).unwrap();
	}
	buf.compact().unwrap();
	assert_eq!(buf.read_utf8(10).unwrap(), "0123456789");
}
