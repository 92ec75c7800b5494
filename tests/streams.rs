// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;
use std::sync::{Arc, Mutex};
use pretty_assertions::assert_eq;
use rayo::{read_source, write_sink, Buffer, SEGMENT_SIZE};
use rayo::pool::Pool;
use rayo::streams::{
	BufSink, BufSource, BufStream, Result, Sink, SinkBuffer, Source, SourceBuffer,
};

/// A sink capturing everything written through it, observable from outside
/// the buffered wrapper.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
	fn contents(&self) -> Vec<u8> {
		self.0.lock().unwrap().clone()
	}
}

impl Sink for SharedSink {
	fn write(&mut self, source: &mut Buffer<impl Pool>, count: usize) -> Result<usize> {
		let count = min(count, source.count());
		let bytes = source.read_byte_str(count)?;
		self.0.lock().unwrap().extend_from_slice(bytes.as_slice());
		Ok(count)
	}
}

#[test]
fn buffered_source_reads_typed_values() {
	let bytes: &[u8] = &[0x12, 0x34, 0x56, 0x78, b'h', b'i'];
	let mut reader = bytes.buffer();

	assert_eq!(reader.read_u16().unwrap(), 0x1234);
	assert_eq!(reader.read_u16_le().unwrap(), 0x7856);
	assert_eq!(reader.read_utf8(2).unwrap(), "hi");
	assert!(reader.exhausted().unwrap());
}

#[test]
fn require_fails_on_short_input() {
	let bytes: &[u8] = &[1, 2, 3];
	let mut reader = bytes.buffer();

	assert!(reader.request(3).unwrap());
	let error = reader.require(4).unwrap_err();
	assert!(error.is_eos());
}

#[test]
fn buffered_sink_batches_and_flushes() {
	let sink = SharedSink::default();
	let mut writer = sink.clone().buffer();
	writer.write_utf8("hello ").unwrap();
	writer.write_u8(b'w').unwrap();
	writer.write_utf8("orld").unwrap();

	// Below the high-water mark, nothing reached the sink yet.
	assert_eq!(sink.contents(), b"");
	writer.flush().unwrap();
	assert_eq!(sink.contents(), b"hello world");
}

#[test]
fn buffered_sink_emits_complete_segments() {
	let sink = SharedSink::default();
	let mut writer = sink.clone().buffer();
	let payload = vec![0xABu8; SEGMENT_SIZE + 10];
	writer.write_from_slice(&payload).unwrap();

	// The complete segment was written through without an explicit flush;
	// the partial tail stayed buffered.
	assert_eq!(sink.contents().len(), SEGMENT_SIZE);
	assert_eq!(writer.buf().count(), 10);

	writer.flush().unwrap();
	assert_eq!(sink.contents(), payload);
	assert_eq!(writer.buf().count(), 0);
}

#[test]
fn drop_flushes_the_sink() {
	let sink = SharedSink::default();
	{
		let mut writer = sink.clone().buffer();
		writer.write_utf8("flushed on drop").unwrap();
	}
	assert_eq!(sink.contents(), b"flushed on drop");
}

#[test]
fn peek_does_not_consume() {
	let bytes: &[u8] = b"peekaboo";
	let mut reader = bytes.buffer();

	{
		let mut peeked = reader.peek().buffer();
		assert_eq!(peeked.read_utf8(4).unwrap(), "peek");
		assert_eq!(peeked.read_utf8(4).unwrap(), "aboo");
		assert!(peeked.exhausted().unwrap());
	}

	assert_eq!(reader.read_utf8(8).unwrap(), "peekaboo", "peek must consume nothing");
}

#[test]
fn peek_twice_sees_the_same_bytes() {
	let bytes: &[u8] = b"replay";
	let mut reader = bytes.buffer();

	let first = {
		let mut peeked = reader.peek().buffer();
		peeked.read_utf8(6).unwrap()
	};
	let second = {
		let mut peeked = reader.peek().buffer();
		peeked.read_utf8(6).unwrap()
	};
	assert_eq!(first, second);
	assert_eq!(reader.read_utf8(6).unwrap(), "replay");
}

#[test]
fn std_io_bridges_round_trip() {
	let mut source = read_source(&b"bridged bytes"[..]).buffer();
	assert_eq!(source.read_utf8(13).unwrap(), "bridged bytes");
	assert!(source.exhausted().unwrap());

	let mut sink = write_sink(Vec::new());
	let mut data = Buffer::default();
	data.write_utf8("back out").unwrap();
	sink.write_all(&mut data).unwrap();
	sink.flush().unwrap();
	assert_eq!(sink.into_inner(), b"back out");
}

#[test]
fn lines_across_fill_boundaries() {
	// A line longer than one fill makes the reader request more input
	// before it finds the terminator.
	let mut text = "a".repeat(SEGMENT_SIZE + 100);
	text.push_str("\r\nnext");
	let bytes = text.as_bytes().to_vec();
	let mut reader = (&bytes[..]).buffer();

	let mut line = String::new();
	assert!(reader.read_utf8_line(&mut line).unwrap());
	assert_eq!(line.len(), SEGMENT_SIZE + 100);
	assert!(line.bytes().all(|b| b == b'a'));

	line.clear();
	assert!(!reader.read_utf8_line(&mut line).unwrap());
	assert_eq!(line, "next");
}

#[test]
fn close_is_idempotent() {
	let bytes: &[u8] = b"x";
	let mut reader = bytes.buffer();
	reader.close_source().unwrap();
	reader.close_source().unwrap();
	assert!(reader.read_u8().is_err(), "reads after close fail");
}
