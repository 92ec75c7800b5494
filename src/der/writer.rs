// SPDX-License-Identifier: Apache-2.0

use num_bigint::BigInt;
use crate::{Buffer, ByteString};
use crate::streams::{BufSink, BufSource};
use super::{BitString, Error, ProtocolError, Result};

/// A streaming DER writer. Values nest: [`write`](Self::write) buffers the
/// body produced by its closure, then emits tag, length, and payload into the
/// enclosing value. An element is encoded as constructed when its body wrote
/// nested values, unless explicitly overridden (an OCTET STRING wrapping DER
/// content stays primitive).
pub struct DerWriter {
	stack: Vec<Frame>,
	path: Vec<&'static str>,
	hints: Vec<Option<super::Value>>,
}

struct Frame {
	buffer: Buffer,
	has_children: bool,
	constructed_override: Option<bool>,
}

impl Frame {
	fn new(constructed_override: Option<bool>) -> Self {
		Self {
			buffer: Buffer::default(),
			has_children: false,
			constructed_override,
		}
	}
}

impl Default for DerWriter {
	fn default() -> Self { Self::new() }
}

impl DerWriter {
	pub fn new() -> Self {
		Self {
			stack: vec![Frame::new(None)],
			path: Vec::new(),
			hints: Vec::new(),
		}
	}

	/// Builds a protocol error at the current path.
	pub fn error(&self, message: impl Into<String>) -> Error {
		ProtocolError::new(message, self.path.clone()).into()
	}

	/// Writes one value: runs `body` against a fresh frame, then emits the
	/// framed bytes with the given tag.
	pub fn write<T>(
		&mut self,
		name: &'static str,
		tag_class: u8,
		tag: u64,
		body: impl FnOnce(&mut Self) -> Result<T>
	) -> Result<T> {
		self.write_element(name, tag_class, tag, None, body)
	}

	/// Like [`write`](Self::write), with the constructed bit forced to
	/// `constructed_override` instead of inferred from the body.
	pub fn write_element<T>(
		&mut self,
		name: &'static str,
		tag_class: u8,
		tag: u64,
		constructed_override: Option<bool>,
		body: impl FnOnce(&mut Self) -> Result<T>
	) -> Result<T> {
		self.path.push(name);
		self.stack.push(Frame::new(constructed_override));

		let result = body(self);
		let frame = self.stack.pop().expect("the pushed frame is still present");
		self.path.pop();
		let value = result?;

		let constructed = frame.constructed_override
							   .unwrap_or(frame.has_children);
		let mut content = frame.buffer;
		let parent = self.top();
		parent.has_children = true;

		write_identifier(&mut parent.buffer, tag_class, tag, constructed)?;
		write_length(&mut parent.buffer, content.count() as u64)?;
		parent.buffer
			  .transfer_from(&mut content)
			  .map_err(Error::from)?;
		Ok(value)
	}

	/// Finishes writing, returning the encoded bytes.
	pub fn finish(mut self) -> Result<ByteString> {
		debug_assert_eq!(self.stack.len(), 1, "unbalanced write frames");
		let buffer = &mut self.top().buffer;
		let count = buffer.count();
		buffer.read_byte_str(count).map_err(Error::from)
	}

	// Primitive content writes. Each appends raw content bytes to the value
	// opened by the enclosing `write`.

	pub fn write_boolean(&mut self, value: bool) -> Result {
		self.content().write_u8(if value { 0xFF } else { 0x00 })?;
		Ok(())
	}

	pub fn write_long(&mut self, value: i64) -> Result {
		let bytes = value.to_be_bytes();
		let mut start = 0;
		while start < 7
			&& (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0
				|| bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0) {
			start += 1;
		}
		self.content().write_from_slice(&bytes[start..])?;
		Ok(())
	}

	pub fn write_big_integer(&mut self, value: &BigInt) -> Result {
		let mut bytes = value.to_signed_bytes_be();
		if bytes.is_empty() {
			bytes.push(0);
		}
		self.content().write_from_slice(&bytes)?;
		Ok(())
	}

	pub fn write_bit_string(&mut self, value: &BitString) -> Result {
		if value.unused_bits > 7 {
			return Err(self.error("unused bit count outside 0..=7"))
		}
		let buffer = self.content();
		buffer.write_u8(value.unused_bits)?;
		buffer.write_from_slice(value.bytes.as_slice())?;
		Ok(())
	}

	pub fn write_octet_string(&mut self, value: &[u8]) -> Result {
		self.content().write_from_slice(value)?;
		Ok(())
	}

	pub fn write_utf8(&mut self, value: &str) -> Result {
		self.content().write_utf8(value)?;
		Ok(())
	}

	/// Writes an OBJECT IDENTIFIER body from dotted decimal form.
	pub fn write_object_identifier(&mut self, oid: &str) -> Result {
		let mut components = Vec::new();
		for part in oid.split('.') {
			match part.parse::<u64>() {
				Ok(value) => components.push(value),
				Err(_) => return Err(self.error(format!("malformed object identifier {oid:?}"))),
			}
		}

		let [first, second, rest @ ..] = components.as_slice() else {
			return Err(self.error(format!("object identifier {oid:?} needs two components")))
		};
		if *first > 2 || (*first < 2 && *second > 39) {
			return Err(self.error(format!("object identifier {oid:?} out of range")))
		}

		self.write_subidentifier(*first * 40 + *second)?;
		for &component in rest {
			self.write_subidentifier(component)?;
		}
		Ok(())
	}

	/// Writes raw, already-encoded bytes as content.
	pub fn write_raw(&mut self, bytes: &[u8]) -> Result {
		self.content().write_from_slice(bytes)?;
		Ok(())
	}

	// Type hints, mirroring the reader's stack.

	pub(crate) fn push_hint_frame(&mut self) {
		self.hints.push(None);
	}

	pub(crate) fn pop_hint_frame(&mut self) {
		self.hints.pop();
	}

	pub(crate) fn set_hint(&mut self, value: super::Value) {
		if let Some(frame) = self.hints.last_mut() {
			*frame = Some(value);
		}
	}

	pub(crate) fn hint(&self) -> Option<&super::Value> {
		self.hints.last()?.as_ref()
	}

	fn top(&mut self) -> &mut Frame {
		self.stack.last_mut().expect("the frame stack is never empty")
	}

	fn content(&mut self) -> &mut Buffer {
		&mut self.top().buffer
	}

	fn write_subidentifier(&mut self, value: u64) -> Result {
		let bits = 64 - value.leading_zeros() as usize;
		let mut shift = bits.saturating_sub(1) / 7 * 7;
		let buffer = self.content();
		while shift > 0 {
			buffer.write_u8(0x80 | (value >> shift) as u8 & 0x7F)?;
			shift -= 7;
		}
		buffer.write_u8(value as u8 & 0x7F)?;
		Ok(())
	}
}

fn write_identifier(buffer: &mut Buffer, tag_class: u8, tag: u64, constructed: bool) -> Result {
	let constructed_bit = if constructed { 0x20 } else { 0 };
	if tag < 0x1F {
		buffer.write_u8(tag_class | constructed_bit | tag as u8)?;
	} else {
		buffer.write_u8(tag_class | constructed_bit | 0x1F)?;
		let bits = 64 - tag.leading_zeros() as usize;
		let mut shift = (bits - 1) / 7 * 7;
		while shift > 0 {
			buffer.write_u8(0x80 | (tag >> shift) as u8 & 0x7F)?;
			shift -= 7;
		}
		buffer.write_u8(tag as u8 & 0x7F)?;
	}
	Ok(())
}

fn write_length(buffer: &mut Buffer, length: u64) -> Result {
	if length < 0x80 {
		buffer.write_u8(length as u8)?;
		return Ok(())
	}

	let bytes = length.to_be_bytes();
	let skip = bytes.iter().take_while(|&&byte| byte == 0).count();
	buffer.write_u8(0x80 | (8 - skip) as u8)?;
	buffer.write_from_slice(&bytes[skip..])?;
	Ok(())
}

#[cfg(test)]
mod test {
	use super::DerWriter;

	#[test]
	fn writes_long_form_length() {
		let mut w = DerWriter::new();
		w.write("test", 0, 12, |w| w.write_utf8(&"a".repeat(201))).unwrap();
		let bytes = w.finish().unwrap();
		assert_eq!(&bytes.as_slice()[..3], &[0x0C, 0x81, 0xC9]);
		assert_eq!(bytes.len(), 204);
	}

	#[test]
	fn writes_minimal_integers() {
		for (value, expected) in [
			(50i64, vec![0x02, 0x01, 0x32]),
			(-1, vec![0x02, 0x01, 0xFF]),
			(-256, vec![0x02, 0x02, 0xFF, 0x00]),
			(i64::MIN, vec![0x02, 0x08, 0x80, 0, 0, 0, 0, 0, 0, 0]),
		] {
			let mut w = DerWriter::new();
			w.write("test", 0, 2, |w| w.write_long(value)).unwrap();
			assert_eq!(w.finish().unwrap(), *expected.as_slice(), "encoding {value}");
		}
	}

	#[test]
	fn writes_object_identifier() {
		let mut w = DerWriter::new();
		w.write("test", 0, 6, |w| w.write_object_identifier("2.999.3")).unwrap();
		assert_eq!(w.finish().unwrap(), [0x06, 0x03, 0x88, 0x37, 0x03]);
	}

	#[test]
	fn nested_writes_mark_constructed() {
		let mut w = DerWriter::new();
		w.write("outer", 0, 16, |w| {
			w.write("inner", 0, 2, |w| w.write_long(1))
		}).unwrap();
		let bytes = w.finish().unwrap();
		assert_eq!(bytes, [0x30, 0x03, 0x02, 0x01, 0x01]);
	}
}
