// SPDX-License-Identifier: Apache-2.0

use num_bigint::BigInt;
use simdutf8::compat::from_utf8;
use crate::streams::BufSource;
use super::{
	BitString, Error, Header, ProtocolError, Result, UnknownValue, Value,
};

/// A streaming DER reader over a byte source. Tracks the absolute position,
/// a stack of enclosing length limits, and a path of value names used in
/// error diagnostics.
pub struct DerReader<S: BufSource> {
	source: S,
	pos: u64,
	limits: Vec<Option<u64>>,
	peeked: Option<Header>,
	path: Vec<&'static str>,
	hints: Vec<Option<Value>>,
}

impl<S: BufSource> DerReader<S> {
	pub fn new(source: S) -> Self {
		Self {
			source,
			pos: 0,
			limits: vec![None],
			peeked: None,
			path: Vec::new(),
			hints: Vec::new(),
		}
	}

	/// Builds a protocol error at the current path.
	pub fn error(&self, message: impl Into<String>) -> Error {
		ProtocolError::new(message, self.path.clone()).into()
	}

	/// Reads the header of the next value without consuming it, or `None` at
	/// the end of the enclosing value (or input).
	pub fn peek_header(&mut self) -> Result<Option<Header>> {
		if self.peeked.is_some() {
			return Ok(self.peeked.clone())
		}
		if self.exhausted()? {
			return Ok(None)
		}

		let header = self.read_header()?;
		self.peeked = Some(header.clone());
		Ok(self.peeked.clone())
	}

	/// Consumes the next value's header, bounds the reader to its declared
	/// length, and runs `body`. The body must consume the value exactly;
	/// anything short is a protocol error.
	pub fn read<T>(
		&mut self,
		name: &'static str,
		body: impl FnOnce(&mut Self, &Header) -> Result<T>
	) -> Result<T> {
		let Some(header) = self.peek_header()? else {
			return Err(self.error("expected a value"))
		};
		self.peeked = None;
		self.path.push(name);

		let end = self.pos + header.length;
		if let Some(limit) = self.limit() {
			if end > limit {
				let error = self.error("length exceeds the enclosing value");
				self.path.pop();
				return Err(error)
			}
		}

		self.limits.push(Some(end));
		let result = body(self, &header).and_then(|value| {
			if self.pos == end {
				Ok(value)
			} else {
				Err(self.error("unexpected bytes remain in the value"))
			}
		});
		self.limits.pop();
		self.path.pop();
		result
	}

	/// Returns the number of bytes left in the enclosing value, or `None`
	/// when unbounded (top level).
	pub fn bytes_left(&self) -> Option<u64> {
		self.limit().map(|end| end - self.pos)
	}

	/// Returns `true` when the enclosing value (or the input) is fully
	/// consumed.
	pub fn exhausted(&mut self) -> Result<bool> {
		match self.limit() {
			Some(end) => Ok(self.pos >= end),
			None => self.source
						.exhausted()
						.map_err(Error::from),
		}
	}

	// Primitive bodies. Each reads the full remaining extent of the value
	// opened by the enclosing `read`.

	pub fn read_boolean(&mut self, header: &Header) -> Result<bool> {
		self.check_primitive(header)?;
		if self.remaining()? != 1 {
			return Err(self.error("boolean length must be 1"))
		}
		Ok(self.next_byte()? != 0)
	}

	pub fn read_long(&mut self, header: &Header) -> Result<i64> {
		self.check_primitive(header)?;
		let len = self.remaining()?;
		if len == 0 || len > 8 {
			return Err(self.error(format!("integer length {len} outside 1..=8")))
		}

		let bytes = self.read_slice(len)?;
		self.check_minimal_integer(&bytes)?;

		let mut value = if bytes[0] & 0x80 != 0 { -1i64 } else { 0 };
		for byte in bytes {
			value = value << 8 | i64::from(byte);
		}
		Ok(value)
	}

	pub fn read_big_integer(&mut self, header: &Header) -> Result<BigInt> {
		self.check_primitive(header)?;
		let len = self.remaining()?;
		if len == 0 {
			return Err(self.error("integer length must be at least 1"))
		}

		let bytes = self.read_slice(len)?;
		self.check_minimal_integer(&bytes)?;
		Ok(BigInt::from_signed_bytes_be(&bytes))
	}

	pub fn read_bit_string(&mut self, header: &Header) -> Result<BitString> {
		self.check_primitive(header)?;
		let len = self.remaining()?;
		if len == 0 {
			return Err(self.error("bit string needs an unused-bit count"))
		}

		let unused_bits = self.next_byte()?;
		if unused_bits > 7 {
			return Err(self.error("unused bit count outside 0..=7"))
		}
		if len == 1 && unused_bits != 0 {
			return Err(self.error("unused bits in an empty bit string"))
		}

		let bytes = self.read_slice(len - 1)?;
		Ok(BitString {
			bytes: bytes.into(),
			unused_bits,
		})
	}

	pub fn read_octet_string(&mut self, header: &Header) -> Result<Vec<u8>> {
		self.check_primitive(header)?;
		let len = self.remaining()?;
		self.read_slice(len)
	}

	pub fn read_utf8(&mut self, header: &Header) -> Result<String> {
		self.check_primitive(header)?;
		let len = self.remaining()?;
		let bytes = self.read_slice(len)?;
		match from_utf8(&bytes) {
			Ok(_) => {
				// Safety: validated as UTF-8 just above.
				Ok(unsafe { String::from_utf8_unchecked(bytes) })
			}
			Err(_) => Err(self.error("string is not valid UTF-8")),
		}
	}

	pub fn read_null(&mut self, header: &Header) -> Result<()> {
		self.check_primitive(header)?;
		if self.remaining()? != 0 {
			return Err(self.error("null length must be 0"))
		}
		Ok(())
	}

	/// Reads an OBJECT IDENTIFIER body into dotted decimal form. The first
	/// byte encodes the first two components as `X * 40 + Y`.
	pub fn read_object_identifier(&mut self, header: &Header) -> Result<String> {
		self.check_primitive(header)?;
		if self.remaining()? == 0 {
			return Err(self.error("object identifier is empty"))
		}

		let first = self.read_subidentifier()?;
		let mut oid = match first {
			0..=39 => format!("0.{first}"),
			40..=79 => format!("1.{}", first - 40),
			_ => format!("2.{}", first - 80),
		};

		while self.remaining()? > 0 {
			let subid = self.read_subidentifier()?;
			oid.push('.');
			oid.push_str(&subid.to_string());
		}
		Ok(oid)
	}

	/// Captures a value of unknown schema verbatim for later re-encoding.
	pub fn read_unknown(&mut self, header: &Header) -> Result<UnknownValue> {
		let len = self.remaining()?;
		let bytes = self.read_slice(len)?;
		Ok(UnknownValue {
			tag_class: header.tag_class,
			tag: header.tag,
			constructed: header.constructed,
			bytes: bytes.into(),
		})
	}

	/// Reads the remaining bytes of the enclosing value.
	pub fn read_rest(&mut self) -> Result<Vec<u8>> {
		let len = self.remaining()?;
		self.read_slice(len)
	}

	// Type hints: a value published by one member of a SEQUENCE for later
	// members of the same SEQUENCE to choose their schema by.

	pub(crate) fn push_hint_frame(&mut self) {
		self.hints.push(None);
	}

	pub(crate) fn pop_hint_frame(&mut self) {
		self.hints.pop();
	}

	pub(crate) fn set_hint(&mut self, value: Value) {
		if let Some(frame) = self.hints.last_mut() {
			*frame = Some(value);
		}
	}

	pub(crate) fn hint(&self) -> Option<&Value> {
		self.hints.last()?.as_ref()
	}

	// Internals

	fn limit(&self) -> Option<u64> {
		*self.limits.last().expect("the limit stack is never empty")
	}

	fn remaining(&self) -> Result<u64> {
		self.bytes_left()
			.ok_or_else(|| self.error("primitive read outside a value"))
	}

	fn check_primitive(&self, header: &Header) -> Result {
		if header.constructed {
			Err(self.error("constructed encoding of a primitive value"))
		} else {
			Ok(())
		}
	}

	fn check_minimal_integer(&self, bytes: &[u8]) -> Result {
		if bytes.len() > 1
			&& (bytes[0] == 0x00 && bytes[1] & 0x80 == 0
				|| bytes[0] == 0xFF && bytes[1] & 0x80 != 0) {
			Err(self.error("integer not in shortest form"))
		} else {
			Ok(())
		}
	}

	fn next_byte(&mut self) -> Result<u8> {
		if let Some(end) = self.limit() {
			if self.pos >= end {
				return Err(self.error("truncated value"))
			}
		}

		let byte = self.source
					   .read_u8()
					   .map_err(|err| self.map_stream(err))?;
		self.pos += 1;
		Ok(byte)
	}

	fn read_slice(&mut self, count: u64) -> Result<Vec<u8>> {
		if let Some(end) = self.limit() {
			if self.pos + count > end {
				return Err(self.error("truncated value"))
			}
		}

		let mut bytes = vec![0; count as usize];
		self.source
			.read_into_slice_exact(&mut bytes)
			.map_err(|err| self.map_stream(err))?;
		self.pos += count;
		Ok(bytes)
	}

	fn map_stream(&self, error: crate::streams::Error) -> Error {
		if error.is_eos() {
			self.error("unexpected end of input")
		} else {
			error.into()
		}
	}

	fn read_subidentifier(&mut self) -> Result<u64> {
		let mut value = 0u64;
		let mut first = true;
		loop {
			let byte = self.next_byte()?;
			if first && byte == 0x80 {
				return Err(self.error("subidentifier not in shortest form"))
			}
			first = false;

			if value > u64::MAX >> 7 {
				return Err(self.error("subidentifier too large"))
			}
			value = value << 7 | u64::from(byte & 0x7F);
			if byte & 0x80 == 0 {
				return Ok(value)
			}
		}
	}

	fn read_header(&mut self) -> Result<Header> {
		let byte = self.next_byte()?;
		let tag_class = byte & 0xC0;
		let constructed = byte & 0x20 != 0;
		let mut tag = u64::from(byte & 0x1F);

		if tag == 0x1F {
			tag = self.read_subidentifier()?;
			if tag < 0x1F {
				return Err(self.error("tag not in shortest form"))
			}
		}

		let byte = self.next_byte()?;
		let length = if byte & 0x80 == 0 {
			u64::from(byte)
		} else {
			let count = usize::from(byte & 0x7F);
			if count == 0 {
				return Err(self.error("indefinite length is not permitted in DER"))
			}
			if count > 8 {
				return Err(self.error("length over 8 bytes"))
			}

			let mut length = 0u64;
			for i in 0..count {
				let byte = self.next_byte()?;
				if i == 0 && byte == 0 {
					return Err(self.error("length not in shortest form"))
				}
				length = length << 8 | u64::from(byte);
			}
			if length < 0x80 {
				return Err(self.error("length not in shortest form"))
			}
			if length > i64::MAX as u64 {
				return Err(self.error("length exceeds a signed 64-bit range"))
			}
			length
		};

		Ok(Header {
			tag_class,
			tag,
			constructed,
			length,
		})
	}
}

#[cfg(test)]
mod test {
	use crate::Buffer;
	use super::DerReader;

	fn reader(bytes: &[u8]) -> DerReader<Buffer> {
		DerReader::new(Buffer::from_slice(bytes).unwrap())
	}

	#[test]
	fn reads_primitive_header() {
		let mut r = reader(&[0x02, 0x01, 0x32]);
		let header = r.peek_header().unwrap().unwrap();
		assert_eq!(header.tag, 2);
		assert_eq!(header.tag_class, 0);
		assert!(!header.constructed);
		assert_eq!(header.length, 1);

		let value = r.read("test", |r, h| r.read_long(h)).unwrap();
		assert_eq!(value, 0x32);
		assert!(r.peek_header().unwrap().is_none(), "input should be exhausted");
	}

	#[test]
	fn reads_long_form_length() {
		let mut input = vec![0x0C, 0x81, 0xC9];
		input.extend(std::iter::repeat(b'a').take(201));
		let mut r = reader(&input);
		let value = r.read("test", |r, h| r.read_utf8(h)).unwrap();
		assert_eq!(value.len(), 201);
	}

	#[test]
	fn reads_multibyte_tag() {
		// Context tag 201, primitive: 9F 81 49.
		let mut r = reader(&[0x9F, 0x81, 0x49, 0x01, 0x00]);
		let header = r.peek_header().unwrap().unwrap();
		assert_eq!(header.tag, 201);
		assert_eq!(header.tag_class, 0x80);
	}

	#[test]
	fn rejects_indefinite_length() {
		let mut r = reader(&[0x30, 0x80, 0x00, 0x00]);
		let error = r.read("test", |_, _| Ok(())).unwrap_err();
		assert!(error.to_string().contains("indefinite"));
	}

	#[test]
	fn rejects_non_shortest_length() {
		let mut r = reader(&[0x02, 0x81, 0x01, 0x32]);
		assert!(r.peek_header().is_err());
	}

	#[test]
	fn rejects_non_shortest_integer() {
		let mut r = reader(&[0x02, 0x02, 0x00, 0x32]);
		let error = r.read("test", |r, h| r.read_long(h)).unwrap_err();
		assert!(error.to_string().contains("shortest"));
	}

	#[test]
	fn reads_object_identifier() {
		let mut r = reader(&[0x06, 0x03, 0x88, 0x37, 0x03]);
		let oid = r.read("test", |r, h| r.read_object_identifier(h)).unwrap();
		assert_eq!(oid, "2.999.3");
	}

	#[test]
	fn truncation_is_a_protocol_error() {
		let mut r = reader(&[0x02, 0x05, 0x01]);
		let error = r.read("test", |r, h| r.read_long(h)).unwrap_err();
		assert!(error.is_protocol());
	}
}
