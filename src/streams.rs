// SPDX-License-Identifier: Apache-2.0

use std::error::Error as StdError;
use std::{error, fmt, io, mem, result};
use std::cmp::min;
use std::fmt::{Display, Formatter};
use simdutf8::compat::Utf8Error;
use crate::{Buffer, ByteString, SEGMENT_SIZE};
use crate::buffered_wrappers::{buffer_sink, buffer_source, BufferedSink, BufferedSource};
use crate::pool::{Pool, PoolError};
use ErrorKind::{Cancelled, Closed, Eos, InvalidUtf8, Io};
use OperationKind::{BufClear, BufCompact, BufCopy, BufFlush, BufRead, BufWrite};

pub type Result<T = ()> = result::Result<T, Error>;

/// The operation a stream [`Error`] was raised in.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, thiserror::Error)]
pub enum OperationKind {
	#[default]
	#[error("unknown operation")]
	Unknown,
	#[error("read from buffer")]
	BufRead,
	#[error("write to buffer")]
	BufWrite,
	#[error("copy buffer")]
	BufCopy,
	#[error("clear buffer")]
	BufClear,
	#[error("flush buffer")]
	BufFlush,
	#[error("compact buffer")]
	BufCompact,
	#[error("{0}")]
	Other(&'static str),
}

/// The failure class of a stream [`Error`]. `Eos` is a required read meeting
/// the end of input, `Cancelled` an operation observing cancellation at a
/// suspension point, and `Io` a pass-through transport failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ErrorKind {
	#[error("premature end of input")]
	Eos,
	#[error("transport error")]
	Io,
	#[error("operation cancelled")]
	Cancelled,
	#[error("invalid UTF-8")]
	InvalidUtf8,
	#[error("stream closed")]
	Closed,
	#[error("segment pool error")]
	Pool,
	#[error("{0}")]
	Other(&'static str),
}

#[derive(Debug, thiserror::Error)]
#[error("{kind} ({op})")]
pub struct Error {
	op: OperationKind,
	kind: ErrorKind,
	#[source]
	source: Option<Box<dyn error::Error + Send + Sync>>,
}

impl From<io::Error> for Error {
	fn from(value: io::Error) -> Self {
		if let io::ErrorKind::UnexpectedEof = value.kind() {
			Self::eos(OperationKind::Unknown)
		} else {
			Self::io(OperationKind::Unknown, value)
		}
	}
}

impl From<PoolError> for Error {
	fn from(value: PoolError) -> Self { Self::pool(value) }
}

impl Error {
	pub(crate) fn new(
		op: OperationKind,
		kind: ErrorKind,
		source: Option<Box<dyn error::Error + Send + Sync>>
	) -> Self {
		Self { op, kind, source }
	}

	/// Creates a new "end of input" error.
	pub fn eos(op: OperationKind) -> Self { Self::new(op, Eos, None) }

	/// Creates a new transport error.
	pub fn io(op: OperationKind, error: io::Error) -> Self {
		Self::new(op, Io, Some(error.into()))
	}

	/// Creates a new "cancelled" error.
	pub fn cancelled(op: OperationKind) -> Self {
		Self::new(op, Cancelled, None)
	}

	/// Creates a new "closed" error.
	pub fn closed(op: OperationKind) -> Self {
		Self::new(op, Closed, None)
	}

	/// Creates a new segment pool error.
	pub fn pool(error: PoolError) -> Self {
		Self::new(OperationKind::Unknown, ErrorKind::Pool, Some(error.into()))
	}

	/// Creates a new UTF-8 error.
	pub fn invalid_utf8(op: OperationKind, error: OffsetUtf8Error) -> Self {
		Self::new(op, InvalidUtf8, Some(error.into()))
	}

	pub fn kind(&self) -> ErrorKind { self.kind }
	pub fn operation(&self) -> OperationKind { self.op }

	/// Returns `true` for a premature end-of-input error.
	pub fn is_eos(&self) -> bool { matches!(self.kind, Eos) }

	/// Returns `true` for a cancellation error.
	pub fn is_cancelled(&self) -> bool { matches!(self.kind, Cancelled) }

	/// Replaces the operation context.
	pub fn with_operation(mut self, op: OperationKind) -> Self {
		self.op = op;
		self
	}

	/// Convenience shorthand for `with_operation(OperationKind::BufRead)`.
	pub fn with_op_buf_read(self) -> Self { self.with_operation(BufRead) }

	/// Convenience shorthand for `with_operation(OperationKind::BufWrite)`.
	pub fn with_op_buf_write(self) -> Self { self.with_operation(BufWrite) }

	/// Convenience shorthand for `with_operation(OperationKind::BufCopy)`.
	pub fn with_op_buf_copy(self) -> Self { self.with_operation(BufCopy) }

	/// Convenience shorthand for `with_operation(OperationKind::BufClear)`.
	pub fn with_op_buf_clear(self) -> Self { self.with_operation(BufClear) }

	/// Convenience shorthand for `with_operation(OperationKind::BufFlush)`.
	pub fn with_op_buf_flush(self) -> Self { self.with_operation(BufFlush) }

	/// Convenience shorthand for `with_operation(OperationKind::BufCompact)`.
	pub fn with_op_buf_compact(self) -> Self { self.with_operation(BufCompact) }

	/// Returns the source downcast into an IO error, if possible.
	pub fn io_source(&self) -> Option<&io::Error> {
		self.source.as_deref()?.downcast_ref()
	}

	pub(crate) fn into_io(self) -> io::Error {
		match self.kind {
			Eos => io::Error::new(io::ErrorKind::UnexpectedEof, self),
			Io  => {
				let Some(src) = self.io_source() else {
					return io::Error::new(io::ErrorKind::Other, self)
				};
				io::Error::new(src.kind(), self)
			}
			_   => io::Error::new(io::ErrorKind::Other, self)
		}
	}
}

/// A data source: the raw reader contract. Transports implement this.
pub trait Source {
	/// Reads up to `count` bytes from the source into the buffer, returning
	/// the number of bytes read. Returns `Ok(0)` when the source is exhausted.
	fn read(&mut self, sink: &mut Buffer<impl Pool>, count: usize) -> Result<usize>;

	/// Reads all bytes from the source into the buffer.
	fn read_all(&mut self, sink: &mut Buffer<impl Pool>) -> Result<usize> {
		let mut total = 0;
		loop {
			let read = self.read(sink, SEGMENT_SIZE)?;
			if read == 0 { return Ok(total) }
			total += read;
		}
	}

	/// Closes the source. All default streams close automatically when
	/// dropped. Closing is idempotent.
	fn close_source(&mut self) -> Result { Ok(()) }
}

pub trait SourceBuffer: Source + Sized {
	/// Wraps the source in a buffered source.
	fn buffer(self) -> BufferedSource<Self> { buffer_source(self) }
}

impl<S: Source> SourceBuffer for S { }

/// A data sink: the raw writer contract. Transports implement this.
pub trait Sink {
	/// Writes `count` bytes from the buffer into the sink.
	fn write(&mut self, source: &mut Buffer<impl Pool>, count: usize) -> Result<usize>;

	/// Writes all bytes from the buffer into the sink.
	fn write_all(&mut self, source: &mut Buffer<impl Pool>) -> Result<usize> {
		let count = source.count();
		self.write(source, count)
	}

	/// Writes all buffered data to its final target.
	fn flush(&mut self) -> Result { Ok(()) }

	/// Flushes and closes the sink. All default streams close automatically
	/// when dropped. Closing is idempotent.
	fn close_sink(&mut self) -> Result { self.flush() }
}

pub trait SinkBuffer: Sink + Sized {
	/// Wraps the sink in a buffered sink.
	fn buffer(self) -> BufferedSink<Self> { buffer_sink(self) }
}

impl<S: Sink> SinkBuffer for S { }

/// A stream holding an internal [`Buffer`].
pub trait BufStream {
	type Pool: Pool;
	fn buf(&self) -> &Buffer<Self::Pool>;
	fn buf_mut(&mut self) -> &mut Buffer<Self::Pool>;
}

macro_rules! gen_int_reads {
	($($be_name:ident$($le_name:ident)?->$ty:ident,)+) => {
		$(gen_int_reads! { $be_name$($le_name)?->$ty })+
	};
	($be_name:ident$le_name:ident->$ty:ident) => {
		gen_int_reads! { $be_name->$ty "big-endian " }
		gen_int_reads! { $le_name->$ty "little-endian " }
	};
	($name:ident->$ty:ident$($endian:literal)?) => {
		#[doc = concat!(" Reads one ",$($endian,)?"[`",stringify!($ty),"`] from the source.")]
		fn $name(&mut self) -> Result<$ty> {
			self.require(mem::size_of::<$ty>())?;
			self.buf_mut().$name()
		}
	}
}

/// A buffered, typed data source: the reader side of the pipeline.
pub trait BufSource: BufStream + Source {
	/// Reads up to `byte_count` bytes into the buffer, returning whether the
	/// requested count is available. To raise an end-of-input error instead,
	/// use [`require`](Self::require).
	fn request(&mut self, byte_count: usize) -> Result<bool>;

	/// Reads at least `byte_count` bytes into the buffer, raising an
	/// end-of-input error if not successful.
	fn require(&mut self, byte_count: usize) -> Result {
		if self.request(byte_count)? {
			Ok(())
		} else {
			Err(Error::eos(BufRead))
		}
	}

	/// Returns `true` if no more bytes can be read.
	fn exhausted(&mut self) -> Result<bool> {
		Ok(!self.request(1)?)
	}

	fn read_all(&mut self, sink: &mut impl Sink) -> Result<usize>;

	gen_int_reads! {
		read_i8 -> i8,
		read_u8 -> u8,
		read_i16 read_i16_le -> i16,
		read_u16 read_u16_le -> u16,
		read_i32 read_i32_le -> i32,
		read_u32 read_u32_le -> u32,
		read_i64 read_i64_le -> i64,
		read_u64 read_u64_le -> u64,
	}

	/// Reads exactly `byte_count` bytes into a [`ByteString`].
	fn read_byte_str(&mut self, byte_count: usize) -> Result<ByteString> {
		self.require(byte_count)?;
		self.buf_mut().read_byte_str(byte_count)
	}

	/// Removes up to `byte_count` bytes from the source, returning the number
	/// of bytes skipped.
	fn skip(&mut self, mut byte_count: usize) -> Result<usize> {
		let mut n = 0;
		while byte_count > 0 && self.request(calc_read_count(byte_count, self.buf()))? {
			let skipped = self.buf_mut().skip(byte_count)?;
			if skipped == 0 { break }
			n += skipped;
			byte_count -= skipped;
		}
		Ok(n)
	}

	/// Reads bytes into a slice, returning the number of bytes read.
	fn read_into_slice(&mut self, mut dst: &mut [u8]) -> Result<usize> {
		let mut n = 0;
		while !dst.is_empty() && self.request(calc_read_count(dst.len(), self.buf()))? {
			let read = self.buf_mut().read_into_slice(dst)?;
			if read == 0 { break }
			n += read;
			dst = &mut dst[read..];
		}
		Ok(n)
	}

	/// Reads the exact length of bytes into a slice, raising an end-of-input
	/// error if the slice could not be filled.
	fn read_into_slice_exact(&mut self, dst: &mut [u8]) -> Result {
		self.require(dst.len())?;
		self.buf_mut().read_into_slice_exact(dst)
	}

	fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
		let mut array = [0; N];
		self.read_into_slice_exact(&mut array)?;
		Ok(array)
	}

	/// Reads exactly `byte_count` bytes, decoding them as UTF-8.
	fn read_utf8(&mut self, byte_count: usize) -> Result<String> {
		self.require(byte_count)?;
		self.buf_mut().read_utf8(byte_count)
	}

	/// Reads all remaining bytes, decoding them into `str` as UTF-8. Returns
	/// the number of bytes read.
	fn read_all_utf8(&mut self, str: &mut String) -> Result<usize> {
		while self.request(self.buf().count() + SEGMENT_SIZE)? { }
		let count = self.buf().count();
		let tail = self.buf_mut().read_utf8(count)?;
		str.push_str(&tail);
		Ok(count)
	}

	/// Reads UTF-8 text into `str` until a line terminator, returning whether
	/// the terminator was encountered. The terminator, either LF or CRLF, is
	/// consumed but not written to the string.
	fn read_utf8_line(&mut self, str: &mut String) -> Result<bool> {
		let mut searched = 0;
		loop {
			let buffered = self.buf().count();
			if let Some(term) = self.buf().index_of(b'\n', searched, buffered) {
				let mut len = term;
				let mut term_len = 1;
				if term > 0 && self.buf().get(term - 1) == Some(b'\r') {
					len -= 1;
					term_len += 1;
				}

				let line = self.buf_mut().read_utf8(len)?;
				str.push_str(&line);
				self.buf_mut().skip(term_len)?;
				return Ok(true)
			}

			searched = buffered;
			if !self.request(buffered + 1)? {
				// No line terminator found, read to end instead.
				self.read_all_utf8(str)?;
				return Ok(false)
			}
		}
	}

	/// Reads a signed decimal number, stopping at the first byte that is not
	/// a digit. Fails with an end-of-input error on an empty source and a
	/// protocol-shaped error when no digit is present or the number overflows
	/// an [`i64`].
	fn read_decimal_long(&mut self) -> Result<i64> {
		self.require(1)?;
		let negative = self.buf().get(0) == Some(b'-');
		let start = usize::from(negative);

		// Accumulate negated to cover i64::MIN.
		let mut value = 0i64;
		let mut pos = start;
		loop {
			if !self.request(pos + 1)? { break }
			match self.buf().get(pos) {
				Some(digit @ b'0'..=b'9') => {
					value = value
						.checked_mul(10)
						.and_then(|v| v.checked_sub(i64::from(digit - b'0')))
						.ok_or(Error::new(BufRead, ErrorKind::Other("decimal overflows i64"), None))?;
					pos += 1;
				}
				_ => break,
			}
		}

		if pos == start {
			return Err(Error::new(BufRead, ErrorKind::Other("expected a decimal digit"), None))
		}

		self.buf_mut().skip(pos)?;
		if negative {
			Ok(value)
		} else {
			value.checked_neg()
				 .ok_or(Error::new(BufRead, ErrorKind::Other("decimal overflows i64"), None))
		}
	}

	/// Reads an unsigned hexadecimal number, stopping at the first byte that
	/// is not a hex digit.
	fn read_hexadecimal_unsigned_long(&mut self) -> Result<u64> {
		self.require(1)?;
		let mut value = 0u64;
		let mut pos = 0;
		loop {
			if !self.request(pos + 1)? { break }
			let digit = match self.buf().get(pos) {
				Some(b @ b'0'..=b'9') => b - b'0',
				Some(b @ b'a'..=b'f') => b - b'a' + 10,
				Some(b @ b'A'..=b'F') => b - b'A' + 10,
				_ => break,
			};
			value = value
				.checked_mul(16)
				.and_then(|v| v.checked_add(u64::from(digit)))
				.ok_or(Error::new(BufRead, ErrorKind::Other("hexadecimal overflows u64"), None))?;
			pos += 1;
		}

		if pos == 0 {
			return Err(Error::new(BufRead, ErrorKind::Other("expected a hex digit"), None))
		}

		self.buf_mut().skip(pos)?;
		Ok(value)
	}
}

pub(crate) fn calc_read_count(byte_count: usize, buf: &Buffer<impl Pool>) -> usize {
	min(byte_count, SEGMENT_SIZE.saturating_sub(buf.count()).max(1))
}

macro_rules! gen_int_writes {
	($($be_name:ident$($le_name:ident)?->$ty:ident,)+) => {
		$(gen_int_writes! { $be_name$($le_name)?->$ty })+
	};
	($be_name:ident$le_name:ident->$ty:ident) => {
		gen_int_writes! { $be_name->$ty "big-endian " }
		gen_int_writes! { $le_name->$ty "little-endian " }
	};
	($name:ident->$ty:ident$($endian:literal)?) => {
		#[doc = concat!(" Writes one ",$($endian,)?"[`",stringify!($ty),"`] to the sink.")]
		fn $name(&mut self, value: $ty) -> Result {
			self.buf_mut().$name(value)?;
			self.emit_complete_segments()
		}
	}
}

/// A buffered, typed data sink: the writer side of the pipeline.
pub trait BufSink: BufStream + Sink {
	fn write_all(&mut self, source: &mut impl Source) -> Result<usize>;

	/// Writes any buffered complete segments through to the underlying sink.
	/// A no-op for in-memory sinks; buffered wrappers use this as their
	/// high-water mark.
	fn emit_complete_segments(&mut self) -> Result { Ok(()) }

	gen_int_writes! {
		write_i8 -> i8,
		write_u8 -> u8,
		write_i16 write_i16_le -> i16,
		write_u16 write_u16_le -> u16,
		write_i32 write_i32_le -> i32,
		write_u32 write_u32_le -> u32,
		write_i64 write_i64_le -> i64,
		write_u64 write_u64_le -> u64,
	}

	fn write_byte_str(&mut self, value: &ByteString) -> Result {
		self.write_from_slice(value.as_slice())
	}

	fn write_from_slice(&mut self, value: &[u8]) -> Result {
		self.buf_mut().write_from_slice(value)?;
		self.emit_complete_segments()
	}

	fn write_utf8(&mut self, value: &str) -> Result {
		self.write_from_slice(value.as_bytes())
	}

	/// Writes a signed decimal number as text.
	fn write_decimal_long(&mut self, value: i64) -> Result {
		self.write_utf8(&value.to_string())
	}
}

// Impls

impl Source for &[u8] {
	fn read(&mut self, sink: &mut Buffer<impl Pool>, mut count: usize) -> Result<usize> {
		count = min(count, self.len());
		sink.write_from_slice(&self[..count])
			.map_err(Error::with_op_buf_read)?;
		*self = &self[count..];
		Ok(count)
	}
}

/// An error attaching the absolute offset of invalid UTF-8 within a read.
#[derive(Copy, Clone, Debug)]
pub struct OffsetUtf8Error {
	inner: Utf8Error,
	offset: usize,
}

impl OffsetUtf8Error {
	pub(crate) fn new(inner: Utf8Error, offset: usize) -> Self {
		Self { inner, offset }
	}

	pub fn into_inner(self) -> Utf8Error { self.inner }

	pub fn valid_up_to(&self) -> usize {
		self.offset + self.inner.valid_up_to()
	}

	pub fn error_len(&self) -> Option<usize> {
		self.inner.error_len()
	}
}

impl Display for OffsetUtf8Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		if let Some(error_len) = self.error_len() {
			write!(
				f,
				"invalid utf-8 sequence of {error_len} bytes from index {}",
				self.valid_up_to()
			)
		} else {
			write!(
				f,
				"incomplete utf-8 byte sequence from index {}",
				self.valid_up_to()
			)
		}
	}
}

impl StdError for OffsetUtf8Error {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		Some(&self.inner)
	}
}
