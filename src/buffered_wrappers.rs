// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;
use std::time::Duration;
use crate::{AsyncTimeout, Buffer, SEGMENT_SIZE};
use crate::pool::Pool;
use crate::streams::{
	BufSink, BufSource, BufStream, Error, Result, Sink, Source,
};
use crate::streams::OperationKind::{BufFlush, BufRead, BufWrite};
use crate::timeout::ambient_cancelled;

pub fn buffer_source<S: Source>(source: S) -> BufferedSource<S> {
	BufferedSource {
		buffer: Buffer::default(),
		source,
		timeout: AsyncTimeout::new(),
		default_timeout: Duration::ZERO,
		closed: false,
	}
}

pub fn buffer_sink<S: Sink>(sink: S) -> BufferedSink<S> {
	BufferedSink {
		buffer: Buffer::default(),
		sink,
		timeout: AsyncTimeout::new(),
		default_timeout: Duration::ZERO,
		closed: false,
	}
}

/// A buffered reader over a raw [`Source`]. Fills its internal buffer in
/// segment-sized reads; every fill is a suspension point, armed with the
/// reader's [`AsyncTimeout`] and failing with a cancellation error when the
/// ambient scope is cancelled or the watchdog fires mid-read.
pub struct BufferedSource<S: Source> {
	buffer: Buffer,
	source: S,
	timeout: AsyncTimeout,
	default_timeout: Duration,
	closed: bool,
}

impl<S: Source> BufferedSource<S> {
	/// Replaces the timeout arming fills, typically one carrying the
	/// transport's interrupt callback.
	pub fn set_timeout(&mut self, timeout: AsyncTimeout) {
		self.timeout = timeout;
	}

	/// Sets the default timeout applied to fills when the ambient scope has
	/// no deadline. Zero means no default.
	pub fn set_default_timeout(&mut self, default_timeout: Duration) {
		self.default_timeout = default_timeout;
	}

	/// Returns a non-consuming view of this source. Reading from the peek
	/// fills this source's buffer as needed but consumes nothing; a
	/// subsequent read sees the same bytes.
	pub fn peek(&mut self) -> Peek<'_, S> {
		Peek { source: self, offset: 0 }
	}

	/// Fills the buffer, rounding the request up to the nearest segment size.
	fn fill_buf(&mut self, byte_count: usize) -> Result<bool> {
		if ambient_cancelled() {
			return Err(Error::cancelled(BufRead))
		}

		let count = self.buffer.count();
		let seg_count = (count + byte_count + SEGMENT_SIZE - 1) / SEGMENT_SIZE;
		let byte_count = seg_count * SEGMENT_SIZE - count;

		let node = self.timeout.enter(self.default_timeout);
		let result = self.source.read(&mut self.buffer, byte_count);
		if node.exit() {
			return Err(Error::cancelled(BufRead))
		}

		let read = result.map_err(Error::with_op_buf_read)?;
		Ok(read > 0)
	}
}

impl<S: Source> Source for BufferedSource<S> {
	fn read(&mut self, sink: &mut Buffer<impl Pool>, byte_count: usize) -> Result<usize> {
		if self.closed { return Err(Error::closed(BufRead)) }

		if self.buffer.is_empty() && !self.fill_buf(byte_count)? {
			return Ok(0)
		}
		self.buffer.read(sink, byte_count)
	}

	fn close_source(&mut self) -> Result {
		if self.closed { return Ok(()) }
		self.closed = true;
		let buf_close = self.buffer.close();
		let src_close = self.source.close_source();
		buf_close?;
		src_close
	}
}

impl<S: Source> BufStream for BufferedSource<S> {
	type Pool = crate::pool::SharedPool;
	fn buf(&self) -> &Buffer { &self.buffer }
	fn buf_mut(&mut self) -> &mut Buffer { &mut self.buffer }
}

impl<S: Source> BufSource for BufferedSource<S> {
	fn request(&mut self, byte_count: usize) -> Result<bool> {
		if self.closed { return Ok(false) }

		while self.buffer.count() < byte_count {
			if !self.fill_buf(byte_count - self.buffer.count())? {
				return Ok(false)
			}
		}
		Ok(true)
	}

	fn read_all(&mut self, sink: &mut impl Sink) -> Result<usize> {
		let mut total = 0;
		loop {
			if self.buffer.is_empty() && !self.fill_buf(SEGMENT_SIZE)? {
				return Ok(total)
			}
			total += sink.write_all(&mut self.buffer)
						 .map_err(Error::with_op_buf_read)?;
		}
	}
}

impl<S: Source> Drop for BufferedSource<S> {
	fn drop(&mut self) {
		let _ = self.close_source();
	}
}

/// A [`Source`] view over a [`BufferedSource`] that consumes nothing from it.
/// Used to inspect a stream, e.g. a TLS ClientHello, before handing the same
/// bytes to the real consumer.
pub struct Peek<'s, S: Source> {
	source: &'s mut BufferedSource<S>,
	offset: usize,
}

impl<S: Source> Source for Peek<'_, S> {
	fn read(&mut self, sink: &mut Buffer<impl Pool>, byte_count: usize) -> Result<usize> {
		if !self.source.request(self.offset + 1)? {
			return Ok(0)
		}

		let available = self.source.buffer.count() - self.offset;
		let count = min(byte_count, available);
		self.source.buffer
			.copy_to(sink, self.offset, count)
			.map_err(Error::with_op_buf_read)?;
		self.offset += count;
		Ok(count)
	}
}

/// A buffered writer over a raw [`Sink`]. Typed writes batch into an internal
/// buffer; complete segments are emitted through to the sink as the buffer
/// passes the segment size, and `flush` drains it fully. A failed flush may
/// leave partial data in the underlying sink.
pub struct BufferedSink<S: Sink> {
	buffer: Buffer,
	sink: S,
	timeout: AsyncTimeout,
	default_timeout: Duration,
	closed: bool,
}

impl<S: Sink> BufferedSink<S> {
	/// Replaces the timeout arming writes to the underlying sink.
	pub fn set_timeout(&mut self, timeout: AsyncTimeout) {
		self.timeout = timeout;
	}

	/// Sets the default timeout applied to underlying writes when the
	/// ambient scope has no deadline. Zero means no default.
	pub fn set_default_timeout(&mut self, default_timeout: Duration) {
		self.default_timeout = default_timeout;
	}

	/// Writes `byte_count` buffered bytes through to the sink under the
	/// timeout guard.
	fn emit(&mut self, byte_count: usize) -> Result {
		if ambient_cancelled() {
			return Err(Error::cancelled(BufWrite))
		}

		let node = self.timeout.enter(self.default_timeout);
		let result = self.sink.write(&mut self.buffer, byte_count);
		if node.exit() {
			return Err(Error::cancelled(BufWrite))
		}

		result.map_err(Error::with_op_buf_flush)?;
		Ok(())
	}
}

impl<S: Sink> Sink for BufferedSink<S> {
	fn write(&mut self, source: &mut Buffer<impl Pool>, byte_count: usize) -> Result<usize> {
		if self.closed { return Err(Error::closed(BufWrite)) }

		let count = self.buffer.write(source, byte_count)?;
		self.emit_complete_segments()?;
		Ok(count)
	}

	fn flush(&mut self) -> Result {
		if self.closed {
			return Err(Error::closed(BufFlush))
		}

		let count = self.buffer.count();
		if count > 0 {
			self.emit(count)?;
		}

		if ambient_cancelled() {
			return Err(Error::cancelled(BufFlush))
		}
		let node = self.timeout.enter(self.default_timeout);
		let result = self.sink.flush();
		if node.exit() {
			return Err(Error::cancelled(BufFlush))
		}
		result.map_err(Error::with_op_buf_flush)
	}

	fn close_sink(&mut self) -> Result {
		if self.closed { return Ok(()) }

		let flush = self.flush();
		self.closed = true;
		let close = self.sink.close_sink();
		let clear = self.buffer.close();
		flush?;
		close?;
		clear
	}
}

impl<S: Sink> BufStream for BufferedSink<S> {
	type Pool = crate::pool::SharedPool;
	fn buf(&self) -> &Buffer { &self.buffer }
	fn buf_mut(&mut self) -> &mut Buffer { &mut self.buffer }
}

impl<S: Sink> BufSink for BufferedSink<S> {
	fn write_all(&mut self, source: &mut impl Source) -> Result<usize> {
		let count = source.read_all(&mut self.buffer)
						  .map_err(Error::with_op_buf_write)?;
		self.emit_complete_segments()?;
		Ok(count)
	}

	/// The high-water mark: buffered data past a whole segment is written
	/// through, keeping at most one partial segment buffered.
	fn emit_complete_segments(&mut self) -> Result {
		let count = self.buffer.count();
		let complete = count - count % SEGMENT_SIZE;
		if complete > 0 {
			self.emit(complete)?;
		}
		Ok(())
	}
}

impl<S: Sink> Drop for BufferedSink<S> {
	fn drop(&mut self) {
		let _ = self.close_sink();
	}
}
