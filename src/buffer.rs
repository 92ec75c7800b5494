// SPDX-License-Identifier: Apache-2.0

mod options;
mod read;
mod write;

use std::cmp::min;
use std::fmt;
use std::fmt::{Debug, Formatter};
use crate::ByteString;
use crate::pool::{pool, Pool, SharedPool};
use crate::segment::{Segment, Segments};
use crate::streams::{BufSink, Error, OperationKind, Result, Sink};

pub use options::BufferOptions;

/// A segmented byte buffer: an ordered chain of pool-claimed segments behaving
/// as one contiguous byte sequence. A buffer reads from its front and writes
/// to its back, and acts as both a [`Source`](crate::streams::Source) and a
/// [`Sink`](crate::streams::Sink) for in-memory data.
///
/// Moving data between buffers relinks whole segments instead of copying
/// their bytes; [`clone`](Clone::clone) shares segment storage copy-on-write.
/// A buffer is single-owner and not thread-safe, but may be sent between
/// threads.
pub struct Buffer<P: Pool = SharedPool> {
	pool: P,
	segments: Segments,
	options: BufferOptions,
	closed: bool,
}

impl Default for Buffer {
	fn default() -> Self { Self::new(pool()) }
}

impl<P: Pool + Clone> Clone for Buffer<P> {
	/// Clones the buffer, sharing segment storage with the clone instead of
	/// copying bytes. Reads and writes on either buffer are not observed by
	/// the other.
	fn clone(&self) -> Self {
		let mut segments = Segments::new();
		for seg in self.segments.iter() {
			segments.push(seg.share_all());
		}

		Self {
			pool: self.pool.clone(),
			segments,
			options: self.options,
			closed: self.closed,
		}
	}
}

impl Buffer {
	/// Creates a buffer containing a copy of `value`.
	pub fn from_slice(value: &[u8]) -> Result<Self> {
		let mut buf = Self::default();
		buf.write_from_slice(value)?;
		Ok(buf)
	}

	/// Creates a buffer containing `value` encoded as UTF-8.
	pub fn from_utf8_str(value: &str) -> Result<Self> {
		Self::from_slice(value.as_bytes())
	}
}

impl<P: Pool> Buffer<P> {
	pub fn new(pool: P) -> Self {
		Self::with_options(pool, BufferOptions::default())
	}

	pub fn with_options(pool: P, options: BufferOptions) -> Self {
		Self {
			pool,
			segments: Segments::new(),
			options,
			closed: false,
		}
	}

	/// Returns the number of bytes contained in the buffer.
	pub fn count(&self) -> usize { self.segments.count() }

	/// Returns `true` if the buffer contains no bytes.
	pub fn is_empty(&self) -> bool { self.segments.is_empty() }

	/// Recycles all segments, leaving the buffer empty.
	pub fn clear(&mut self) -> Result {
		self.segments
			.clear(&self.pool)
			.map_err(|err| Error::pool(err).with_op_buf_clear())
	}

	/// Clears and closes the buffer. Closing is idempotent; operations other
	/// than close on a closed buffer fail.
	pub fn close(&mut self) -> Result {
		if self.closed { return Ok(()) }
		self.closed = true;
		self.clear()
	}

	/// Coalesces partial segments to reduce the buffer's footprint.
	pub fn compact(&mut self) -> Result {
		self.segments.compact(false);
		self.tidy().map_err(Error::with_op_buf_compact)
	}

	/// Returns the byte at `pos`, or `None` if `pos` is out of bounds.
	pub fn get(&self, mut pos: usize) -> Option<u8> {
		for seg in self.segments.iter() {
			if pos < seg.len() {
				return Some(seg.data()[pos])
			}
			pos -= seg.len();
		}
		None
	}

	/// Scans for `byte` in positions `from..to`, stopping at the first match
	/// or the end of the range.
	pub fn index_of(&self, byte: u8, from: usize, to: usize) -> Option<usize> {
		let to = min(to, self.count());
		if from >= to { return None }

		let mut offset = 0;
		for seg in self.segments.iter() {
			let len = seg.len();
			if offset + len > from {
				let start = from.saturating_sub(offset);
				let end = min(len, to - offset);
				if let Some(found) = seg.data()[start..end].iter().position(|&b| b == byte) {
					return Some(offset + start + found)
				}
			}

			offset += len;
			if offset >= to { break }
		}
		None
	}

	/// Returns an immutable snapshot of the first `byte_count` bytes (or the
	/// whole buffer, whichever is shorter) without consuming them.
	pub fn snapshot(&self, byte_count: usize) -> ByteString {
		let mut bytes = Vec::with_capacity(min(byte_count, self.count()));
		self.peek_into(&mut bytes, 0, byte_count);
		bytes.into()
	}

	/// Copies (without consuming) `byte_count` bytes starting at `offset`
	/// into `sink`. Whole overlapped segments are shared rather than copied.
	pub fn copy_to(
		&self,
		sink: &mut Buffer<impl Pool>,
		mut offset: usize,
		mut byte_count: usize
	) -> Result {
		if offset + byte_count > self.count() {
			return Err(Error::eos(OperationKind::BufCopy))
		}

		for seg in self.segments.iter() {
			if byte_count == 0 { break }
			let len = seg.len();
			if offset >= len {
				offset -= len;
				continue
			}

			let take = min(len - offset, byte_count);
			if offset == 0 && take == len {
				// Segment-aligned: link a share instead of copying.
				sink.segments.push(seg.share_all());
			} else {
				sink.write_from_slice(&seg.data()[offset..offset + take])
					.map_err(Error::with_op_buf_copy)?;
			}

			offset = 0;
			byte_count -= take;
		}
		Ok(())
	}

	/// Moves all bytes from `source` into this buffer. Segment-aligned
	/// portions are relinked, not copied.
	pub fn transfer_from(&mut self, source: &mut Buffer<impl Pool>) -> Result<usize> {
		let count = source.count();
		source.move_bytes(self, count)
	}

	/// Moves all bytes into `sink`.
	pub fn transfer_to(&mut self, sink: &mut impl Sink) -> Result<usize> {
		sink.write_all(self)
	}

	/// Moves up to `byte_count` bytes from the front of this buffer into
	/// `sink`. Whole segments are relinked; a partial head smaller than the
	/// share threshold is copied, larger ones are split into shared segments
	/// over the same backing block.
	pub(crate) fn move_bytes(
		&mut self,
		sink: &mut Buffer<impl Pool>,
		mut byte_count: usize
	) -> Result<usize> {
		byte_count = min(byte_count, self.count());
		let moved = byte_count;

		while byte_count > 0 {
			let mut head = self.segments
							   .pop_front()
							   .expect("count tracks laden segments");

			if head.len() > byte_count {
				let result = if byte_count < self.options.share_threshold {
					sink.write_from_slice(&head.data()[..byte_count])
				} else {
					sink.segments.push(head.share(byte_count));
					Ok(())
				};
				match result {
					Ok(()) => head.consume(byte_count),
					Err(error) => {
						self.segments.push_front(head);
						return Err(error)
					}
				}
				self.segments.push_front(head);
				byte_count = 0;
			} else {
				byte_count -= head.len();
				sink.push_moved(head);
			}
		}

		if moved > 0 {
			sink.maybe_compact();
		}
		Ok(moved)
	}

	/// Links a moved segment into the chain, absorbing small tails into the
	/// current writable segment when they fit.
	fn push_moved(&mut self, mut seg: Segment) {
		if seg.len() < self.options.share_threshold {
			if let Some(mut tail) = self.segments.pop_writable() {
				if tail.limit() >= seg.len() && !tail.is_shared() {
					tail.fill_from(&mut seg, usize::MAX);
					self.segments.push(tail);
					let _ = self.pool.recycle_one(seg);
					return
				}
				self.segments.push(tail);
			}
		}
		self.segments.push(seg);
	}

	/// Compacts when accumulated fragmentation passes the configured
	/// threshold. Invoked on append paths; best-effort. The tail's free
	/// space is writable headroom, not fragmentation, so it doesn't count.
	fn maybe_compact(&mut self) {
		let laden = self.segments.iter().count();
		if laden < 2 { return }

		let fragmentation: usize = self.segments
			.iter()
			.take(laden - 1)
			.map(|seg| crate::SEGMENT_SIZE - seg.len())
			.sum();
		if fragmentation >= self.options.compact_threshold.max(1) {
			self.segments.compact(false);
		}
	}

	/// Copies up to `byte_count` bytes starting at `offset` into `dst`
	/// without consuming them.
	pub(crate) fn peek_into(&self, dst: &mut Vec<u8>, mut offset: usize, mut byte_count: usize) {
		for seg in self.segments.iter() {
			if byte_count == 0 { break }
			let len = seg.len();
			if offset >= len {
				offset -= len;
				continue
			}

			let take = min(len - offset, byte_count);
			dst.extend_from_slice(&seg.data()[offset..offset + take]);
			offset = 0;
			byte_count -= take;
		}
	}

	/// Recycles drained segments. Every public operation leaves the chain
	/// free of zero-length segments.
	pub(crate) fn tidy(&mut self) -> Result {
		self.segments
			.trim(&self.pool)
			.map_err(Error::pool)
	}

	pub(crate) fn check_open(&self, op: OperationKind) -> Result {
		if self.closed {
			Err(Error::closed(op))
		} else {
			Ok(())
		}
	}
}

impl<P: Pool> Drop for Buffer<P> {
	fn drop(&mut self) {
		let _ = self.close();
	}
}

impl<P: Pool> Debug for Buffer<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Buffer")
		 .field("count", &self.count())
		 .finish_non_exhaustive()
	}
}
