// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;
use std::io::Read;
use crate::Buffer;
use crate::pool::Pool;
use crate::streams::{BufSink, Error, Result, Sink, Source};
use crate::streams::OperationKind::BufWrite;

impl<P: Pool> Buffer<P> {
	/// Walks writable segments, passing each free slice to `write` until
	/// `count` bytes are offered or the producer writes short. Claims
	/// segments from the pool as needed; unused claims are recycled.
	pub(crate) fn write_segments(
		&mut self,
		mut count: usize,
		mut write: impl FnMut(&mut [u8]) -> Result<usize>,
	) -> Result<usize> {
		self.check_open(BufWrite)?;

		let mut written = 0;
		while count > 0 {
			let mut seg = match self.segments.pop_writable() {
				Some(seg) => seg,
				None => self.pool.claim_one().map_err(|err| Error::pool(err).with_op_buf_write())?,
			};

			let limit = min(count, seg.limit());
			let result = seg.write_with(|data| write(&mut data[..limit]));
			let n = match result {
				Ok(n) => n,
				Err(error) => {
					if seg.is_empty() {
						let _ = self.pool.recycle_one(seg);
					} else {
						self.segments.push(seg);
					}
					return Err(error)
				}
			};

			if seg.is_empty() {
				let _ = self.pool.recycle_one(seg);
			} else {
				self.segments.push(seg);
			}

			written += n;
			count -= n;
			if n == 0 { break }
		}

		self.tidy().map_err(Error::with_op_buf_write)?;
		Ok(written)
	}

	pub(crate) fn write_std<R: Read>(&mut self, reader: &mut R, count: usize) -> Result<usize> {
		self.write_segments(count, |seg| {
			reader.read(seg).map_err(|err| Error::io(BufWrite, err))
		})
	}
}

impl<P: Pool> Sink for Buffer<P> {
	fn write(&mut self, source: &mut Buffer<impl Pool>, count: usize) -> Result<usize> {
		source.move_bytes(self, count)
			  .map_err(Error::with_op_buf_write)
	}

	fn write_all(&mut self, source: &mut Buffer<impl Pool>) -> Result<usize> {
		let count = source.count();
		self.write(source, count)
	}

	fn close_sink(&mut self) -> Result { self.close() }
}

macro_rules! gen_int_writes {
	($($name:ident$le_name:ident$ty:ident),+) => {
		$(
		fn $name(&mut self, value: $ty) -> Result {
			self.write_from_slice(&value.to_be_bytes())
		}

		fn $le_name(&mut self, value: $ty) -> Result {
			self.write_from_slice(&value.to_le_bytes())
		}
		)+
	};
}

impl<P: Pool> BufSink for Buffer<P> {
	fn write_all(&mut self, source: &mut impl Source) -> Result<usize> {
		source.read_all(self)
			  .map_err(Error::with_op_buf_write)
	}

	fn write_i8(&mut self, value: i8) -> Result {
		self.write_u8(value as u8)
	}

	fn write_u8(&mut self, value: u8) -> Result {
		self.write_segments(1, |seg| {
			seg[0] = value;
			Ok(1)
		})?;
		Ok(())
	}

	gen_int_writes! {
		write_i16 write_i16_le i16,
		write_u16 write_u16_le u16,
		write_i32 write_i32_le i32,
		write_u32 write_u32_le u32,
		write_i64 write_i64_le i64,
		write_u64 write_u64_le u64
	}

	fn write_from_slice(&mut self, mut value: &[u8]) -> Result {
		while !value.is_empty() {
			self.write_segments(value.len(), |seg| {
				let n = min(seg.len(), value.len());
				seg[..n].copy_from_slice(&value[..n]);
				value = &value[n..];
				Ok(n)
			})?;
		}
		Ok(())
	}

	fn write_utf8(&mut self, value: &str) -> Result {
		self.write_from_slice(value.as_bytes())
	}
}
