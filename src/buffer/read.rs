// SPDX-License-Identifier: Apache-2.0

use std::cmp::min;
use std::io::Write;
use simdutf8::compat::from_utf8;
use crate::{Buffer, ByteString};
use crate::pool::Pool;
use crate::streams::{
	BufSource, BufStream, Error, OffsetUtf8Error, Result, Sink, Source,
};
use crate::streams::OperationKind::BufRead;

impl<P: Pool> Buffer<P> {
	/// Walks the front segments, passing each readable slice to `consume`
	/// until `max_count` bytes are offered or the consumer reads short.
	/// Drained segments are recycled.
	pub(crate) fn read_segments(
		&mut self,
		mut max_count: usize,
		mut consume: impl FnMut(&[u8]) -> Result<usize>,
	) -> Result<usize> {
		let mut count = 0;
		while max_count > 0 {
			let Some(mut seg) = self.segments.pop_front() else { break };
			let len = min(max_count, seg.len());
			let read = match consume(&seg.data()[..len]) {
				Ok(read) => read,
				Err(error) => {
					self.segments.push_front(seg);
					return Err(error)
				}
			};

			seg.consume(read);
			count += read;
			max_count -= read;

			if seg.is_empty() {
				self.pool.recycle_one(seg)?;
			} else {
				self.segments.push_front(seg);
			}

			if read < len { break }
		}
		Ok(count)
	}

	pub(crate) fn read_std<W: Write>(&mut self, writer: &mut W, count: usize) -> Result<usize> {
		self.read_segments(count, |seg| {
			writer.write(seg).map_err(|err| Error::io(BufRead, err))
		})
	}
}

impl<P: Pool> Source for Buffer<P> {
	fn read(&mut self, sink: &mut Buffer<impl Pool>, count: usize) -> Result<usize> {
		self.move_bytes(sink, count)
			.map_err(Error::with_op_buf_read)
	}

	fn read_all(&mut self, sink: &mut Buffer<impl Pool>) -> Result<usize> {
		let count = self.count();
		self.read(sink, count)
	}

	fn close_source(&mut self) -> Result { self.close() }
}

impl<P: Pool> BufStream for Buffer<P> {
	type Pool = P;
	fn buf(&self) -> &Self { self }
	fn buf_mut(&mut self) -> &mut Self { self }
}

macro_rules! gen_int_reads {
	($($s_name:ident$s_le_name:ident$s_ty:ident$u_name:ident$u_le_name:ident$u_ty:ident),+) => {
		$(
		fn $s_name(&mut self) -> Result<$s_ty> {
			self.$u_name().map(|n| n as $s_ty)
		}

		fn $s_le_name(&mut self) -> Result<$s_ty> {
			self.$u_le_name().map(|n| n as $s_ty)
		}

		fn $u_name(&mut self) -> Result<$u_ty> {
			Ok($u_ty::from_be_bytes(self.read_array()?))
		}

		fn $u_le_name(&mut self) -> Result<$u_ty> {
			Ok($u_ty::from_le_bytes(self.read_array()?))
		}
		)+
	};
}

impl<P: Pool> BufSource for Buffer<P> {
	fn request(&mut self, byte_count: usize) -> Result<bool> {
		Ok(self.count() >= byte_count)
	}

	fn read_all(&mut self, sink: &mut impl Sink) -> Result<usize> {
		sink.write_all(self)
			.map_err(Error::with_op_buf_read)
	}

	fn read_i8(&mut self) -> Result<i8> {
		self.read_u8().map(|n| n as i8)
	}

	fn read_u8(&mut self) -> Result<u8> {
		self.require(1)?;

		let mut byte = 0;
		self.read_segments(1, |seg| {
			byte = seg[0];
			Ok(1)
		})?;
		Ok(byte)
	}

	gen_int_reads! {
		read_i16 read_i16_le i16 read_u16 read_u16_le u16,
		read_i32 read_i32_le i32 read_u32 read_u32_le u32,
		read_i64 read_i64_le i64 read_u64 read_u64_le u64
	}

	fn read_byte_str(&mut self, byte_count: usize) -> Result<ByteString> {
		self.require(byte_count)?;

		let mut dst = Vec::with_capacity(byte_count);
		self.read_segments(byte_count, |seg| {
			dst.extend_from_slice(seg);
			Ok(seg.len())
		})?;
		Ok(dst.into())
	}

	fn skip(&mut self, byte_count: usize) -> Result<usize> {
		self.read_segments(byte_count, |seg| Ok(seg.len()))
	}

	fn read_into_slice(&mut self, dst: &mut [u8]) -> Result<usize> {
		let mut off = 0;
		self.read_segments(dst.len(), |seg| {
			dst[off..off + seg.len()].copy_from_slice(seg);
			off += seg.len();
			Ok(seg.len())
		})
	}

	fn read_into_slice_exact(&mut self, dst: &mut [u8]) -> Result {
		self.require(dst.len())?;
		let read = self.read_into_slice(dst)?;
		debug_assert_eq!(read, dst.len(), "exact slice length should have been read");
		Ok(())
	}

	fn read_utf8(&mut self, byte_count: usize) -> Result<String> {
		self.require(byte_count)?;

		// Validate before consuming so a decode failure leaves the bytes in
		// place.
		let mut bytes = Vec::with_capacity(byte_count);
		self.peek_into(&mut bytes, 0, byte_count);
		from_utf8(&bytes).map_err(|err|
			Error::invalid_utf8(BufRead, OffsetUtf8Error::new(err, 0))
		)?;

		self.skip(byte_count)?;
		// Safety: validated as UTF-8 just above.
		Ok(unsafe { String::from_utf8_unchecked(bytes) })
	}
}
