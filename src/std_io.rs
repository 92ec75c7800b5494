// SPDX-License-Identifier: Apache-2.0

//! Bridges between this crate's streams and `std::io`.

use std::io;
use std::io::{Read, Write};
use crate::Buffer;
use crate::pool::Pool;
use crate::streams::{BufSink, BufSource, Error, Result, Sink, Source};
use crate::streams::OperationKind::BufFlush;

/// Wraps a [`Read`] into a [`Source`].
pub struct ReadSource<R: Read>(R);

/// Wraps a [`Write`] into a [`Sink`].
pub struct WriteSink<W: Write>(W);

pub fn read_source<R: Read>(reader: R) -> ReadSource<R> {
	ReadSource(reader)
}

pub fn write_sink<W: Write>(writer: W) -> WriteSink<W> {
	WriteSink(writer)
}

impl<R: Read> ReadSource<R> {
	pub fn into_inner(self) -> R { self.0 }
}

impl<W: Write> WriteSink<W> {
	pub fn into_inner(self) -> W { self.0 }
}

impl<R: Read> Source for ReadSource<R> {
	fn read(&mut self, sink: &mut Buffer<impl Pool>, count: usize) -> Result<usize> {
		sink.write_std(&mut self.0, count)
			.map_err(Error::with_op_buf_read)
	}
}

impl<W: Write> Sink for WriteSink<W> {
	fn write(&mut self, source: &mut Buffer<impl Pool>, count: usize) -> Result<usize> {
		source.read_std(&mut self.0, count)
			  .map_err(Error::with_op_buf_write)
	}

	fn flush(&mut self) -> Result {
		self.0
			.flush()
			.map_err(|err| Error::io(BufFlush, err))
	}
}

/// A wrapper implementing the [`Read`] trait for a buffered source.
pub struct SourceReader<S: BufSource>(S);

impl<S: BufSource> From<S> for SourceReader<S> {
	fn from(value: S) -> Self { Self(value) }
}

impl<S: BufSource> SourceReader<S> {
	pub fn into_inner(self) -> S { self.0 }
}

impl<S: BufSource> Read for SourceReader<S> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let Self(source) = self;
		source.read_into_slice(buf)
			  .map_err(Error::into_io)
	}
}

/// A wrapper implementing the [`Write`] trait for a buffered sink.
pub struct SinkWriter<S: BufSink>(S);

impl<S: BufSink> From<S> for SinkWriter<S> {
	fn from(value: S) -> Self { Self(value) }
}

impl<S: BufSink> SinkWriter<S> {
	pub fn into_inner(self) -> S { self.0 }
}

impl<S: BufSink> Write for SinkWriter<S> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		let Self(sink) = self;
		sink.write_from_slice(buf)
			.map_err(Error::into_io)?;
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0
			.flush()
			.map_err(Error::into_io)
	}
}
