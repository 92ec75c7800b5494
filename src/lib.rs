// SPDX-License-Identifier: Apache-2.0

//! ## How it works
//!
//! Data is written to and read from reusable chunks of memory called *segments*.
//! When a segment is consumed, it's returned to a *pool*. To write data, segments
//! are claimed from this pool. The pool is process-wide and partitioned into
//! buckets keyed by the calling thread, so claims and recycles rarely contend.
//!
//! ### Segments
//!
//! Segments are fixed-size chunks of memory arranged in a ring buffer. Memory
//! within segments can either be owned by or shared between segments, avoiding
//! expensive mem-copy operations as much as possible. Shared memory is
//! copy-on-write; it can be read through any number of segments but is never
//! written through a share. Small amounts of data under a set threshold are
//! copied rather than shared, as a tradeoff between allocation and throughput.
//!
//! [`Buffer`] chains segments into a contiguous byte sequence. Moving data
//! between buffers relinks whole segments instead of copying, and cloning a
//! buffer shares its segment storage. Buffered [`streams`] wrap raw byte
//! sources and sinks with typed reads and writes over an internal buffer.
//!
//! ### Timeouts
//!
//! Every blocking stream operation runs inside the ambient [`CancelScope`],
//! and is armed with an [`AsyncTimeout`] registration. A single lazily-started
//! watchdog thread cancels operations whose deadline expires; cancellation is
//! observed at the next blocking call.
//!
//! ### DER and TLS
//!
//! The [`der`] module is a strict Distinguished Encoding Rules codec built
//! from composable adapters, used by [`tls`] to encode and decode X.509
//! certificates and PKCS#8 keys, and to route inbound TLS connections by the
//! ClientHello `server_name` extension before the handshake runs.

mod buffer;
mod buffered_wrappers;
mod byte_str;
pub mod der;
pub mod pool;
mod segment;
mod std_io;
pub mod streams;
mod timeout;
pub mod tls;

pub use buffer::*;
pub use buffered_wrappers::*;
pub use byte_str::*;
pub use segment::{Segment, SIZE as SEGMENT_SIZE};
pub use std_io::*;
pub use timeout::*;
