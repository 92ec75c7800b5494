// SPDX-License-Identifier: Apache-2.0

//! The process-wide segment pool. Segments released by buffers are collected
//! into per-thread buckets and handed back out on the next claim, avoiding
//! repeated allocation of segment blocks. Buckets are keyed by a hash of the
//! calling thread's id, so claim/recycle traffic from one thread stays on one
//! lock; a recycle is visible to another thread only when their bucket ids
//! collide.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use once_cell::sync::Lazy;
use crate::segment::{Segment, Segments, SIZE};

/// The number of thread buckets in the shared pool.
const BUCKET_COUNT: usize = 8;
/// The byte cap per bucket. Recycles past the cap are discarded.
const BUCKET_BYTE_CAP: usize = 64 * 1024;
const BUCKET_SEGMENT_CAP: usize = BUCKET_BYTE_CAP / SIZE;

#[derive(Copy, Clone, Debug, thiserror::Error)]
#[error("could not lock the segment pool, mutex was poisoned")]
pub struct PoolError;

impl<T> From<PoisonError<T>> for PoolError {
	fn from(_: PoisonError<T>) -> Self { Self }
}

pub trait Pool {
	/// Claims a single segment, reset and ready for writing.
	fn claim_one(&self) -> Result<Segment, PoolError>;

	/// Claims segments into the container until at least `min_size` bytes can
	/// be written.
	fn claim_size(&self, segments: &mut Segments, min_size: usize) -> Result<(), PoolError> {
		while segments.limit() < min_size {
			let seg = self.claim_one()?;
			segments.extend_empty([seg]);
		}
		Ok(())
	}

	/// Recycles a single segment back into the pool. Shared segments are
	/// discarded; only a segment owning its block may be reused.
	fn recycle_one(&self, segment: Segment) -> Result<(), PoolError>;

	/// Recycles many segments back into the pool.
	fn recycle(&self, segments: impl IntoIterator<Item = Segment>) -> Result<(), PoolError> {
		for seg in segments {
			self.recycle_one(seg)?;
		}
		Ok(())
	}
}

/// A cloneable handle to the process-wide [`BucketPool`].
#[derive(Copy, Clone, Debug, Default)]
pub struct SharedPool;

/// Clones a handle to the process-wide segment pool.
pub fn pool() -> SharedPool { SharedPool }

impl Pool for SharedPool {
	fn claim_one(&self) -> Result<Segment, PoolError> {
		POOL.claim_one()
	}

	fn recycle_one(&self, segment: Segment) -> Result<(), PoolError> {
		POOL.recycle_one(segment)
	}
}

static POOL: Lazy<BucketPool> = Lazy::new(BucketPool::new);

type Block = Arc<[u8; SIZE]>;

/// The shared pool storage: one LIFO stack of segment blocks per bucket, each
/// capped at [`BUCKET_BYTE_CAP`] bytes.
pub struct BucketPool {
	buckets: Vec<Mutex<Vec<Block>>>,
}

impl BucketPool {
	fn new() -> Self {
		Self {
			buckets: (0..BUCKET_COUNT).map(|_| Mutex::new(Vec::new())).collect(),
		}
	}

	fn bucket(&self) -> &Mutex<Vec<Block>> {
		let mut hasher = DefaultHasher::new();
		thread::current().id().hash(&mut hasher);
		&self.buckets[hasher.finish() as usize % BUCKET_COUNT]
	}

	fn claim_one(&self) -> Result<Segment, PoolError> {
		let block = self.bucket().lock()?.pop();
		Ok(match block {
			Some(block) => Segment::from_block(block),
			None => Segment::empty(),
		})
	}

	fn recycle_one(&self, mut segment: Segment) -> Result<(), PoolError> {
		segment.clear();
		let Some(block) = segment.into_block() else {
			// Shared block; the other holders keep it alive.
			return Ok(())
		};

		let mut bucket = self.bucket().lock()?;
		if bucket.len() < BUCKET_SEGMENT_CAP {
			bucket.push(block);
		} else {
			log::trace!("segment pool bucket full, discarding block");
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::{BucketPool, BUCKET_SEGMENT_CAP};
	use crate::segment::Segment;

	#[test]
	fn same_thread_reuses_lifo() {
		let pool = BucketPool::new();
		let mut seg = pool.claim_one().unwrap();
		seg.push_slice(b"marker");
		let base = seg.data().as_ptr() as usize - seg.pos();

		pool.recycle_one(seg).unwrap();
		let seg = pool.claim_one().unwrap();
		assert_eq!(seg.len(), 0, "claimed segment should be reset");
		assert_eq!(
			seg.data().as_ptr() as usize, base,
			"same thread should get the same block back"
		);
	}

	#[test]
	fn shared_segments_are_discarded() {
		let pool = BucketPool::new();
		let mut seg = pool.claim_one().unwrap();
		seg.push_slice(b"x");
		let keep = seg.share_all();
		let ptr = keep.data().as_ptr();

		pool.recycle_one(seg).unwrap();
		let seg = pool.claim_one().unwrap();
		// The bucket stayed empty: the shared block was discarded, so the new
		// claim allocates a fresh block.
		assert_ne!(seg.data().as_ptr() as usize, ptr as usize - keep.pos());
		drop(keep);
	}

	#[test]
	fn cap_bounds_bucket_growth() {
		let pool = BucketPool::new();
		let segs: Vec<Segment> = (0..BUCKET_SEGMENT_CAP * 2)
			.map(|_| pool.claim_one().unwrap())
			.collect();
		for seg in segs {
			pool.recycle_one(seg).unwrap();
		}

		let held = pool.bucket().lock().unwrap().len();
		assert!(held <= BUCKET_SEGMENT_CAP, "bucket should be capped, held {held}");
	}
}
