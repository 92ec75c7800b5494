// SPDX-License-Identifier: Apache-2.0

use crate::SEGMENT_SIZE;

/// Options for tuning [`Buffer`](super::Buffer)'s behavior and performance.
///
/// # Share threshold
///
/// The minimum size for segment data to be shared rather than copied into
/// another segment. Defaults to half the segment size. With a value of more
/// than the segment size, segments are never shared.
///
/// Sharing is significantly faster than copying for large runs, O(1) vs O(n)
/// complexity, but fragments the receiving buffer into partial segments.
///
/// # Compact threshold
///
/// The total size of fragmentation (gaps where segments have been partially
/// read or written) that triggers compacting on append paths. Defaults to
/// half the segment size. With a value of `0`, the buffer always compacts.
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub struct BufferOptions {
	pub share_threshold: usize,
	pub compact_threshold: usize,
}

impl Default for BufferOptions {
	fn default() -> Self {
		Self {
			share_threshold: SEGMENT_SIZE / 2,
			compact_threshold: SEGMENT_SIZE / 2,
		}
	}
}

impl BufferOptions {
	/// Presets the options to create a "lean" buffer, a buffer that always
	/// shares and compacts.
	pub fn lean() -> Self {
		Self {
			share_threshold: 0,
			compact_threshold: 0,
		}
	}

	/// Sets the segment share threshold.
	pub fn set_share_threshold(mut self, value: usize) -> Self {
		self.share_threshold = value;
		self
	}

	/// Sets the fragmentation-compact threshold.
	pub fn set_compact_threshold(mut self, value: usize) -> Self {
		self.compact_threshold = value;
		self
	}
}
