// SPDX-License-Identifier: Apache-2.0

//! A strict Distinguished Encoding Rules (X.690) codec framework.
//!
//! The streaming layer is [`DerReader`] and [`DerWriter`]: tag/length-aware
//! cursors over a byte source or sink, carrying a human-readable path stack
//! for diagnostics. On top of it sits the [`Codec`] algebra, a closed set of
//! composable codecs (primitives, SEQUENCE, SET OF, CHOICE, tagging,
//! optionality, type hints), and the typed [`Adapter`] facade exposing
//! [`to_der`](Adapter::to_der)/[`from_der`](Adapter::from_der).
//!
//! Only DER is implemented: indefinite lengths, non-shortest length forms and
//! other BER freedoms are rejected as protocol errors.

mod adapter;
pub mod adapters;
mod reader;
mod writer;

use std::result;
use crate::streams;

pub use adapter::*;
pub use reader::DerReader;
pub use writer::DerWriter;

pub const TAG_CLASS_UNIVERSAL: u8 = 0x00;
pub const TAG_CLASS_APPLICATION: u8 = 0x40;
pub const TAG_CLASS_CONTEXT: u8 = 0x80;
pub const TAG_CLASS_PRIVATE: u8 = 0xC0;

pub const TAG_BOOLEAN: u64 = 1;
pub const TAG_INTEGER: u64 = 2;
pub const TAG_BIT_STRING: u64 = 3;
pub const TAG_OCTET_STRING: u64 = 4;
pub const TAG_NULL: u64 = 5;
pub const TAG_OBJECT_IDENTIFIER: u64 = 6;
pub const TAG_UTF8_STRING: u64 = 12;
pub const TAG_SEQUENCE: u64 = 16;
pub const TAG_SET: u64 = 17;
pub const TAG_PRINTABLE_STRING: u64 = 19;
pub const TAG_IA5_STRING: u64 = 22;
pub const TAG_UTC_TIME: u64 = 23;
pub const TAG_GENERALIZED_TIME: u64 = 24;

pub type Result<T = ()> = result::Result<T, Error>;

/// A structural failure: malformed or non-canonical DER, an unexpected tag,
/// or a length inconsistency. Carries the path of named values leading to the
/// failure.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}{}", fmt_path(.path))]
pub struct ProtocolError {
	message: String,
	path: Vec<&'static str>,
}

fn fmt_path(path: &[&'static str]) -> String {
	if path.is_empty() {
		String::new()
	} else {
		format!(" (at {})", path.join(" / "))
	}
}

impl ProtocolError {
	pub fn new(message: impl Into<String>, path: Vec<&'static str>) -> Self {
		Self {
			message: message.into(),
			path,
		}
	}

	pub fn message(&self) -> &str { &self.message }

	/// The names of the enclosing values, outermost first.
	pub fn path(&self) -> &[&'static str] { &self.path }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	#[error(transparent)]
	Stream(#[from] streams::Error),
}

impl Error {
	/// Returns `true` for a structural (protocol) failure, as opposed to a
	/// transport one.
	pub fn is_protocol(&self) -> bool {
		matches!(self, Self::Protocol(_))
	}
}

/// A decoded tag-length header: `(tag_class, tag, constructed, length)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
	pub tag_class: u8,
	pub tag: u64,
	pub constructed: bool,
	pub length: u64,
}

impl Header {
	pub fn is(&self, tag_class: u8, tag: u64) -> bool {
		self.tag_class == tag_class && self.tag == tag
	}
}
