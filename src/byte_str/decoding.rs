// SPDX-License-Identifier: Apache-2.0

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use super::ByteString;

/// Decodes standard-alphabet base64 with or without padding. URL-safe input
/// is translated to the standard alphabet before decoding.
static LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
	&alphabet::STANDARD,
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

impl ByteString {
	/// Decodes base64-encoded bytes to a new byte string, tolerating
	/// whitespace, missing padding, and the URL-safe alphabet. Returns `None`
	/// for input that cannot decode to a whole byte sequence.
	pub fn from_base64(input: &str) -> Option<Self> {
		let cleaned: Vec<u8> = input.bytes()
			.filter(|byte| !byte.is_ascii_whitespace())
			.map(|byte| match byte {
				b'-' => b'+',
				b'_' => b'/',
				byte => byte,
			})
			.collect();

		LENIENT_BASE64.decode(cleaned).ok().map(Into::into)
	}

	/// Decodes hex bytes to a new byte string. Odd-length input and non-hex
	/// characters are rejected.
	pub fn from_hex(input: &str) -> Result<Self, base16ct::Error> {
		base16ct::mixed::decode_vec(input).map(Into::into)
	}
}

#[cfg(test)]
mod test {
	use super::ByteString;

	#[test]
	fn base64_tolerates_whitespace() {
		let decoded = ByteString::from_base64(" AA A\r\nA ").unwrap();
		assert_eq!(decoded, [0u8, 0, 0]);
	}

	#[test]
	fn base64_tolerates_urlsafe_and_padding() {
		assert_eq!(ByteString::from_base64("TW8=").unwrap(), *b"Mo");
		assert_eq!(
			ByteString::from_base64("_-8").unwrap(),
			ByteString::from_base64("/+8").unwrap(),
		);
	}

	#[test]
	fn base64_rejects_partial_bytes() {
		assert_eq!(ByteString::from_base64("A"), None);
		assert_eq!(ByteString::from_base64("AA=A"), None);
	}

	#[test]
	fn hex_is_strict() {
		assert_eq!(ByteString::from_hex("0aFf").unwrap(), [0x0a, 0xff]);
		assert!(ByteString::from_hex("0a0").is_err(), "odd length should fail");
		assert!(ByteString::from_hex("zz").is_err(), "non-hex should fail");
	}
}
