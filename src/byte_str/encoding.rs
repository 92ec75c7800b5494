// SPDX-License-Identifier: Apache-2.0

use base64::Engine;
use base64::prelude::{BASE64_STANDARD_NO_PAD, BASE64_URL_SAFE_NO_PAD};
use super::ByteString;

impl ByteString {
	/// Encodes the data into a base64 string.
	pub fn base64(&self) -> String {
		BASE64_STANDARD_NO_PAD.encode(&self.data)
	}

	/// Encodes the data into a URL-safe base64 string.
	pub fn base64_url(&self) -> String {
		BASE64_URL_SAFE_NO_PAD.encode(&self.data)
	}

	/// Encodes the data into a base64 string with a custom `encoder`.
	pub fn base64_with(&self, encoder: &impl Engine) -> String {
		encoder.encode(&self.data)
	}

	/// Encodes the data into a lowercase hex string.
	pub fn hex_lower(&self) -> String {
		base16ct::lower::encode_string(&self.data)
	}

	/// Encodes the data into an uppercase hex string.
	pub fn hex_upper(&self) -> String {
		base16ct::upper::encode_string(&self.data)
	}
}

#[cfg(test)]
mod test {
	use super::ByteString;

	#[test]
	fn encode() {
		let str = ByteString::from([0u8, 0, 0]);
		assert_eq!(str.base64(), "AAAA");
		assert_eq!(str.hex_lower(), "000000");
		assert_eq!(ByteString::from("Mo").base64(), "TW8");
	}
}
