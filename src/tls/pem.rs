// SPDX-License-Identifier: Apache-2.0

use base64::prelude::BASE64_STANDARD;
use once_cell::sync::Lazy;
use regex::Regex;
use crate::ByteString;
use crate::der::ProtocolError;

static PEM_BLOCK: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"-----BEGIN ([A-Z ]+)-----([A-Za-z0-9+/=\s]*)-----END ([A-Z ]+)-----")
		.expect("the PEM pattern is well-formed")
});

/// One decoded PEM block: its label and DER payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PemBlock {
	pub label: String,
	pub der: ByteString,
}

/// Encodes DER bytes as a PEM block: base64 broken into 64-column lines
/// between BEGIN/END labels.
pub fn encode_pem(label: &str, der: &ByteString) -> String {
	let body = der.base64_with(&BASE64_STANDARD);
	let mut pem = format!("-----BEGIN {label}-----\n");
	for line in body.as_bytes().chunks(64) {
		// Chunks of a base64 string stay ASCII.
		pem.push_str(std::str::from_utf8(line).expect("base64 output is ASCII"));
		pem.push('\n');
	}
	pem.push_str(&format!("-----END {label}-----\n"));
	pem
}

/// Decodes every PEM block in `text`. Mismatched labels and undecodable
/// bodies are protocol errors.
pub fn decode_pem(text: &str) -> Result<Vec<PemBlock>, ProtocolError> {
	let mut blocks = Vec::new();
	for captures in PEM_BLOCK.captures_iter(text) {
		let begin = &captures[1];
		let end = &captures[3];
		if begin != end {
			return Err(ProtocolError::new(
				format!("mismatched PEM labels {begin:?} and {end:?}"),
				vec!["pem"],
			))
		}

		let der = ByteString::from_base64(&captures[2]).ok_or_else(|| {
			ProtocolError::new(format!("undecodable PEM body under {begin:?}"), vec!["pem"])
		})?;
		blocks.push(PemBlock {
			label: begin.to_string(),
			der,
		});
	}
	Ok(blocks)
}
