// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use simdutf8::compat::from_utf8;
use crate::ByteString;
use crate::der::{Error, ProtocolError, Result};
use crate::streams::BufSource;

/// The `server_name` extension's `host_name` name type.
pub const NAME_TYPE_HOST_NAME: u8 = 0;

const CONTENT_TYPE_HANDSHAKE: u8 = 22;
const HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 1;
const EXTENSION_SERVER_NAME: u16 = 0;

/// One name carried by the `server_name` extension.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServerName {
	/// Name type 0: a DNS hostname.
	HostName(String),
	/// Any other name type, kept verbatim.
	Opaque(ByteString),
}

/// Parses a TLS ClientHello record bit-exactly, returning the names of its
/// `server_name` extension keyed by name type; an empty map when the hello
/// carries no extensions or no SNI.
///
/// Pass a peeked reader (see [`BufferedSource::peek`]) so the bytes replay to
/// the handshake that follows routing:
///
/// ```no_run
/// # use rayo::streams::{SourceBuffer, Result};
/// # use rayo::tls::parse_client_hello;
/// # fn route(transport: impl rayo::streams::Source) -> Result {
/// let mut reader = transport.buffer();
/// let names = parse_client_hello(&mut reader.peek().buffer()).unwrap();
/// // ... choose a certificate by `names`, then hand `reader` to the
/// // handshake; it sees the ClientHello from its first byte.
/// # Ok(())
/// # }
/// ```
///
/// [`BufferedSource::peek`]: crate::BufferedSource::peek
pub fn parse_client_hello(
	source: &mut impl BufSource
) -> Result<BTreeMap<u8, ServerName>> {
	let content_type = read_u8(source)?;
	if content_type != CONTENT_TYPE_HANDSHAKE {
		return Err(error("expected a TLS handshake record"))
	}

	skip(source, 2)?; // legacy record version
	let record_length = usize::from(read_u16(source)?);

	let handshake_type = read_u8(source)?;
	if handshake_type != HANDSHAKE_TYPE_CLIENT_HELLO {
		return Err(error("expected a ClientHello"))
	}

	let handshake_length = read_u24(source)? as usize;
	if handshake_length + 4 > record_length {
		return Err(error("handshake length exceeds the record"))
	}

	let mut body = Bounded {
		source,
		remaining: handshake_length,
	};

	body.skip(2)?; // client version
	body.skip(32)?; // random
	let session_id_length = usize::from(body.u8()?);
	body.skip(session_id_length)?;
	let cipher_suites_length = usize::from(body.u16()?);
	body.skip(cipher_suites_length)?;
	let compression_length = usize::from(body.u8()?);
	body.skip(compression_length)?;

	let mut names = BTreeMap::new();
	if body.remaining == 0 {
		return Ok(names)
	}

	let extensions_length = usize::from(body.u16()?);
	if extensions_length != body.remaining {
		return Err(error("extensions length disagrees with the handshake"))
	}

	while body.remaining > 0 {
		let extension_type = body.u16()?;
		let extension_length = usize::from(body.u16()?);

		if extension_type == EXTENSION_SERVER_NAME {
			parse_server_names(&mut body, extension_length, &mut names)?;
		} else {
			body.skip(extension_length)?;
		}
	}

	Ok(names)
}

fn parse_server_names(
	body: &mut Bounded<'_, impl BufSource>,
	extension_length: usize,
	names: &mut BTreeMap<u8, ServerName>
) -> Result {
	let list_length = usize::from(body.u16()?);
	if list_length + 2 != extension_length {
		return Err(error("server name list length disagrees with the extension"))
	}

	let mut consumed = 0;
	while consumed < list_length {
		let name_type = body.u8()?;
		let name_length = usize::from(body.u16()?);
		let name = body.bytes(name_length)?;
		consumed += 3 + name_length;

		let name = if name_type == NAME_TYPE_HOST_NAME {
			if name.is_empty() {
				return Err(error("zero-length host name"))
			}
			match from_utf8(&name) {
				Ok(host) => ServerName::HostName(host.to_string()),
				Err(_) => return Err(error("host name is not valid UTF-8")),
			}
		} else {
			ServerName::Opaque(name.into())
		};

		if names.insert(name_type, name).is_some() {
			return Err(error("duplicated server name type"))
		}
	}

	if consumed != list_length {
		return Err(error("server name list overruns its length"))
	}
	Ok(())
}

fn error(message: &str) -> Error {
	ProtocolError::new(message.to_string(), vec!["clientHello"]).into()
}

fn map_stream(err: crate::streams::Error) -> Error {
	if err.is_eos() {
		error("truncated ClientHello")
	} else {
		err.into()
	}
}

fn read_u8(source: &mut impl BufSource) -> Result<u8> {
	source.read_u8().map_err(map_stream)
}

fn read_u16(source: &mut impl BufSource) -> Result<u16> {
	source.read_u16().map_err(map_stream)
}

fn read_u24(source: &mut impl BufSource) -> Result<u32> {
	let high = read_u8(source)?;
	let low = read_u16(source)?;
	Ok(u32::from(high) << 16 | u32::from(low))
}

fn skip(source: &mut impl BufSource, count: usize) -> Result {
	source.require(count).map_err(map_stream)?;
	source.skip(count).map_err(map_stream)?;
	Ok(())
}

/// Byte-budgeted reads over the handshake body; running past the declared
/// handshake length is a protocol error.
struct Bounded<'s, S: BufSource> {
	source: &'s mut S,
	remaining: usize,
}

impl<S: BufSource> Bounded<'_, S> {
	fn charge(&mut self, count: usize) -> Result {
		if count > self.remaining {
			return Err(error("truncated ClientHello"))
		}
		self.remaining -= count;
		Ok(())
	}

	fn u8(&mut self) -> Result<u8> {
		self.charge(1)?;
		read_u8(self.source)
	}

	fn u16(&mut self) -> Result<u16> {
		self.charge(2)?;
		read_u16(self.source)
	}

	fn bytes(&mut self, count: usize) -> Result<Vec<u8>> {
		self.charge(count)?;
		let mut bytes = vec![0; count];
		self.source
			.read_into_slice_exact(&mut bytes)
			.map_err(map_stream)?;
		Ok(bytes)
	}

	fn skip(&mut self, count: usize) -> Result {
		self.charge(count)?;
		skip(self.source, count)
	}
}
