// SPDX-License-Identifier: Apache-2.0

use num_bigint::BigInt;
use crate::{Buffer, ByteString};
use crate::streams::BufSource;
use super::{
	adapters, DerReader, DerWriter, Error, Header, ProtocolError, Result,
	TAG_CLASS_UNIVERSAL, TAG_SEQUENCE,
};

/// A BIT STRING: content bytes plus the count of unused trailing bits.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BitString {
	pub bytes: ByteString,
	pub unused_bits: u8,
}

/// A value captured verbatim because no codec claimed it. Re-encodes
/// byte-exactly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownValue {
	pub tag_class: u8,
	pub tag: u64,
	pub constructed: bool,
	pub bytes: ByteString,
}

/// The dynamic value model the [`Codec`] algebra decodes into and encodes
/// from. Typed records convert to and from this model at the [`Adapter`]
/// boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
	/// The absence of an optional value with no DEFAULT. Distinct from
	/// [`Null`](Self::Null), which is an encoded ASN.1 NULL.
	Absent,
	Null,
	Boolean(bool),
	Long(i64),
	BigInt(BigInt),
	BitString(BitString),
	Octets(ByteString),
	Utf8(String),
	ObjectId(String),
	/// An instant in epoch milliseconds.
	Time(i64),
	List(Vec<Value>),
	/// A CHOICE alternative, remembering which alternative matched so the
	/// value re-encodes through the same codec.
	Choice { index: usize, value: Box<Value> },
	Unknown(UnknownValue),
}

impl Value {
	fn mismatch(what: &'static str) -> Error {
		ProtocolError::new(format!("expected {what}"), Vec::new()).into()
	}

	pub fn into_boolean(self) -> Result<bool> {
		match self {
			Self::Boolean(value) => Ok(value),
			_ => Err(Self::mismatch("a boolean")),
		}
	}

	pub fn into_long(self) -> Result<i64> {
		match self {
			Self::Long(value) => Ok(value),
			_ => Err(Self::mismatch("an integer")),
		}
	}

	pub fn into_big_integer(self) -> Result<BigInt> {
		match self {
			Self::BigInt(value) => Ok(value),
			_ => Err(Self::mismatch("a big integer")),
		}
	}

	pub fn into_bit_string(self) -> Result<BitString> {
		match self {
			Self::BitString(value) => Ok(value),
			_ => Err(Self::mismatch("a bit string")),
		}
	}

	pub fn into_octets(self) -> Result<ByteString> {
		match self {
			Self::Octets(value) => Ok(value),
			_ => Err(Self::mismatch("an octet string")),
		}
	}

	pub fn into_utf8(self) -> Result<String> {
		match self {
			Self::Utf8(value) => Ok(value),
			_ => Err(Self::mismatch("a string")),
		}
	}

	pub fn into_object_id(self) -> Result<String> {
		match self {
			Self::ObjectId(value) => Ok(value),
			_ => Err(Self::mismatch("an object identifier")),
		}
	}

	pub fn into_time(self) -> Result<i64> {
		match self {
			Self::Time(value) => Ok(value),
			_ => Err(Self::mismatch("a timestamp")),
		}
	}

	pub fn into_list(self) -> Result<Vec<Value>> {
		match self {
			Self::List(values) => Ok(values),
			_ => Err(Self::mismatch("a sequence")),
		}
	}

	pub fn into_choice(self) -> Result<(usize, Value)> {
		match self {
			Self::Choice { index, value } => Ok((index, *value)),
			_ => Err(Self::mismatch("a choice")),
		}
	}
}

/// The primitive codecs: how one header-delimited body maps to a [`Value`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BasicKind {
	Boolean,
	Long,
	BigInt,
	BitString,
	OctetString,
	Utf8,
	Printable,
	Ia5,
	Null,
	ObjectIdentifier,
	UtcTime,
	GeneralizedTime,
}

impl BasicKind {
	fn decode<S: BufSource>(self, r: &mut DerReader<S>, header: &Header) -> Result<Value> {
		Ok(match self {
			Self::Boolean => Value::Boolean(r.read_boolean(header)?),
			Self::Long => Value::Long(r.read_long(header)?),
			Self::BigInt => Value::BigInt(r.read_big_integer(header)?),
			Self::BitString => Value::BitString(r.read_bit_string(header)?),
			Self::OctetString => Value::Octets(r.read_octet_string(header)?.into()),
			Self::Utf8 => Value::Utf8(r.read_utf8(header)?),
			Self::Printable => {
				let text = r.read_utf8(header)?;
				if !text.bytes().all(is_printable_char) {
					return Err(r.error("character outside the PrintableString set"))
				}
				Value::Utf8(text)
			}
			Self::Ia5 => {
				let text = r.read_utf8(header)?;
				if !text.is_ascii() {
					return Err(r.error("character outside the IA5String set"))
				}
				Value::Utf8(text)
			}
			Self::Null => {
				r.read_null(header)?;
				Value::Null
			}
			Self::ObjectIdentifier => Value::ObjectId(r.read_object_identifier(header)?),
			Self::UtcTime => {
				let text = r.read_utf8(header)?;
				let millis = adapters::parse_utc_time(&text)
					.ok_or_else(|| r.error(format!("cannot parse UTCTime {text:?}")))?;
				Value::Time(millis)
			}
			Self::GeneralizedTime => {
				let text = r.read_utf8(header)?;
				let millis = adapters::parse_generalized_time(&text)
					.ok_or_else(|| r.error(format!("cannot parse GeneralizedTime {text:?}")))?;
				Value::Time(millis)
			}
		})
	}

	fn encode(self, w: &mut DerWriter, value: &Value) -> Result {
		match (self, value) {
			(Self::Boolean, Value::Boolean(v)) => w.write_boolean(*v),
			(Self::Long, Value::Long(v)) => w.write_long(*v),
			(Self::BigInt, Value::BigInt(v)) => w.write_big_integer(v),
			(Self::BitString, Value::BitString(v)) => w.write_bit_string(v),
			(Self::OctetString, Value::Octets(v)) => w.write_octet_string(v.as_slice()),
			(Self::Utf8, Value::Utf8(v)) => w.write_utf8(v),
			(Self::Printable, Value::Utf8(v)) => {
				if !v.bytes().all(is_printable_char) {
					return Err(w.error("character outside the PrintableString set"))
				}
				w.write_utf8(v)
			}
			(Self::Ia5, Value::Utf8(v)) => {
				if !v.is_ascii() {
					return Err(w.error("character outside the IA5String set"))
				}
				w.write_utf8(v)
			}
			(Self::Null, Value::Null) => Ok(()),
			(Self::ObjectIdentifier, Value::ObjectId(v)) => w.write_object_identifier(v),
			(Self::UtcTime, Value::Time(millis)) => {
				let text = adapters::format_utc_time(*millis)
					.ok_or_else(|| w.error("timestamp outside the UTCTime range"))?;
				w.write_utf8(&text)
			}
			(Self::GeneralizedTime, Value::Time(millis)) => {
				let text = adapters::format_generalized_time(*millis)
					.ok_or_else(|| w.error("timestamp outside the GeneralizedTime range"))?;
				w.write_utf8(&text)
			}
			_ => Err(w.error("value does not match the codec")),
		}
	}

	fn accepts(self, value: &Value) -> bool {
		matches!(
			(self, value),
			(Self::Boolean, Value::Boolean(_))
				| (Self::Long, Value::Long(_))
				| (Self::BigInt, Value::BigInt(_))
				| (Self::BitString, Value::BitString(_))
				| (Self::OctetString, Value::Octets(_))
				| (Self::Utf8 | Self::Printable | Self::Ia5, Value::Utf8(_))
				| (Self::Null, Value::Null)
				| (Self::ObjectIdentifier, Value::ObjectId(_))
				| (Self::UtcTime | Self::GeneralizedTime, Value::Time(_))
		)
	}
}

fn is_printable_char(byte: u8) -> bool {
	matches!(byte,
		b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9'
		| b' ' | b'\'' | b'(' | b')' | b'+' | b',' | b'-' | b'.' | b'/'
		| b':' | b'=' | b'?')
}

/// The closed codec algebra. Adapters compose by wrapping codecs; dispatch is
/// a `match` over this enum.
#[derive(Clone, Debug)]
pub enum Codec {
	/// A primitive with an expected tag.
	Basic {
		name: &'static str,
		tag_class: u8,
		tag: u64,
		kind: BasicKind,
	},
	/// A SEQUENCE with declared members, decoded in order.
	Sequence {
		name: &'static str,
		members: Vec<Codec>,
	},
	/// SEQUENCE OF / SET OF: homogeneous children until the enclosing length
	/// is exhausted. `sorted` enforces DER's canonical SET OF element order.
	SequenceOf {
		name: &'static str,
		tag_class: u8,
		tag: u64,
		sorted: bool,
		member: Box<Codec>,
	},
	/// The first alternative whose `matches` accepts the header wins.
	Choice {
		choices: Vec<Codec>,
		/// When set, values pass through unwrapped and the selector picks the
		/// encoding alternative; otherwise values carry their alternative as
		/// [`Value::Choice`].
		select: Option<fn(&Value) -> usize>,
	},
	/// Runtime polymorphism: decode by peeked header, encode by value shape,
	/// falling back to capturing/emitting [`Value::Unknown`] verbatim.
	Any {
		choices: Vec<Codec>,
	},
	/// IMPLICIT tagging: replaces the inner codec's expected tag.
	ImplicitTag {
		tag_class: u8,
		tag: u64,
		inner: Box<Codec>,
	},
	/// EXPLICIT tagging: wraps the inner value in an outer element. The
	/// override forces the outer element's constructed bit (an OCTET STRING
	/// box around DER content stays primitive).
	ExplicitBox {
		name: &'static str,
		tag_class: u8,
		tag: u64,
		constructed_override: Option<bool>,
		inner: Box<Codec>,
	},
	/// Absent on decode yields `default`; a value equal to `default` is
	/// omitted on encode.
	Optional {
		inner: Box<Codec>,
		default: Box<Value>,
	},
	/// Publishes the decoded/encoded value as the enclosing SEQUENCE's type
	/// hint.
	TypeHint {
		inner: Box<Codec>,
	},
	/// Defers to the codec the chooser derives from the published hint; an
	/// unknown hint falls back to opaque octets.
	UsingHint {
		name: &'static str,
		chooser: fn(&Value) -> Option<Codec>,
	},
}

impl Codec {
	pub fn sequence(name: &'static str, members: Vec<Codec>) -> Self {
		Self::Sequence { name, members }
	}

	pub fn choice(choices: Vec<Codec>) -> Self {
		Self::Choice { choices, select: None }
	}

	pub fn choice_selected(choices: Vec<Codec>, select: fn(&Value) -> usize) -> Self {
		Self::Choice { choices, select: Some(select) }
	}

	pub fn any(choices: Vec<Codec>) -> Self {
		Self::Any { choices }
	}

	pub fn using_type_hint(name: &'static str, chooser: fn(&Value) -> Option<Codec>) -> Self {
		Self::UsingHint { name, chooser }
	}

	/// IMPLICIT tagging: replaces the expected tag.
	pub fn with_tag(self, tag_class: u8, tag: u64) -> Self {
		Self::ImplicitTag { tag_class, tag, inner: self.into() }
	}

	/// EXPLICIT tagging: wraps the value in an outer element. Pass
	/// `Some(false)` as the override to force a primitive outer element
	/// whose body was produced by nested writes.
	pub fn with_explicit_box(
		self,
		name: &'static str,
		tag_class: u8,
		tag: u64,
		constructed_override: Option<bool>
	) -> Self {
		Self::ExplicitBox {
			name,
			tag_class,
			tag,
			constructed_override,
			inner: self.into(),
		}
	}

	pub fn optional(self, default: Value) -> Self {
		Self::Optional { inner: self.into(), default: default.into() }
	}

	pub fn as_sequence_of(self, name: &'static str) -> Self {
		Self::SequenceOf {
			name,
			tag_class: TAG_CLASS_UNIVERSAL,
			tag: TAG_SEQUENCE,
			sorted: false,
			member: self.into(),
		}
	}

	pub fn as_set_of(self, name: &'static str) -> Self {
		Self::SequenceOf {
			name,
			tag_class: TAG_CLASS_UNIVERSAL,
			tag: super::TAG_SET,
			sorted: true,
			member: self.into(),
		}
	}

	pub fn as_type_hint(self) -> Self {
		Self::TypeHint { inner: self.into() }
	}

	/// Wraps the codec with a typed conversion pair.
	pub fn adapter<T>(
		self,
		decode: fn(Value) -> Result<T>,
		encode: fn(&T) -> Value
	) -> Adapter<T> {
		Adapter { codec: self, decode, encode }
	}

	/// Returns `true` if this codec can decode a value with `header`. Used
	/// for optional-member and choice discrimination.
	pub fn matches(&self, header: &Header) -> bool {
		match self {
			Self::Basic { tag_class, tag, .. } => header.is(*tag_class, *tag),
			Self::Sequence { .. } => header.is(TAG_CLASS_UNIVERSAL, TAG_SEQUENCE),
			Self::SequenceOf { tag_class, tag, .. } => header.is(*tag_class, *tag),
			Self::Choice { choices, .. } => choices.iter().any(|c| c.matches(header)),
			Self::Any { .. } => true,
			Self::ImplicitTag { tag_class, tag, .. } => header.is(*tag_class, *tag),
			Self::ExplicitBox { tag_class, tag, .. } => header.is(*tag_class, *tag),
			Self::Optional { inner, .. } => inner.matches(header),
			Self::TypeHint { inner } => inner.matches(header),
			Self::UsingHint { .. } => true,
		}
	}

	/// Returns `true` if this codec can encode `value`. Used for [`Any`]
	/// discrimination by runtime shape.
	///
	/// [`Any`]: Self::Any
	pub fn accepts(&self, value: &Value) -> bool {
		match self {
			Self::Basic { kind, .. } => kind.accepts(value),
			Self::Sequence { .. } | Self::SequenceOf { .. } => {
				matches!(value, Value::List(_))
			}
			Self::Choice { choices, select } => match select {
				Some(_) => choices.iter().any(|c| c.accepts(value)),
				None => matches!(value, Value::Choice { .. }),
			},
			Self::Any { .. } | Self::UsingHint { .. } => true,
			Self::ImplicitTag { inner, .. }
			| Self::ExplicitBox { inner, .. }
			| Self::Optional { inner, .. }
			| Self::TypeHint { inner } => inner.accepts(value),
		}
	}

	pub fn decode<S: BufSource>(&self, r: &mut DerReader<S>) -> Result<Value> {
		self.decode_at(r, None)
	}

	pub fn encode(&self, w: &mut DerWriter, value: &Value) -> Result {
		self.encode_at(w, value, None)
	}

	fn decode_at<S: BufSource>(
		&self,
		r: &mut DerReader<S>,
		expected: Option<(u8, u64)>
	) -> Result<Value> {
		match self {
			Self::Basic { name, tag_class, tag, kind } => {
				let (class, tag) = expected.unwrap_or((*tag_class, *tag));
				r.read(*name, |r, header| {
					if !header.is(class, tag) {
						return Err(r.error("unexpected tag"))
					}
					kind.decode(r, header)
				})
			}

			Self::Sequence { name, members } => {
				let (class, tag) = expected.unwrap_or((TAG_CLASS_UNIVERSAL, TAG_SEQUENCE));
				r.read(*name, |r, header| {
					if !header.is(class, tag) {
						return Err(r.error("unexpected tag"))
					}
					if !header.constructed {
						return Err(r.error("sequence must be constructed"))
					}

					r.push_hint_frame();
					let result = Self::decode_members(members, r);
					r.pop_hint_frame();
					result.map(Value::List)
				})
			}

			Self::SequenceOf { name, tag_class, tag, sorted, member } => {
				let (class, tag) = expected.unwrap_or((*tag_class, *tag));
				r.read(*name, |r, header| {
					if !header.is(class, tag) {
						return Err(r.error("unexpected tag"))
					}
					if !header.constructed {
						return Err(r.error("collection must be constructed"))
					}

					let mut items = Vec::new();
					let mut previous: Option<ByteString> = None;
					while r.peek_header()?.is_some() {
						let item = member.decode_at(r, None)?;
						if *sorted {
							let encoded = encode_value(member, &item)?;
							if previous.as_ref().is_some_and(|p| *p > encoded) {
								return Err(r.error("set elements not in canonical order"))
							}
							previous = Some(encoded);
						}
						items.push(item);
					}
					Ok(Value::List(items))
				})
			}

			Self::Choice { choices, select } => {
				let Some(header) = r.peek_header()? else {
					return Err(r.error("expected a value"))
				};
				let Some(index) = choices.iter().position(|c| c.matches(&header)) else {
					return Err(r.error("no choice alternative matches"))
				};

				let value = choices[index].decode_at(r, None)?;
				if select.is_some() {
					Ok(value)
				} else {
					Ok(Value::Choice { index, value: value.into() })
				}
			}

			Self::Any { choices } => {
				let Some(header) = r.peek_header()? else {
					return Err(r.error("expected a value"))
				};
				match choices.iter().find(|c| c.matches(&header)) {
					Some(codec) => codec.decode_at(r, None),
					None => r.read("ANY", |r, header| {
						Ok(Value::Unknown(r.read_unknown(header)?))
					}),
				}
			}

			Self::ImplicitTag { tag_class, tag, inner } => {
				inner.decode_at(r, Some(expected.unwrap_or((*tag_class, *tag))))
			}

			Self::ExplicitBox { name, tag_class, tag, inner, .. } => {
				let (class, tag) = expected.unwrap_or((*tag_class, *tag));
				r.read(*name, |r, header| {
					if !header.is(class, tag) {
						return Err(r.error("unexpected tag"))
					}
					inner.decode_at(r, None)
				})
			}

			Self::Optional { inner, default } => {
				let matched = match r.peek_header()? {
					Some(header) => inner.matches(&header),
					None => false,
				};
				if matched {
					inner.decode_at(r, expected)
				} else {
					Ok((**default).clone())
				}
			}

			Self::TypeHint { inner } => {
				let value = inner.decode_at(r, expected)?;
				r.set_hint(value.clone());
				Ok(value)
			}

			Self::UsingHint { name: _, chooser } => {
				let chosen = r.hint().and_then(|hint| chooser(hint));
				match chosen {
					Some(codec) => codec.decode_at(r, None),
					None => Ok(Value::Octets(r.read_rest()?.into())),
				}
			}
		}
	}

	fn decode_members<S: BufSource>(
		members: &[Codec],
		r: &mut DerReader<S>
	) -> Result<Vec<Value>> {
		let mut values = Vec::with_capacity(members.len());
		for member in members {
			values.push(member.decode_at(r, None)?);
		}
		Ok(values)
	}

	fn encode_at(
		&self,
		w: &mut DerWriter,
		value: &Value,
		expected: Option<(u8, u64)>
	) -> Result {
		match self {
			Self::Basic { name, tag_class, tag, kind } => {
				let (class, tag) = expected.unwrap_or((*tag_class, *tag));
				w.write(*name, class, tag, |w| kind.encode(w, value))
			}

			Self::Sequence { name, members } => {
				let (class, tag) = expected.unwrap_or((TAG_CLASS_UNIVERSAL, TAG_SEQUENCE));
				let Value::List(values) = value else {
					return Err(w.error("expected a sequence value"))
				};
				if values.len() != members.len() {
					return Err(w.error("wrong number of sequence members"))
				}

				w.write_element(*name, class, tag, Some(true), |w| {
					w.push_hint_frame();
					let result = Self::encode_members(members, values, w);
					w.pop_hint_frame();
					result
				})
			}

			Self::SequenceOf { name, tag_class, tag, sorted, member } => {
				let (class, tag) = expected.unwrap_or((*tag_class, *tag));
				let Value::List(items) = value else {
					return Err(w.error("expected a collection value"))
				};

				w.write_element(*name, class, tag, Some(true), |w| {
					if *sorted {
						let mut encoded = Vec::with_capacity(items.len());
						for item in items {
							encoded.push(encode_value(member, item)?);
						}
						encoded.sort();
						for bytes in &encoded {
							w.write_raw(bytes.as_slice())?;
						}
						Ok(())
					} else {
						for item in items {
							member.encode_at(w, item, None)?;
						}
						Ok(())
					}
				})
			}

			Self::Choice { choices, select } => match select {
				Some(select) => {
					let index = select(value);
					let Some(codec) = choices.get(index) else {
						return Err(w.error("choice selector out of range"))
					};
					codec.encode_at(w, value, expected)
				}
				None => {
					let Value::Choice { index, value } = value else {
						return Err(w.error("expected a choice value"))
					};
					let Some(codec) = choices.get(*index) else {
						return Err(w.error("choice alternative out of range"))
					};
					codec.encode_at(w, value, expected)
				}
			},

			Self::Any { choices } => match value {
				Value::Unknown(unknown) => w.write_element(
					"ANY",
					unknown.tag_class,
					unknown.tag,
					Some(unknown.constructed),
					|w| w.write_raw(unknown.bytes.as_slice()),
				),
				_ => match choices.iter().find(|c| c.accepts(value)) {
					Some(codec) => codec.encode_at(w, value, expected),
					None => Err(w.error("no codec accepts the value")),
				},
			},

			Self::ImplicitTag { tag_class, tag, inner } => {
				inner.encode_at(w, value, Some(expected.unwrap_or((*tag_class, *tag))))
			}

			Self::ExplicitBox { name, tag_class, tag, constructed_override, inner } => {
				let (class, tag) = expected.unwrap_or((*tag_class, *tag));
				w.write_element(*name, class, tag, *constructed_override, |w| {
					inner.encode_at(w, value, None)
				})
			}

			Self::Optional { inner, default } => {
				if value == &**default {
					return Ok(())
				}
				inner.encode_at(w, value, expected)
			}

			Self::TypeHint { inner } => {
				w.set_hint(value.clone());
				inner.encode_at(w, value, expected)
			}

			Self::UsingHint { name: _, chooser } => {
				let chosen = w.hint().and_then(|hint| chooser(hint));
				match chosen {
					Some(codec) => codec.encode_at(w, value, None),
					None => match value {
						Value::Octets(bytes) => w.write_raw(bytes.as_slice()),
						_ => Err(w.error("expected opaque octets for an unknown hint")),
					},
				}
			}
		}
	}

	fn encode_members(
		members: &[Codec],
		values: &[Value],
		w: &mut DerWriter
	) -> Result {
		for (member, value) in members.iter().zip(values) {
			if let Self::Optional { default, .. } = member {
				if value == &**default {
					continue
				}
			}
			member.encode_at(w, value, None)?;
		}
		Ok(())
	}
}

/// Encodes one value through `codec` into standalone bytes. Used to order
/// SET OF elements canonically.
fn encode_value(codec: &Codec, value: &Value) -> Result<ByteString> {
	let mut writer = DerWriter::new();
	codec.encode(&mut writer, value)?;
	writer.finish()
}

/// A typed facade over a [`Codec`]: the codec tree plus the conversion pair
/// between the dynamic [`Value`] model and `T`.
pub struct Adapter<T> {
	codec: Codec,
	decode: fn(Value) -> Result<T>,
	encode: fn(&T) -> Value,
}

impl<T> Adapter<T> {
	pub fn new(codec: Codec, decode: fn(Value) -> Result<T>, encode: fn(&T) -> Value) -> Self {
		Self { codec, decode, encode }
	}

	pub fn codec(&self) -> &Codec { &self.codec }

	pub fn into_codec(self) -> Codec { self.codec }

	/// Converts a value to [`Value`] through this adapter's conversion.
	pub fn to_value(&self, value: &T) -> Value {
		(self.encode)(value)
	}

	/// Converts a [`Value`] to `T` through this adapter's conversion.
	pub fn from_value(&self, value: Value) -> Result<T> {
		(self.decode)(value)
	}

	/// Decodes a value from DER bytes. Trailing bytes are a protocol error.
	pub fn from_der(&self, input: impl AsRef<[u8]>) -> Result<T> {
		let buffer = Buffer::from_slice(input.as_ref()).map_err(Error::from)?;
		let mut reader = DerReader::new(buffer);
		let value = self.codec.decode(&mut reader)?;
		if !reader.exhausted()? {
			return Err(reader.error("unexpected trailing bytes"))
		}
		self.from_value(value)
	}

	/// Encodes a value to DER bytes.
	pub fn to_der(&self, value: &T) -> Result<ByteString> {
		let mut writer = DerWriter::new();
		self.codec.encode(&mut writer, &self.to_value(value))?;
		writer.finish()
	}
}
