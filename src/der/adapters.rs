// SPDX-License-Identifier: Apache-2.0

//! Named adapters for the universal ASN.1 types, and the time codecs.

use num_bigint::BigInt;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use crate::ByteString;
use super::{
	Adapter, BasicKind, BitString, Codec, Value,
	TAG_BIT_STRING, TAG_BOOLEAN, TAG_CLASS_UNIVERSAL, TAG_GENERALIZED_TIME,
	TAG_IA5_STRING, TAG_INTEGER, TAG_NULL, TAG_OBJECT_IDENTIFIER,
	TAG_OCTET_STRING, TAG_PRINTABLE_STRING, TAG_UTC_TIME, TAG_UTF8_STRING,
};

/// 1950-01-01T00:00:00Z, the inclusive lower bound of UTCTime.
pub const UTC_TIME_MIN: i64 = -631_152_000_000;
/// 2050-01-01T00:00:00Z, the exclusive upper bound of UTCTime.
pub const UTC_TIME_MAX: i64 = 2_524_608_000_000;

fn basic(name: &'static str, tag: u64, kind: BasicKind) -> Codec {
	Codec::Basic {
		name,
		tag_class: TAG_CLASS_UNIVERSAL,
		tag,
		kind,
	}
}

pub fn boolean() -> Adapter<bool> {
	basic("BOOLEAN", TAG_BOOLEAN, BasicKind::Boolean)
		.adapter(Value::into_boolean, |v| Value::Boolean(*v))
}

pub fn integer_as_long() -> Adapter<i64> {
	basic("INTEGER", TAG_INTEGER, BasicKind::Long)
		.adapter(Value::into_long, |v| Value::Long(*v))
}

pub fn integer_as_big_integer() -> Adapter<BigInt> {
	basic("INTEGER", TAG_INTEGER, BasicKind::BigInt)
		.adapter(Value::into_big_integer, |v| Value::BigInt(v.clone()))
}

pub fn bit_string() -> Adapter<BitString> {
	basic("BIT STRING", TAG_BIT_STRING, BasicKind::BitString)
		.adapter(Value::into_bit_string, |v| Value::BitString(v.clone()))
}

pub fn octet_string() -> Adapter<ByteString> {
	basic("OCTET STRING", TAG_OCTET_STRING, BasicKind::OctetString)
		.adapter(Value::into_octets, |v| Value::Octets(v.clone()))
}

pub fn null() -> Adapter<()> {
	basic("NULL", TAG_NULL, BasicKind::Null)
		.adapter(|_| Ok(()), |_| Value::Null)
}

pub fn object_identifier() -> Adapter<String> {
	basic("OBJECT IDENTIFIER", TAG_OBJECT_IDENTIFIER, BasicKind::ObjectIdentifier)
		.adapter(Value::into_object_id, |v| Value::ObjectId(v.clone()))
}

pub fn utf8_string() -> Adapter<String> {
	basic("UTF8String", TAG_UTF8_STRING, BasicKind::Utf8)
		.adapter(Value::into_utf8, |v| Value::Utf8(v.clone()))
}

pub fn printable_string() -> Adapter<String> {
	basic("PrintableString", TAG_PRINTABLE_STRING, BasicKind::Printable)
		.adapter(Value::into_utf8, |v| Value::Utf8(v.clone()))
}

pub fn ia5_string() -> Adapter<String> {
	basic("IA5String", TAG_IA5_STRING, BasicKind::Ia5)
		.adapter(Value::into_utf8, |v| Value::Utf8(v.clone()))
}

pub fn utc_time() -> Adapter<i64> {
	basic("UTCTime", TAG_UTC_TIME, BasicKind::UtcTime)
		.adapter(Value::into_time, |v| Value::Time(*v))
}

pub fn generalized_time() -> Adapter<i64> {
	basic("GeneralizedTime", TAG_GENERALIZED_TIME, BasicKind::GeneralizedTime)
		.adapter(Value::into_time, |v| Value::Time(*v))
}

/// ASN.1 `Time`: a choice of UTCTime and GeneralizedTime. Encoding picks
/// UTCTime iff the instant falls in [1950-01-01, 2050-01-01).
pub fn time() -> Adapter<i64> {
	time_codec().adapter(Value::into_time, |v| Value::Time(*v))
}

pub(crate) fn time_codec() -> Codec {
	Codec::choice_selected(
		vec![utc_time().into_codec(), generalized_time().into_codec()],
		select_time,
	)
}

fn select_time(value: &Value) -> usize {
	match value {
		Value::Time(millis) if (UTC_TIME_MIN..UTC_TIME_MAX).contains(millis) => 0,
		_ => 1,
	}
}

/// Accepts any single value, capturing unrecognized ones verbatim.
pub fn any_value() -> Adapter<Value> {
	Codec::any(Vec::new()).adapter(Ok, Value::clone)
}

// Time conversion. Only the 'Z' zone designator and whole seconds are
// accepted; everything else fails the parse.

pub(crate) fn parse_utc_time(text: &str) -> Option<i64> {
	let bytes = text.as_bytes();
	if bytes.len() != 13 || bytes[12] != b'Z' {
		return None
	}

	let yy = parse_pair(bytes, 0)?;
	let year = if yy >= 50 { 1900 + i32::from(yy) } else { 2000 + i32::from(yy) };
	timestamp_millis(
		year,
		parse_pair(bytes, 2)?,
		parse_pair(bytes, 4)?,
		parse_pair(bytes, 6)?,
		parse_pair(bytes, 8)?,
		parse_pair(bytes, 10)?,
	)
}

pub(crate) fn format_utc_time(millis: i64) -> Option<String> {
	if !(UTC_TIME_MIN..UTC_TIME_MAX).contains(&millis) {
		return None
	}

	let dt = datetime(millis)?;
	Some(format!(
		"{:02}{:02}{:02}{:02}{:02}{:02}Z",
		dt.year().rem_euclid(100),
		dt.month() as u8,
		dt.day(),
		dt.hour(),
		dt.minute(),
		dt.second(),
	))
}

pub(crate) fn parse_generalized_time(text: &str) -> Option<i64> {
	let bytes = text.as_bytes();
	if bytes.len() != 15 || bytes[14] != b'Z' {
		return None
	}

	let year = i32::from(parse_pair(bytes, 0)?) * 100 + i32::from(parse_pair(bytes, 2)?);
	timestamp_millis(
		year,
		parse_pair(bytes, 4)?,
		parse_pair(bytes, 6)?,
		parse_pair(bytes, 8)?,
		parse_pair(bytes, 10)?,
		parse_pair(bytes, 12)?,
	)
}

pub(crate) fn format_generalized_time(millis: i64) -> Option<String> {
	let dt = datetime(millis)?;
	if !(0..=9999).contains(&dt.year()) {
		return None
	}

	Some(format!(
		"{:04}{:02}{:02}{:02}{:02}{:02}Z",
		dt.year(),
		dt.month() as u8,
		dt.day(),
		dt.hour(),
		dt.minute(),
		dt.second(),
	))
}

fn parse_pair(bytes: &[u8], at: usize) -> Option<u8> {
	let tens = bytes[at];
	let ones = bytes[at + 1];
	if !tens.is_ascii_digit() || !ones.is_ascii_digit() {
		return None
	}
	Some((tens - b'0') * 10 + (ones - b'0'))
}

fn timestamp_millis(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<i64> {
	let month = Month::try_from(month).ok()?;
	let date = Date::from_calendar_date(year, month, day).ok()?;
	let time = Time::from_hms(hour, minute, second).ok()?;
	Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp() * 1000)
}

fn datetime(millis: i64) -> Option<OffsetDateTime> {
	OffsetDateTime::from_unix_timestamp(millis.div_euclid(1000)).ok()
}
