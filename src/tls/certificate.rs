// SPDX-License-Identifier: Apache-2.0

//! Declarative RFC 5280 X.509 and PKCS#8 records over the DER adapter
//! framework. Each record is a plain struct plus the conversion pair between
//! it and the dynamic value model; the schema itself is codec composition.

use num_bigint::BigInt;
use crate::ByteString;
use crate::der::{
	adapters, Adapter, BitString, Codec, ProtocolError, Result, UnknownValue,
	Value, TAG_CLASS_CONTEXT, TAG_OCTET_STRING,
};

pub const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
pub const OID_SHA256_WITH_ECDSA: &str = "1.2.840.10045.4.3.2";
pub const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
pub const OID_EC_P256: &str = "1.2.840.10045.3.1.7";
pub const OID_BASIC_CONSTRAINTS: &str = "2.5.29.19";
pub const OID_SUBJECT_ALT_NAME: &str = "2.5.29.17";
pub const OID_COMMON_NAME: &str = "2.5.4.3";
pub const OID_ORGANIZATIONAL_UNIT: &str = "2.5.4.11";

#[derive(Clone, Debug, PartialEq)]
pub struct Certificate {
	pub tbs_certificate: TbsCertificate,
	pub signature_algorithm: AlgorithmIdentifier,
	pub signature_value: BitString,
}

impl Certificate {
	/// Returns the DER bytes of the to-be-signed portion, the input to
	/// signing and verification.
	pub fn signature_input(&self) -> Result<ByteString> {
		tbs_certificate().to_der(&self.tbs_certificate)
	}

	/// Returns the `commonName` attribute of the subject, if present.
	pub fn subject_common_name(&self) -> Option<&str> {
		self.tbs_certificate
			.subject
			.iter()
			.flatten()
			.find(|attr| attr.attribute_type == OID_COMMON_NAME)
			.and_then(|attr| match &attr.value {
				Value::Utf8(name) => Some(name.as_str()),
				_ => None,
			})
	}

	/// Returns the DNS names of the subject alternative name extension.
	pub fn subject_alternative_dns_names(&self) -> impl Iterator<Item = &str> {
		self.tbs_certificate
			.extensions
			.iter()
			.filter_map(|ext| match &ext.value {
				ExtensionValue::SubjectAlternativeNames(names) => Some(names),
				_ => None,
			})
			.flatten()
			.filter_map(|name| match name {
				GeneralName::DnsName(dns) => Some(dns.as_str()),
				_ => None,
			})
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct TbsCertificate {
	/// v1 is 0, v3 is 2. Defaults to v1 when absent.
	pub version: i64,
	pub serial_number: BigInt,
	pub signature: AlgorithmIdentifier,
	pub issuer: Name,
	pub validity: Validity,
	pub subject: Name,
	pub subject_public_key_info: SubjectPublicKeyInfo,
	pub issuer_unique_id: Option<BitString>,
	pub subject_unique_id: Option<BitString>,
	pub extensions: Vec<Extension>,
}

/// An RDNSequence: the outer list is ordered, each inner set holds the
/// attributes of one relative distinguished name.
pub type Name = Vec<Vec<AttributeTypeAndValue>>;

#[derive(Clone, Debug, PartialEq)]
pub struct AttributeTypeAndValue {
	pub attribute_type: String,
	pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlgorithmIdentifier {
	pub algorithm: String,
	/// `Some(Value::Null)` is an encoded NULL (RSA requires it); `None` means
	/// the parameters are absent.
	pub parameters: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Validity {
	pub not_before: i64,
	pub not_after: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubjectPublicKeyInfo {
	pub algorithm: AlgorithmIdentifier,
	pub subject_public_key: BitString,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Extension {
	pub id: String,
	pub critical: bool,
	pub value: ExtensionValue,
}

/// An extension body, dispatched by the extension's id acting as the type
/// hint. Unrecognized extensions stay opaque and re-encode byte-exactly.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtensionValue {
	BasicConstraints(BasicConstraints),
	SubjectAlternativeNames(Vec<GeneralName>),
	Opaque(ByteString),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BasicConstraints {
	pub ca: bool,
	pub max_intermediate_cas: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GeneralName {
	DnsName(String),
	IpAddress(ByteString),
	Other(UnknownValue),
}

/// PKCS#8 PrivateKeyInfo.
#[derive(Clone, Debug, PartialEq)]
pub struct PrivateKeyInfo {
	pub version: i64,
	pub algorithm: AlgorithmIdentifier,
	pub private_key: ByteString,
}

// Schema composition.

pub fn certificate() -> Adapter<Certificate> {
	certificate_codec().adapter(certificate_from_value, certificate_to_value)
}

pub fn tbs_certificate() -> Adapter<TbsCertificate> {
	tbs_certificate_codec().adapter(tbs_from_value, tbs_to_value)
}

pub fn private_key_info() -> Adapter<PrivateKeyInfo> {
	Codec::sequence("privateKeyInfo", vec![
		adapters::integer_as_long().into_codec(),
		algorithm_identifier_codec(),
		adapters::octet_string().into_codec(),
	])
	.adapter(private_key_from_value, private_key_to_value)
}

fn certificate_codec() -> Codec {
	Codec::sequence("certificate", vec![
		tbs_certificate_codec(),
		algorithm_identifier_codec(),
		adapters::bit_string().into_codec(),
	])
}

fn tbs_certificate_codec() -> Codec {
	Codec::sequence("tbsCertificate", vec![
		adapters::integer_as_long()
			.into_codec()
			.with_explicit_box("version", TAG_CLASS_CONTEXT, 0, None)
			.optional(Value::Long(0)),
		adapters::integer_as_big_integer().into_codec(),
		algorithm_identifier_codec(),
		rdn_sequence_codec(),
		Codec::sequence("validity", vec![
			adapters::time_codec(),
			adapters::time_codec(),
		]),
		rdn_sequence_codec(),
		subject_public_key_info_codec(),
		adapters::bit_string()
			.into_codec()
			.with_tag(TAG_CLASS_CONTEXT, 1)
			.optional(Value::Absent),
		adapters::bit_string()
			.into_codec()
			.with_tag(TAG_CLASS_CONTEXT, 2)
			.optional(Value::Absent),
		extension_codec()
			.as_sequence_of("extensions")
			.with_explicit_box("extensions", TAG_CLASS_CONTEXT, 3, None)
			.optional(Value::List(Vec::new())),
	])
}

fn algorithm_identifier_codec() -> Codec {
	Codec::sequence("algorithmIdentifier", vec![
		adapters::object_identifier().into_codec(),
		Codec::any(vec![
			adapters::null().into_codec(),
			adapters::object_identifier().into_codec(),
		])
		.optional(Value::Absent),
	])
}

fn subject_public_key_info_codec() -> Codec {
	Codec::sequence("subjectPublicKeyInfo", vec![
		algorithm_identifier_codec(),
		adapters::bit_string().into_codec(),
	])
}

fn rdn_sequence_codec() -> Codec {
	attribute_type_and_value_codec()
		.as_set_of("relativeDistinguishedName")
		.as_sequence_of("rdnSequence")
}

fn attribute_type_and_value_codec() -> Codec {
	// Values in other string forms (PrintableString and friends) are
	// captured verbatim so they re-encode byte-exactly.
	Codec::sequence("attributeTypeAndValue", vec![
		adapters::object_identifier().into_codec(),
		Codec::any(vec![adapters::utf8_string().into_codec()]),
	])
}

fn extension_codec() -> Codec {
	Codec::sequence("extension", vec![
		adapters::object_identifier().into_codec().as_type_hint(),
		adapters::boolean().into_codec().optional(Value::Boolean(false)),
		Codec::using_type_hint("extensionValue", choose_extension_codec)
			.with_explicit_box(
				"extensionValue",
				crate::der::TAG_CLASS_UNIVERSAL,
				TAG_OCTET_STRING,
				Some(false),
			),
	])
}

fn choose_extension_codec(hint: &Value) -> Option<Codec> {
	match hint {
		Value::ObjectId(oid) if oid == OID_BASIC_CONSTRAINTS => {
			Some(basic_constraints_codec())
		}
		Value::ObjectId(oid) if oid == OID_SUBJECT_ALT_NAME => {
			Some(general_name_codec().as_sequence_of("subjectAltName"))
		}
		_ => None,
	}
}

fn basic_constraints_codec() -> Codec {
	Codec::sequence("basicConstraints", vec![
		adapters::boolean().into_codec().optional(Value::Boolean(false)),
		adapters::integer_as_long().into_codec().optional(Value::Absent),
	])
}

fn general_name_codec() -> Codec {
	Codec::choice(vec![
		adapters::ia5_string().into_codec().with_tag(TAG_CLASS_CONTEXT, 2),
		adapters::octet_string().into_codec().with_tag(TAG_CLASS_CONTEXT, 7),
		Codec::any(Vec::new()),
	])
}

// Conversions between the value model and the typed records.

fn shape_error(message: &'static str) -> crate::der::Error {
	ProtocolError::new(message, Vec::new()).into()
}

fn members<const N: usize>(value: Value) -> Result<[Value; N]> {
	let values = value.into_list()?;
	values.try_into()
		  .map_err(|_| shape_error("wrong number of members"))
}

fn optional(value: Value) -> Option<Value> {
	match value {
		Value::Absent => None,
		value => Some(value),
	}
}

fn certificate_from_value(value: Value) -> Result<Certificate> {
	let [tbs, algorithm, signature] = members(value)?;
	Ok(Certificate {
		tbs_certificate: tbs_from_value(tbs)?,
		signature_algorithm: algorithm_from_value(algorithm)?,
		signature_value: signature.into_bit_string()?,
	})
}

fn certificate_to_value(certificate: &Certificate) -> Value {
	Value::List(vec![
		tbs_to_value(&certificate.tbs_certificate),
		algorithm_to_value(&certificate.signature_algorithm),
		Value::BitString(certificate.signature_value.clone()),
	])
}

fn tbs_from_value(value: Value) -> Result<TbsCertificate> {
	let [
		version, serial, signature, issuer, validity, subject, spki,
		issuer_uid, subject_uid, extensions,
	] = members(value)?;

	Ok(TbsCertificate {
		version: version.into_long()?,
		serial_number: serial.into_big_integer()?,
		signature: algorithm_from_value(signature)?,
		issuer: name_from_value(issuer)?,
		validity: validity_from_value(validity)?,
		subject: name_from_value(subject)?,
		subject_public_key_info: spki_from_value(spki)?,
		issuer_unique_id: optional(issuer_uid)
			.map(Value::into_bit_string)
			.transpose()?,
		subject_unique_id: optional(subject_uid)
			.map(Value::into_bit_string)
			.transpose()?,
		extensions: extensions.into_list()?
			.into_iter()
			.map(extension_from_value)
			.collect::<Result<_>>()?,
	})
}

fn tbs_to_value(tbs: &TbsCertificate) -> Value {
	Value::List(vec![
		Value::Long(tbs.version),
		Value::BigInt(tbs.serial_number.clone()),
		algorithm_to_value(&tbs.signature),
		name_to_value(&tbs.issuer),
		Value::List(vec![
			Value::Time(tbs.validity.not_before),
			Value::Time(tbs.validity.not_after),
		]),
		name_to_value(&tbs.subject),
		spki_to_value(&tbs.subject_public_key_info),
		tbs.issuer_unique_id
		   .clone()
		   .map_or(Value::Absent, Value::BitString),
		tbs.subject_unique_id
		   .clone()
		   .map_or(Value::Absent, Value::BitString),
		Value::List(tbs.extensions.iter().map(extension_to_value).collect()),
	])
}

fn algorithm_from_value(value: Value) -> Result<AlgorithmIdentifier> {
	let [algorithm, parameters] = members(value)?;
	Ok(AlgorithmIdentifier {
		algorithm: algorithm.into_object_id()?,
		parameters: optional(parameters),
	})
}

fn algorithm_to_value(algorithm: &AlgorithmIdentifier) -> Value {
	Value::List(vec![
		Value::ObjectId(algorithm.algorithm.clone()),
		algorithm.parameters.clone().unwrap_or(Value::Absent),
	])
}

fn validity_from_value(value: Value) -> Result<Validity> {
	let [not_before, not_after] = members(value)?;
	Ok(Validity {
		not_before: not_before.into_time()?,
		not_after: not_after.into_time()?,
	})
}

fn name_from_value(value: Value) -> Result<Name> {
	value.into_list()?
		 .into_iter()
		 .map(|rdn| {
			 rdn.into_list()?
				.into_iter()
				.map(attribute_from_value)
				.collect()
		 })
		 .collect()
}

fn name_to_value(name: &Name) -> Value {
	Value::List(
		name.iter()
			.map(|rdn| Value::List(rdn.iter().map(attribute_to_value).collect()))
			.collect(),
	)
}

fn attribute_from_value(value: Value) -> Result<AttributeTypeAndValue> {
	let [attribute_type, value] = members(value)?;
	Ok(AttributeTypeAndValue {
		attribute_type: attribute_type.into_object_id()?,
		value,
	})
}

fn attribute_to_value(attribute: &AttributeTypeAndValue) -> Value {
	Value::List(vec![
		Value::ObjectId(attribute.attribute_type.clone()),
		attribute.value.clone(),
	])
}

fn spki_from_value(value: Value) -> Result<SubjectPublicKeyInfo> {
	let [algorithm, key] = members(value)?;
	Ok(SubjectPublicKeyInfo {
		algorithm: algorithm_from_value(algorithm)?,
		subject_public_key: key.into_bit_string()?,
	})
}

fn spki_to_value(spki: &SubjectPublicKeyInfo) -> Value {
	Value::List(vec![
		algorithm_to_value(&spki.algorithm),
		Value::BitString(spki.subject_public_key.clone()),
	])
}

fn extension_from_value(value: Value) -> Result<Extension> {
	let [id, critical, body] = members(value)?;
	let id = id.into_object_id()?;
	let value = match id.as_str() {
		OID_BASIC_CONSTRAINTS => {
			ExtensionValue::BasicConstraints(basic_constraints_from_value(body)?)
		}
		OID_SUBJECT_ALT_NAME => ExtensionValue::SubjectAlternativeNames(
			body.into_list()?
				.into_iter()
				.map(general_name_from_value)
				.collect::<Result<_>>()?,
		),
		_ => ExtensionValue::Opaque(body.into_octets()?),
	};

	Ok(Extension {
		id,
		critical: critical.into_boolean()?,
		value,
	})
}

fn extension_to_value(extension: &Extension) -> Value {
	let body = match &extension.value {
		ExtensionValue::BasicConstraints(constraints) => Value::List(vec![
			Value::Boolean(constraints.ca),
			constraints.max_intermediate_cas
					   .map_or(Value::Absent, Value::Long),
		]),
		ExtensionValue::SubjectAlternativeNames(names) => {
			Value::List(names.iter().map(general_name_to_value).collect())
		}
		ExtensionValue::Opaque(bytes) => Value::Octets(bytes.clone()),
	};

	Value::List(vec![
		Value::ObjectId(extension.id.clone()),
		Value::Boolean(extension.critical),
		body,
	])
}

fn basic_constraints_from_value(value: Value) -> Result<BasicConstraints> {
	let [ca, max_intermediate_cas] = members(value)?;
	Ok(BasicConstraints {
		ca: ca.into_boolean()?,
		max_intermediate_cas: optional(max_intermediate_cas)
			.map(Value::into_long)
			.transpose()?,
	})
}

fn general_name_from_value(value: Value) -> Result<GeneralName> {
	let (index, value) = value.into_choice()?;
	Ok(match index {
		0 => GeneralName::DnsName(value.into_utf8()?),
		1 => GeneralName::IpAddress(value.into_octets()?),
		2 => match value {
			Value::Unknown(unknown) => GeneralName::Other(unknown),
			_ => return Err(shape_error("expected a captured general name")),
		},
		_ => return Err(shape_error("general name alternative out of range")),
	})
}

fn general_name_to_value(name: &GeneralName) -> Value {
	let (index, value) = match name {
		GeneralName::DnsName(dns) => (0, Value::Utf8(dns.clone())),
		GeneralName::IpAddress(ip) => (1, Value::Octets(ip.clone())),
		GeneralName::Other(unknown) => (2, Value::Unknown(unknown.clone())),
	};
	Value::Choice { index, value: value.into() }
}

fn private_key_from_value(value: Value) -> Result<PrivateKeyInfo> {
	let [version, algorithm, key] = members(value)?;
	Ok(PrivateKeyInfo {
		version: version.into_long()?,
		algorithm: algorithm_from_value(algorithm)?,
		private_key: key.into_octets()?,
	})
}

fn private_key_to_value(key: &PrivateKeyInfo) -> Value {
	Value::List(vec![
		Value::Long(key.version),
		algorithm_to_value(&key.algorithm),
		Value::Octets(key.private_key.clone()),
	])
}
