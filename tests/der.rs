// SPDX-License-Identifier: Apache-2.0

#[macro_use]
mod common;

use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use rayo::ByteString;
use rayo::der::adapters::{
	integer_as_big_integer, integer_as_long, object_identifier, octet_string,
	time, utc_time, utf8_string,
};
use rayo::der::{Value, TAG_CLASS_UNIVERSAL};

#[test]
fn long_form_length_round_trips() {
	// A 201-byte string under tag 30: three header bytes, then the payload.
	let adapter = utf8_string()
		.into_codec()
		.with_tag(TAG_CLASS_UNIVERSAL, 30)
		.adapter(Value::into_utf8, |v: &String| Value::Utf8(v.clone()));

	let input = "a".repeat(201);
	let encoded = adapter.to_der(&input).unwrap();
	assert_eq!(&encoded.as_slice()[..3], &[0x1E, 0x81, 0xC9]);
	assert_eq!(encoded.len(), 204);
	assert_eq!(adapter.from_der(&encoded).unwrap(), input);
}

#[test]
fn integer_encodings() {
	let adapter = integer_as_long();
	for (value, expected) in [
		(50i64, vec![0x02u8, 0x01, 0x32]),
		(-1, vec![0x02, 0x01, 0xFF]),
		(-256, vec![0x02, 0x02, 0xFF, 0x00]),
		(i64::MIN, vec![0x02, 0x08, 0x80, 0, 0, 0, 0, 0, 0, 0]),
	] {
		assert_eq!(
			adapter.to_der(&value).unwrap(), *expected.as_slice(),
			"encoding {value}"
		);
		assert_eq!(adapter.from_der(&expected).unwrap(), value);
	}
}

#[test]
fn object_identifier_encoding() {
	let adapter = object_identifier();
	let oid = "2.999.3".to_string();
	let encoded = adapter.to_der(&oid).unwrap();
	assert_eq!(encoded, [0x06, 0x03, 0x88, 0x37, 0x03]);
	assert_eq!(adapter.from_der(&encoded).unwrap(), oid);
}

#[test]
fn time_picks_utc_or_generalized() {
	// 1992-05-21T00:00:00Z is inside the UTCTime window.
	let utc = 706_406_400_000i64;
	let encoded = time().to_der(&utc).unwrap();
	let mut expected = vec![0x17, 0x0D];
	expected.extend_from_slice(b"920521000000Z");
	assert_eq!(encoded, *expected.as_slice());
	assert_eq!(time().from_der(&encoded).unwrap(), utc);

	// 2050-01-01T00:00:00Z is the first instant past it.
	let generalized = 2_524_608_000_000i64;
	let encoded = time().to_der(&generalized).unwrap();
	assert_eq!(&encoded.as_slice()[..6], &[0x18, 0x0F, 0x32, 0x30, 0x35, 0x30]);
	assert_eq!(time().from_der(&encoded).unwrap(), generalized);
}

#[test]
fn utc_time_two_digit_pivot() {
	let mut encoded = vec![0x17, 0x0D];
	encoded.extend_from_slice(b"500101000000Z");
	assert_eq!(utc_time().from_der(&encoded).unwrap(), -631_152_000_000);
}

#[test]
fn trailing_bytes_are_rejected() {
	let mut encoded: Vec<u8> = integer_as_long().to_der(&7).unwrap().into();
	encoded.push(0x00);
	let error = integer_as_long().from_der(&encoded).unwrap_err();
	assert!(error.is_protocol());
	assert!(error.to_string().contains("trailing"));
}

#[test]
fn redundant_integer_padding_is_rejected() {
	let error = integer_as_long().from_der([0x02, 0x02, 0x00, 0x32]).unwrap_err();
	assert!(error.is_protocol());
}

#[test]
fn wrong_tag_is_rejected_with_the_path() {
	let error = integer_as_long().from_der([0x0C, 0x01, 0x32]).unwrap_err();
	let message = error.to_string();
	assert!(message.contains("unexpected tag"), "got {message}");
	assert!(message.contains("INTEGER"), "the path should name the value");
}

#[test]
fn octet_string_round_trips() {
	let adapter = octet_string();
	let value = ByteString::of(vec![0u8, 1, 2, 253, 254, 255]);
	let encoded = adapter.to_der(&value).unwrap();
	assert_eq!(encoded.as_slice()[0], 0x04);
	assert_eq!(adapter.from_der(&encoded).unwrap(), value);
}

#[quickcheck]
fn longs_round_trip(value: i64) -> TestResult {
	let adapter = integer_as_long();
	let encoded = match adapter.to_der(&value) {
		Ok(encoded) => encoded,
		Err(error) => return TestResult::error(error.to_string()),
	};
	match adapter.from_der(&encoded) {
		Ok(decoded) => qc_assert_eq!(decoded, value),
		Err(error) => TestResult::error(error.to_string()),
	}
}

#[quickcheck]
fn big_integers_round_trip(value: i128) -> TestResult {
	let adapter = integer_as_big_integer();
	let value = BigInt::from(value) * BigInt::from(value);
	let encoded = match adapter.to_der(&value) {
		Ok(encoded) => encoded,
		Err(error) => return TestResult::error(error.to_string()),
	};
	match adapter.from_der(&encoded) {
		Ok(decoded) => qc_assert_eq!(decoded, value),
		Err(error) => TestResult::error(error.to_string()),
	}
}

#[quickcheck]
fn encoding_is_canonical(value: i64) -> TestResult {
	// Decode-then-encode is the identity on accepted bytes.
	let adapter = integer_as_long();
	let encoded = adapter.to_der(&value).unwrap();
	let decoded = adapter.from_der(&encoded).unwrap();
	qc_assert_eq!(adapter.to_der(&decoded).unwrap(), encoded)
}

mod certificates {
	use num_bigint::BigInt;
	use pretty_assertions::assert_eq;
	use rayo::ByteString;
	use rayo::der::{BitString, Value};
	use rayo::tls::certificate::{
		certificate, private_key_info, AlgorithmIdentifier,
		AttributeTypeAndValue, BasicConstraints, Certificate, Extension,
		ExtensionValue, GeneralName, PrivateKeyInfo, SubjectPublicKeyInfo,
		TbsCertificate, Validity, OID_BASIC_CONSTRAINTS, OID_COMMON_NAME,
		OID_EC_P256, OID_EC_PUBLIC_KEY, OID_SHA256_WITH_ECDSA,
		OID_SUBJECT_ALT_NAME,
	};

	fn sample_certificate() -> Certificate {
		let algorithm = AlgorithmIdentifier {
			algorithm: OID_SHA256_WITH_ECDSA.to_string(),
			parameters: None,
		};
		let name = vec![vec![AttributeTypeAndValue {
			attribute_type: OID_COMMON_NAME.to_string(),
			value: Value::Utf8("cash.app".to_string()),
		}]];

		Certificate {
			tbs_certificate: TbsCertificate {
				version: 2,
				serial_number: BigInt::from(42),
				signature: algorithm.clone(),
				issuer: name.clone(),
				validity: Validity {
					not_before: 1_683_849_600_000,
					not_after: 2_556_144_000_000, // past the UTCTime cutoff
				},
				subject: name,
				subject_public_key_info: SubjectPublicKeyInfo {
					algorithm: AlgorithmIdentifier {
						algorithm: OID_EC_PUBLIC_KEY.to_string(),
						parameters: Some(Value::ObjectId(OID_EC_P256.to_string())),
					},
					subject_public_key: BitString {
						bytes: ByteString::of(vec![0x04, 0x01, 0x02, 0x03]),
						unused_bits: 0,
					},
				},
				issuer_unique_id: None,
				subject_unique_id: None,
				extensions: vec![
					Extension {
						id: OID_BASIC_CONSTRAINTS.to_string(),
						critical: true,
						value: ExtensionValue::BasicConstraints(BasicConstraints {
							ca: true,
							max_intermediate_cas: Some(3),
						}),
					},
					Extension {
						id: OID_SUBJECT_ALT_NAME.to_string(),
						critical: false,
						value: ExtensionValue::SubjectAlternativeNames(vec![
							GeneralName::DnsName("cash.app".to_string()),
							GeneralName::IpAddress(ByteString::of(vec![127, 0, 0, 1])),
						]),
					},
					Extension {
						id: "1.2.3.4.5".to_string(),
						critical: false,
						value: ExtensionValue::Opaque(ByteString::of(vec![0xDE, 0xAD])),
					},
				],
			},
			signature_algorithm: algorithm,
			signature_value: BitString {
				bytes: ByteString::of(vec![0x30, 0x06, 0x02, 0x01, 0x09, 0x02, 0x01, 0x06]),
				unused_bits: 0,
			},
		}
	}

	#[test]
	fn certificate_round_trips() {
		let cert = sample_certificate();
		let encoded = certificate().to_der(&cert).unwrap();
		let decoded = certificate().from_der(&encoded).unwrap();
		assert_eq!(decoded, cert);
	}

	#[test]
	fn certificate_encoding_is_canonical() {
		let cert = sample_certificate();
		let encoded = certificate().to_der(&cert).unwrap();
		let decoded = certificate().from_der(&encoded).unwrap();
		assert_eq!(certificate().to_der(&decoded).unwrap(), encoded);
	}

	#[test]
	fn default_version_is_omitted() {
		let mut cert = sample_certificate();
		cert.tbs_certificate.version = 0;
		cert.tbs_certificate.extensions.clear();

		let encoded = certificate().to_der(&cert).unwrap();
		let decoded = certificate().from_der(&encoded).unwrap();
		assert_eq!(decoded.tbs_certificate.version, 0);

		let mut v3 = sample_certificate();
		v3.tbs_certificate.extensions.clear();
		let v3_encoded = certificate().to_der(&v3).unwrap();
		assert!(
			encoded.len() < v3_encoded.len(),
			"a DEFAULT version must be absent from the encoding"
		);
	}

	#[test]
	fn accessors_reach_into_extensions() {
		let cert = sample_certificate();
		assert_eq!(cert.subject_common_name(), Some("cash.app"));
		let dns: Vec<&str> = cert.subject_alternative_dns_names().collect();
		assert_eq!(dns, ["cash.app"]);
	}

	#[test]
	fn errors_carry_the_path() {
		// A certificate whose outer shell is fine but whose serial is a
		// BOOLEAN: the failure names tbsCertificate.
		let error = certificate().from_der([0x30, 0x05, 0x30, 0x03, 0x01, 0x01, 0xFF])
			.unwrap_err();
		let message = error.to_string();
		assert!(message.contains("tbsCertificate"), "got {message}");
	}

	#[test]
	fn private_key_info_round_trips() {
		let key = PrivateKeyInfo {
			version: 0,
			algorithm: AlgorithmIdentifier {
				algorithm: OID_EC_PUBLIC_KEY.to_string(),
				parameters: Some(Value::ObjectId(OID_EC_P256.to_string())),
			},
			private_key: ByteString::of(vec![0x30, 0x02, 0x01, 0x00]),
		};

		let encoded = private_key_info().to_der(&key).unwrap();
		assert_eq!(private_key_info().from_der(&encoded).unwrap(), key);
	}
}
