// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::error;
use std::net::IpAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use num_bigint::BigInt;
use crate::ByteString;
use crate::der::{self, BitString, ProtocolError, Value};
use super::certificate::{
	certificate, private_key_info, AlgorithmIdentifier, AttributeTypeAndValue,
	BasicConstraints, Certificate, Extension, ExtensionValue, GeneralName,
	Name, PrivateKeyInfo, SubjectPublicKeyInfo, TbsCertificate, Validity,
	OID_BASIC_CONSTRAINTS, OID_COMMON_NAME, OID_ORGANIZATIONAL_UNIT,
	OID_SHA256_WITH_ECDSA, OID_SHA256_WITH_RSA, OID_SUBJECT_ALT_NAME,
};
use super::pem::{decode_pem, encode_pem};
use super::sni::ServerName;

const LABEL_CERTIFICATE: &str = "CERTIFICATE";
const LABEL_PRIVATE_KEY: &str = "PRIVATE KEY";

/// A failure inside the delegated crypto provider. Distinct from
/// [`ProtocolError`]: the bytes were fine, the host crypto was not.
#[derive(Debug, thiserror::Error)]
#[error("crypto provider failure: {message}")]
pub struct CryptoError {
	message: String,
	#[source]
	source: Option<Box<dyn error::Error + Send + Sync>>,
}

impl CryptoError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: None,
		}
	}

	pub fn with_source(
		message: impl Into<String>,
		source: impl error::Error + Send + Sync + 'static
	) -> Self {
		Self {
			message: message.into(),
			source: Some(Box::new(source)),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum HeldCertificateError {
	#[error(transparent)]
	Der(#[from] der::Error),
	#[error(transparent)]
	Crypto(#[from] CryptoError),
}

impl From<ProtocolError> for HeldCertificateError {
	fn from(value: ProtocolError) -> Self {
		Self::Der(value.into())
	}
}

/// The key algorithms a held certificate can be generated with.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum KeyFormat {
	#[default]
	Ecdsa256,
	Rsa2048,
}

impl KeyFormat {
	/// The signature algorithm identifier for signing with a key of this
	/// format.
	pub fn signature_algorithm(self) -> AlgorithmIdentifier {
		match self {
			Self::Ecdsa256 => AlgorithmIdentifier {
				algorithm: OID_SHA256_WITH_ECDSA.to_string(),
				parameters: None,
			},
			Self::Rsa2048 => AlgorithmIdentifier {
				algorithm: OID_SHA256_WITH_RSA.to_string(),
				parameters: Some(Value::Null),
			},
		}
	}
}

/// A key pair at the DER level: the certificate-ready public half and the
/// PKCS#8 private half.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyPair {
	pub public_key: SubjectPublicKeyInfo,
	pub private_key: PrivateKeyInfo,
}

/// The delegation boundary for crypto. The core never computes signatures or
/// generates keys itself; a host provider does, and its failures surface as
/// [`CryptoError`].
pub trait CryptoProvider {
	/// Generates a key pair in the requested format.
	fn generate_key_pair(&self, format: KeyFormat) -> Result<KeyPair, CryptoError>;

	/// Signs `message` with `key` under the given signature algorithm OID.
	fn sign(
		&self,
		key: &PrivateKeyInfo,
		algorithm_oid: &str,
		message: &[u8]
	) -> Result<ByteString, CryptoError>;

	/// Verifies `signature` over `message` against `key`.
	fn verify(
		&self,
		key: &SubjectPublicKeyInfo,
		algorithm_oid: &str,
		message: &[u8],
		signature: &[u8]
	) -> Result<bool, CryptoError>;
}

/// A certificate together with its private key, typically self-signed or
/// signed by a local CA, used for testing or local issuance.
#[derive(Clone, Debug, PartialEq)]
pub struct HeldCertificate {
	pub certificate: Certificate,
	pub key_pair: KeyPair,
}

impl HeldCertificate {
	/// Encodes the certificate and key as two PEM blocks.
	pub fn to_pem(&self) -> Result<String, HeldCertificateError> {
		let cert_der = certificate().to_der(&self.certificate)?;
		let key_der = private_key_info().to_der(&self.key_pair.private_key)?;
		Ok(format!(
			"{}{}",
			encode_pem(LABEL_CERTIFICATE, &cert_der),
			encode_pem(LABEL_PRIVATE_KEY, &key_der),
		))
	}

	/// Decodes a PEM blob holding exactly one certificate and one private
	/// key. More than one of either, or any other label, is rejected.
	pub fn from_pem(pem: &str) -> Result<Self, HeldCertificateError> {
		let mut cert = None;
		let mut key = None;

		for block in decode_pem(pem)? {
			match block.label.as_str() {
				LABEL_CERTIFICATE => {
					if cert.replace(block.der).is_some() {
						return Err(pem_error("more than one certificate"))
					}
				}
				LABEL_PRIVATE_KEY => {
					if key.replace(block.der).is_some() {
						return Err(pem_error("more than one private key"))
					}
				}
				label => {
					return Err(pem_error(format!("unsupported PEM label {label:?}")))
				}
			}
		}

		let Some(cert) = cert else {
			return Err(pem_error("missing a certificate"))
		};
		let Some(key) = key else {
			return Err(pem_error("missing a private key"))
		};

		let certificate = certificate().from_der(&cert)?;
		let private_key = private_key_info().from_der(&key)?;
		let public_key = certificate.tbs_certificate
									.subject_public_key_info
									.clone();
		Ok(Self {
			certificate,
			key_pair: KeyPair {
				public_key,
				private_key,
			},
		})
	}

	/// Verifies `subject`'s signature against this certificate's public key
	/// via the provider.
	pub fn verify_issued(
		&self,
		subject: &Certificate,
		provider: &impl CryptoProvider
	) -> Result<bool, HeldCertificateError> {
		let message = subject.signature_input()?;
		provider.verify(
			&self.key_pair.public_key,
			&subject.signature_algorithm.algorithm,
			message.as_slice(),
			subject.signature_value.bytes.as_slice(),
		)
		.map_err(Into::into)
	}
}

fn pem_error(message: impl Into<String>) -> HeldCertificateError {
	ProtocolError::new(message, vec!["pem"]).into()
}

/// Configuration for issuing a held certificate. Every option enumerated;
/// unset options take the documented defaults.
#[derive(Clone, Debug, Default)]
pub struct HeldCertificateConfig {
	/// Subject common name. Defaults to a name derived from the serial
	/// number.
	pub common_name: Option<String>,
	pub organizational_unit: Option<String>,
	/// Subject alternative names; entries parsing as IP addresses are
	/// encoded as such, the rest as DNS names.
	pub alt_names: Vec<String>,
	/// Validity start in epoch milliseconds. Defaults to now.
	pub not_before: Option<i64>,
	/// Validity window. Defaults to 24 hours.
	pub validity: Option<Duration>,
	/// The issuing certificate; `None` self-signs.
	pub signed_by: Option<Box<HeldCertificate>>,
	/// Issues a CA certificate allowing this many intermediates below it.
	pub max_intermediate_cas: Option<u32>,
	pub key_format: KeyFormat,
	/// Defaults to 1.
	pub serial_number: Option<BigInt>,
}

impl HeldCertificateConfig {
	/// Generates a key pair and issues the certificate through `provider`.
	pub fn build(
		&self,
		provider: &impl CryptoProvider
	) -> Result<HeldCertificate, HeldCertificateError> {
		let key_pair = provider.generate_key_pair(self.key_format)?;
		let serial_number = self.serial_number
							   .clone()
							   .unwrap_or_else(|| BigInt::from(1));

		// DER time carries whole seconds.
		let not_before = self.not_before
							.unwrap_or_else(now_millis)
							.div_euclid(1000) * 1000;
		let validity = self.validity.unwrap_or(Duration::from_secs(24 * 60 * 60));
		let not_after = not_before + (validity.as_secs() as i64) * 1000;

		let subject = self.subject_name(&serial_number);
		let (issuer, signing_key, signature_algorithm) = match &self.signed_by {
			Some(issuer) => (
				issuer.certificate.tbs_certificate.subject.clone(),
				&issuer.key_pair.private_key,
				signer_format(&issuer.key_pair.private_key)
					.signature_algorithm(),
			),
			None => (
				subject.clone(),
				&key_pair.private_key,
				self.key_format.signature_algorithm(),
			),
		};

		let mut extensions = Vec::new();
		if let Some(max) = self.max_intermediate_cas {
			extensions.push(Extension {
				id: OID_BASIC_CONSTRAINTS.to_string(),
				critical: true,
				value: ExtensionValue::BasicConstraints(BasicConstraints {
					ca: true,
					max_intermediate_cas: Some(i64::from(max)),
				}),
			});
		}
		if !self.alt_names.is_empty() {
			let names = self.alt_names
				.iter()
				.map(|name| match name.parse::<IpAddr>() {
					Ok(IpAddr::V4(ip)) => GeneralName::IpAddress(ip.octets().into()),
					Ok(IpAddr::V6(ip)) => GeneralName::IpAddress(ip.octets().into()),
					Err(_) => GeneralName::DnsName(name.clone()),
				})
				.collect();
			extensions.push(Extension {
				id: OID_SUBJECT_ALT_NAME.to_string(),
				critical: false,
				value: ExtensionValue::SubjectAlternativeNames(names),
			});
		}

		let tbs_certificate = TbsCertificate {
			version: 2, // v3
			serial_number,
			signature: signature_algorithm.clone(),
			issuer,
			validity: Validity {
				not_before,
				not_after,
			},
			subject,
			subject_public_key_info: key_pair.public_key.clone(),
			issuer_unique_id: None,
			subject_unique_id: None,
			extensions,
		};

		let message = super::certificate::tbs_certificate().to_der(&tbs_certificate)?;
		let signature = provider.sign(
			signing_key,
			&signature_algorithm.algorithm,
			message.as_slice(),
		)?;

		Ok(HeldCertificate {
			certificate: Certificate {
				tbs_certificate,
				signature_algorithm,
				signature_value: BitString {
					bytes: signature,
					unused_bits: 0,
				},
			},
			key_pair,
		})
	}

	fn subject_name(&self, serial_number: &BigInt) -> Name {
		let mut name = Vec::new();
		let common_name = self.common_name
			.clone()
			.unwrap_or_else(|| format!("rayo-{serial_number}"));
		name.push(vec![AttributeTypeAndValue {
			attribute_type: OID_COMMON_NAME.to_string(),
			value: Value::Utf8(common_name),
		}]);
		if let Some(unit) = &self.organizational_unit {
			name.push(vec![AttributeTypeAndValue {
				attribute_type: OID_ORGANIZATIONAL_UNIT.to_string(),
				value: Value::Utf8(unit.clone()),
			}]);
		}
		name
	}
}

fn signer_format(key: &PrivateKeyInfo) -> KeyFormat {
	if key.algorithm.algorithm == super::certificate::OID_RSA_ENCRYPTION {
		KeyFormat::Rsa2048
	} else {
		KeyFormat::Ecdsa256
	}
}

fn now_millis() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_or(0, |elapsed| elapsed.as_millis() as i64)
}

/// What to present to an inbound connection once its SNI is known.
#[derive(Debug, PartialEq)]
pub enum HandshakeDecision<'c> {
	/// Serve this certificate chain.
	Present {
		certificate: &'c HeldCertificate,
		intermediates: &'c [Certificate],
	},
	/// The host is listed insecure: proceed without presenting anything.
	Insecure,
	/// No certificate covers the connection.
	Decline,
}

/// Configuration of the certificates presented and trusted at the handshake
/// boundary. The SNI parser's output routes into
/// [`decide`](Self::decide); the handshake itself is a host concern.
#[derive(Clone, Debug, Default)]
pub struct HandshakeCertificatesConfig {
	/// The local certificate and the intermediates to present with it.
	pub held_certificate: Option<(HeldCertificate, Vec<Certificate>)>,
	pub trusted_certificates: Vec<Certificate>,
	pub add_platform_trusted_certificates: bool,
	/// Hostnames served without authentication. Localhost-style development
	/// escapes only; never a production setting.
	pub insecure_hosts: Vec<String>,
}

impl HandshakeCertificatesConfig {
	/// Chooses a handshake strategy for a connection whose ClientHello
	/// parsed to `server_names`.
	pub fn decide(&self, server_names: &BTreeMap<u8, ServerName>) -> HandshakeDecision<'_> {
		let host = server_names
			.get(&super::sni::NAME_TYPE_HOST_NAME)
			.and_then(|name| match name {
				ServerName::HostName(host) => Some(host.as_str()),
				ServerName::Opaque(_) => None,
			});

		if let Some(host) = host {
			if self.insecure_hosts.iter().any(|insecure| insecure == host) {
				return HandshakeDecision::Insecure
			}
		}

		match &self.held_certificate {
			Some((certificate, intermediates)) => HandshakeDecision::Present {
				certificate,
				intermediates,
			},
			None => HandshakeDecision::Decline,
		}
	}
}
