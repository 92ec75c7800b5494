// SPDX-License-Identifier: Apache-2.0

//! The TLS boundary: X.509 certificate and PKCS#8 key schemas over the DER
//! framework, PEM interop, held (local) certificates with a delegated crypto
//! provider, and the ClientHello parser used to route inbound connections by
//! server name before a handshake runs.

pub mod certificate;
mod held;
mod pem;
mod sni;

pub use held::*;
pub use pem::*;
pub use sni::*;
