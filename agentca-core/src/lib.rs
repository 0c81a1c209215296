// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! agentca core: principal registry, certificate policy and minting of
//! short-lived OpenSSH user certificates.

#![forbid(unsafe_code)]

pub mod error;
pub mod fingerprint;
pub mod keys;
pub mod mint;
pub mod policy;
pub mod registry;
pub mod settings;

pub use error::{CaError, ConfigError, MintError, Result};
pub use fingerprint::PublicKeyIdentity;
pub use mint::{mint, mint_at, CaSigner, IssuedCertificate};
pub use policy::CertificatePolicy;
pub use registry::{AuthorizationRegistry, PrincipalRecord};
pub use settings::Settings;
