// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical public key fingerprints.
//!
//! Fingerprints follow the OpenSSH `SHA256:` form: the prefix followed by
//! the unpadded base64 encoding of a SHA-256 digest of the key blob.

use ssh_key::{HashAlg, PublicKey};

pub const FINGERPRINT_PREFIX: &str = "SHA256:";

/// Length of the unpadded base64 encoding of a 32-byte digest.
const DIGEST_B64_LEN: usize = 43;

pub const FINGERPRINT_LEN: usize = FINGERPRINT_PREFIX.len() + DIGEST_B64_LEN;

/// Anything that can name itself by canonical fingerprint.
///
/// The registry only ever looks keys up through this trait, so transport
/// libraries with their own key types can be authorized without
/// converting key material.
pub trait PublicKeyIdentity {
    fn fingerprint(&self) -> String;
}

impl PublicKeyIdentity for PublicKey {
    fn fingerprint(&self) -> String {
        PublicKey::fingerprint(self, HashAlg::Sha256).to_string()
    }
}

impl<T: PublicKeyIdentity + ?Sized> PublicKeyIdentity for &T {
    fn fingerprint(&self) -> String {
        (**self).fingerprint()
    }
}

/// Check the fixed `SHA256:<43 base64 chars>` shape without decoding.
pub fn is_well_formed(fingerprint: &str) -> bool {
    let Some(digest) = fingerprint.strip_prefix(FINGERPRINT_PREFIX) else {
        return false;
    };
    digest.len() == DIGEST_B64_LEN
        && digest
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}
