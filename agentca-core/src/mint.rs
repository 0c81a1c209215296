// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Short-lived user certificate minting.
//!
//! Every mint generates a fresh Ed25519 subject key, so the client's
//! long-term key never signs anything and the CA key never leaves this
//! process. Minting reads the registry and policy but never changes them,
//! so independent connections may mint concurrently.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use ssh_key::certificate::{Builder, CertType};
use ssh_key::private::Ed25519Keypair;
use ssh_key::public::KeyData;
use ssh_key::{Certificate, HashAlg, PrivateKey, PublicKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::MintError;
use crate::policy::CertificatePolicy;
use crate::registry::PrincipalRecord;

const NONCE_SIZE: usize = 32;
const FROM_FORMAT: &str = "%Y-%m-%dT%H:%M";
const TO_FORMAT: &str = "%Y-%m-%dT%H:%MUTC";

/// The long-lived certificate authority key, seen only as a capability.
pub trait CaSigner: Send + Sync {
    fn sign_certificate(&self, builder: Builder) -> Result<Certificate, MintError>;

    fn public_key(&self) -> PublicKey;
}

impl CaSigner for PrivateKey {
    fn sign_certificate(&self, builder: Builder) -> Result<Certificate, MintError> {
        builder
            .sign(self)
            .map_err(|e| MintError::Signing(e.to_string()))
    }

    fn public_key(&self) -> PublicKey {
        PrivateKey::public_key(self).clone()
    }
}

/// A signed certificate together with the ephemeral private key it
/// certifies. Lives only until it has been handed to the remote agent.
pub struct IssuedCertificate {
    keypair: Ed25519Keypair,
    certificate: Certificate,
    identifier: String,
}

impl IssuedCertificate {
    pub fn keypair(&self) -> &Ed25519Keypair {
        &self.keypair
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Used as both the certificate key id and the agent comment.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn valid_after(&self) -> u64 {
        self.certificate.valid_after()
    }

    pub fn valid_before(&self) -> u64 {
        self.certificate.valid_before()
    }

    /// Agent lifetime constraint, equal to the validity window.
    pub fn lifetime_secs(&self) -> u32 {
        u32::try_from(self.valid_before() - self.valid_after()).unwrap_or(u32::MAX)
    }

    pub fn principals(&self) -> &[String] {
        self.certificate.valid_principals()
    }
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("identifier", &self.identifier)
            .field("valid_after", &self.valid_after())
            .field("valid_before", &self.valid_before())
            .field("principals", &self.principals())
            .finish_non_exhaustive()
    }
}

pub fn certificate_identifier(
    organisation: &str,
    name: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> String {
    format!(
        "{}_{}_from:{}_to:{}",
        organisation,
        name,
        from.format(FROM_FORMAT),
        to.format(TO_FORMAT)
    )
}

pub fn mint(
    principal: &PrincipalRecord,
    policy: &CertificatePolicy,
    signer: &dyn CaSigner,
) -> Result<IssuedCertificate, MintError> {
    mint_at(principal, policy, signer, Utc::now())
}

pub fn mint_at(
    principal: &PrincipalRecord,
    policy: &CertificatePolicy,
    signer: &dyn CaSigner,
    now: DateTime<Utc>,
) -> Result<IssuedCertificate, MintError> {
    let mut rng = rand::rng();

    let mut seed = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut seed[..]);
    let keypair = Ed25519Keypair::from_seed(&seed);

    let valid_after = u64::try_from(now.timestamp())
        .map_err(|_| MintError::Window("clock is before the unix epoch".into()))?;
    let valid_before = valid_after
        .checked_add(policy.validity_secs())
        .ok_or_else(|| MintError::Window("validity overflows".into()))?;
    let from = DateTime::<Utc>::from_timestamp(now.timestamp(), 0)
        .ok_or_else(|| MintError::Window("valid_after out of range".into()))?;
    let to = i64::try_from(valid_before)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(|| MintError::Window("valid_before out of range".into()))?;

    let identifier = certificate_identifier(policy.organisation(), principal.name(), from, to);

    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let certificate_err = |e: ssh_key::Error| MintError::Certificate(e.to_string());
    let mut builder = Builder::new(
        nonce.to_vec(),
        KeyData::Ed25519(keypair.public),
        valid_after,
        valid_before,
    )
    .map_err(certificate_err)?;
    builder.serial(0).map_err(certificate_err)?;
    builder.cert_type(CertType::User).map_err(certificate_err)?;
    builder
        .key_id(identifier.clone())
        .map_err(certificate_err)?;
    for p in principal.principals() {
        builder.valid_principal(p.clone()).map_err(certificate_err)?;
    }
    for (name, value) in policy.extensions() {
        builder
            .extension(name.clone(), value.clone())
            .map_err(certificate_err)?;
    }
    builder
        .comment(identifier.clone())
        .map_err(certificate_err)?;

    let certificate = signer.sign_certificate(builder)?;

    debug!(
        user = principal.name(),
        ca = %signer.public_key().fingerprint(HashAlg::Sha256),
        valid_before,
        "certificate minted"
    );

    Ok(IssuedCertificate {
        keypair,
        certificate,
        identifier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use ssh_key::private::KeypairData;

    fn ca_key() -> PrivateKey {
        let keypair = Ed25519Keypair::from_seed(&[0xca; 32]);
        PrivateKey::new(KeypairData::Ed25519(keypair), "ca@agentca").unwrap()
    }

    fn alice() -> PrincipalRecord {
        let keypair = Ed25519Keypair::from_seed(&[1; 32]);
        PrincipalRecord::new(
            "alice",
            vec!["alice".into(), "ops".into()],
            Some(PublicKey::new(KeyData::Ed25519(keypair.public), "")),
            None,
        )
        .unwrap()
    }

    fn policy(validity: u32) -> CertificatePolicy {
        let mut extensions = BTreeMap::new();
        extensions.insert("permit-pty".to_string(), String::new());
        extensions.insert("permit-agent-forwarding".to_string(), String::new());
        CertificatePolicy::new("acme", validity, extensions, "banner").unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    struct FailingSigner;

    impl CaSigner for FailingSigner {
        fn sign_certificate(&self, _builder: Builder) -> Result<Certificate, MintError> {
            Err(MintError::Signing("hardware token unplugged".into()))
        }

        fn public_key(&self) -> PublicKey {
            CaSigner::public_key(&ca_key())
        }
    }

    #[test]
    fn test_mint_window_and_principals() {
        let ca = ca_key();
        let issued = mint_at(&alice(), &policy(60), &ca, fixed_now()).unwrap();

        assert_eq!(issued.valid_after(), 1_700_000_000);
        assert_eq!(issued.valid_before() - issued.valid_after(), 3600);
        assert_eq!(issued.lifetime_secs(), 3600);
        assert_eq!(issued.principals(), alice().principals());
        assert_eq!(issued.certificate().cert_type(), CertType::User);
    }

    #[test]
    fn test_mint_copies_extensions_verbatim() {
        let ca = ca_key();
        let policy = policy(5);
        let issued = mint_at(&alice(), &policy, &ca, fixed_now()).unwrap();

        let extensions: BTreeMap<String, String> = issued
            .certificate()
            .extensions()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(&extensions, policy.extensions());
        assert!(issued.certificate().critical_options().is_empty());
    }

    #[test]
    fn test_mint_identifier() {
        let ca = ca_key();
        let issued = mint_at(&alice(), &policy(60), &ca, fixed_now()).unwrap();
        assert_eq!(
            issued.identifier(),
            "acme_alice_from:2023-11-14T22:13_to:2023-11-14T23:13UTC"
        );
        assert_eq!(issued.certificate().key_id(), issued.identifier());
    }

    #[test]
    fn test_mint_signature_verifies_against_ca() {
        let ca = ca_key();
        let issued = mint_at(&alice(), &policy(60), &ca, fixed_now()).unwrap();
        let ca_fingerprint = ca.public_key().fingerprint(HashAlg::Sha256);

        issued
            .certificate()
            .validate_at(issued.valid_after() + 1, [&ca_fingerprint])
            .unwrap();
        assert!(issued
            .certificate()
            .validate_at(issued.valid_before() + 1, [&ca_fingerprint])
            .is_err());
    }

    #[test]
    fn test_mint_generates_fresh_keys() {
        let ca = ca_key();
        let a = mint_at(&alice(), &policy(60), &ca, fixed_now()).unwrap();
        let b = mint_at(&alice(), &policy(60), &ca, fixed_now()).unwrap();
        assert_ne!(a.keypair().public, b.keypair().public);
        assert_ne!(a.keypair().public.0, alice().public_key().key_data().ed25519().unwrap().0);
    }

    #[test]
    fn test_signing_failure_is_surfaced() {
        let err = mint_at(&alice(), &policy(60), &FailingSigner, fixed_now()).unwrap_err();
        assert_eq!(err, MintError::Signing("hardware token unplugged".into()));
    }

    #[test]
    fn test_debug_does_not_print_key_material() {
        let ca = ca_key();
        let issued = mint_at(&alice(), &policy(60), &ca, fixed_now()).unwrap();
        let printed = format!("{issued:?}");
        assert!(printed.contains("acme_alice"));
        assert!(!printed.contains("keypair"));
    }
}
