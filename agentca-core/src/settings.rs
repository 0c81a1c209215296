// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The settings document: certificate policy plus the principal registry.
//!
//! ```toml
//! validity = 480
//! organisation = "acme"
//! banner = "acme certificate authority"
//!
//! [extensions]
//! permit-pty = ""
//!
//! [[user_principals]]
//! name = "alice"
//! principals = ["alice", "ops"]
//! public_key = "ssh-ed25519 AAAA... alice@laptop"
//! ```
//!
//! A record may carry its key inline, a `fingerprint` referring to a key in
//! the authorized keys file, or both, in which case they must agree.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use ssh_key::PublicKey;
use tracing::{debug, info};

use crate::error::{CaError, ConfigError};
use crate::fingerprint::{self, PublicKeyIdentity};
use crate::policy::{self, CertificatePolicy};
use crate::registry::{AuthorizationRegistry, PrincipalRecord};

const MAX_SETTINGS_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsDocument {
    validity: i64,
    organisation: String,
    #[serde(default)]
    banner: String,
    #[serde(default)]
    extensions: BTreeMap<String, String>,
    #[serde(default)]
    user_principals: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UserEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    principals: Vec<String>,
    #[serde(default, alias = "sshpublickey")]
    public_key: Option<String>,
    #[serde(default)]
    fingerprint: Option<String>,
}

/// A fully validated settings document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub registry: AuthorizationRegistry,
    pub policy: CertificatePolicy,
}

impl Settings {
    pub fn into_parts(self) -> (AuthorizationRegistry, CertificatePolicy) {
        (self.registry, self.policy)
    }
}

/// Read and validate a settings file. `authorized_keys`, when given, is
/// cross-referenced against the registry.
pub fn load(path: &Path, authorized_keys: Option<&[PublicKey]>) -> Result<Settings, CaError> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > MAX_SETTINGS_FILE_SIZE {
        return Err(ConfigError::TooLarge.into());
    }
    let content = std::fs::read_to_string(path)?;
    let settings = parse(&content, authorized_keys)?;
    info!(
        path = %path.display(),
        users = settings.registry.len(),
        validity_minutes = settings.policy.validity_minutes(),
        "settings loaded"
    );
    Ok(settings)
}

pub fn parse(content: &str, authorized_keys: Option<&[PublicKey]>) -> Result<Settings, ConfigError> {
    if content.len() as u64 > MAX_SETTINGS_FILE_SIZE {
        return Err(ConfigError::TooLarge);
    }
    let doc: SettingsDocument =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.message().to_string()))?;

    let policy = build_policy(&doc)?;

    let known: HashMap<String, &PublicKey> = authorized_keys
        .unwrap_or_default()
        .iter()
        .map(|key| (PublicKeyIdentity::fingerprint(key), key))
        .collect();

    let mut records = Vec::with_capacity(doc.user_principals.len());
    for entry in doc.user_principals {
        records.push(build_record(entry, &known)?);
    }
    let registry = AuthorizationRegistry::from_records(records)?;

    if let Some(keys) = authorized_keys {
        for key in keys {
            let fp = PublicKeyIdentity::fingerprint(key);
            if !registry.contains(&fp) {
                return Err(ConfigError::UnmatchedAuthorizedKey(fp));
            }
        }
    }

    debug!(users = registry.len(), "registry built");
    Ok(Settings { registry, policy })
}

fn build_policy(doc: &SettingsDocument) -> Result<CertificatePolicy, ConfigError> {
    if doc.validity <= 0 {
        return Err(ConfigError::ValidityNotPositive);
    }
    let validity = u32::try_from(doc.validity)
        .map_err(|_| ConfigError::ValidityTooLong(policy::MAX_VALIDITY_MINUTES))?;
    CertificatePolicy::new(
        doc.organisation.clone(),
        validity,
        doc.extensions.clone(),
        doc.banner.clone(),
    )
}

fn build_record(
    entry: UserEntry,
    known: &HashMap<String, &PublicKey>,
) -> Result<PrincipalRecord, ConfigError> {
    let public_key = match (&entry.public_key, &entry.fingerprint) {
        (Some(line), _) => Some(PublicKey::from_openssh(line.trim()).map_err(|e| {
            ConfigError::InvalidPublicKey {
                user: entry.name.clone(),
                reason: e.to_string(),
            }
        })?),
        (None, Some(fp)) if fingerprint::is_well_formed(fp) => {
            known.get(fp.as_str()).map(|key| (*key).clone())
        }
        _ => None,
    };

    PrincipalRecord::new(
        entry.name,
        entry.principals,
        public_key,
        entry.fingerprint.as_deref(),
    )
}
