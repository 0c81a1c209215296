// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authorized principals, indexed by public key fingerprint.

use std::collections::HashMap;
use std::sync::Arc;

use ssh_key::PublicKey;

use crate::error::ConfigError;
use crate::fingerprint::{self, PublicKeyIdentity};

/// One authorized identity and the login principals its certificates carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalRecord {
    name: String,
    principals: Vec<String>,
    fingerprint: String,
    public_key: PublicKey,
}

impl PrincipalRecord {
    /// Build a validated record. When `declared_fingerprint` is given it must
    /// match the key; otherwise the fingerprint is computed from the key.
    pub fn new(
        name: impl Into<String>,
        principals: Vec<String>,
        public_key: Option<PublicKey>,
        declared_fingerprint: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let mut unique: Vec<String> = Vec::with_capacity(principals.len());
        for p in principals {
            if !p.is_empty() && !unique.contains(&p) {
                unique.push(p);
            }
        }
        if unique.is_empty() {
            return Err(ConfigError::NoPrincipals(name));
        }

        if let Some(declared) = declared_fingerprint {
            if !fingerprint::is_well_formed(declared) {
                return Err(ConfigError::MalformedFingerprint {
                    user: name,
                    fingerprint: declared.to_string(),
                });
            }
        }

        let public_key = public_key.ok_or_else(|| ConfigError::MissingPublicKey(name.clone()))?;
        let computed = PublicKeyIdentity::fingerprint(&public_key);

        if let Some(declared) = declared_fingerprint {
            if declared != computed {
                return Err(ConfigError::FingerprintMismatch(name));
            }
        }

        Ok(Self {
            name,
            principals: unique,
            fingerprint: computed,
            public_key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn principals(&self) -> &[String] {
        &self.principals
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

/// Read-only fingerprint index. Built once at startup and shared between
/// connections without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRegistry {
    by_fingerprint: HashMap<String, Arc<PrincipalRecord>>,
    order: Vec<String>,
}

impl AuthorizationRegistry {
    pub fn from_records(records: Vec<PrincipalRecord>) -> Result<Self, ConfigError> {
        if records.is_empty() {
            return Err(ConfigError::NoUsers);
        }

        let mut by_fingerprint = HashMap::with_capacity(records.len());
        let mut order = Vec::with_capacity(records.len());
        for record in records {
            if by_fingerprint.contains_key(record.fingerprint()) {
                return Err(ConfigError::DuplicateFingerprint(record.name));
            }
            order.push(record.fingerprint.clone());
            by_fingerprint.insert(record.fingerprint.clone(), Arc::new(record));
        }

        Ok(Self {
            by_fingerprint,
            order,
        })
    }

    pub fn get(&self, fingerprint: &str) -> Option<Arc<PrincipalRecord>> {
        self.by_fingerprint.get(fingerprint).cloned()
    }

    pub fn lookup(&self, key: &impl PublicKeyIdentity) -> Option<Arc<PrincipalRecord>> {
        self.get(&key.fingerprint())
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.by_fingerprint.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }

    /// Records in settings order.
    pub fn records(&self) -> impl Iterator<Item = &PrincipalRecord> {
        self.order
            .iter()
            .filter_map(|fp| self.by_fingerprint.get(fp).map(Arc::as_ref))
    }
}
