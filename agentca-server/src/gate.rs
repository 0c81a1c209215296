// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use agentca_core::{AuthorizationRegistry, PrincipalRecord, PublicKeyIdentity};
use russh::keys::ssh_key::HashAlg;
use tracing::{info, warn};

use crate::error::SessionError;

/// A key presented by the SSH transport.
pub struct TransportKey<'a>(pub &'a russh::keys::ssh_key::PublicKey);

impl PublicKeyIdentity for TransportKey<'_> {
    fn fingerprint(&self) -> String {
        self.0.fingerprint(HashAlg::Sha256).to_string()
    }
}

/// Public key authorization against the registry.
#[derive(Debug, Clone)]
pub struct Gate {
    registry: Arc<AuthorizationRegistry>,
}

impl Gate {
    pub fn new(registry: Arc<AuthorizationRegistry>) -> Self {
        Self { registry }
    }

    /// Cheap check used before the client proves possession of the key.
    pub fn is_known(&self, presented: &impl PublicKeyIdentity) -> bool {
        self.registry.contains(&presented.fingerprint())
    }

    /// `user` is the SSH login name. It is logged but plays no part in
    /// the decision.
    pub fn authorize(
        &self,
        presented: &impl PublicKeyIdentity,
        user: &str,
    ) -> Result<Arc<PrincipalRecord>, SessionError> {
        let fingerprint = presented.fingerprint();
        match self.registry.get(&fingerprint) {
            Some(record) => {
                info!(
                    user,
                    principal = record.name(),
                    fingerprint = %fingerprint,
                    "user logged in"
                );
                Ok(record)
            }
            None => {
                warn!(user, fingerprint = %fingerprint, "unknown public key");
                Err(SessionError::Unauthorized {
                    fingerprint,
                    user: user.to_string(),
                })
            }
        }
    }
}
