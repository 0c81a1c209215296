// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::Path;

use russh::keys::ssh_key::PrivateKey;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::{Result, ServerError};

const MAX_HOST_KEY_SIZE: u64 = 64 * 1024;

/// Load the server's host key, asking for a passphrase only if the key is
/// encrypted.
pub fn load_host_key<F>(path: &Path, passphrase: F) -> Result<PrivateKey>
where
    F: FnOnce() -> agentca_core::Result<SecretString>,
{
    let label = path.display().to_string();
    let metadata = std::fs::metadata(path)
        .map_err(|e| ServerError::HostKey(format!("failed to read {label}: {e}")))?;
    if metadata.len() > MAX_HOST_KEY_SIZE {
        return Err(ServerError::HostKey(format!("{label} is too large")));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ServerError::HostKey(format!("failed to read {label}: {e}")))?;
    let key = decode_host_key(&content, &label, passphrase)?;
    debug!(path = %label, algorithm = %key.algorithm(), "host key loaded");
    Ok(key)
}

pub fn decode_host_key<F>(content: &str, label: &str, passphrase: F) -> Result<PrivateKey>
where
    F: FnOnce() -> agentca_core::Result<SecretString>,
{
    match russh::keys::decode_secret_key(content, None) {
        Ok(key) => Ok(key),
        Err(russh::keys::Error::KeyIsEncrypted) => {
            let passphrase = passphrase()?;
            if passphrase.expose_secret().is_empty() {
                return Err(ServerError::HostKey(format!(
                    "{label} is encrypted and no passphrase was provided"
                )));
            }
            russh::keys::decode_secret_key(content, Some(passphrase.expose_secret()))
                .map_err(|e| ServerError::HostKey(format!("{label} could not be decrypted: {e}")))
        }
        Err(e) => Err(ServerError::HostKey(format!("{label} could not be parsed: {e}"))),
    }
}
