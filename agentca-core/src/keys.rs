// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Loading of OpenSSH public and private key files.
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use ssh_key::{AuthorizedKeys, PrivateKey, PublicKey};
use tracing::debug;

use crate::error::{CaError, Result};

const MAX_KEY_FILE_SIZE: u64 = 1024 * 1024;

fn read_key_file(path: &Path) -> Result<String> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CaError::Key(format!("failed to read {}: {}", path.display(), e)))?;
    if metadata.len() > MAX_KEY_FILE_SIZE {
        return Err(CaError::Key(format!("{} is too large", path.display())));
    }
    std::fs::read_to_string(path)
        .map_err(|e| CaError::Key(format!("failed to read {}: {}", path.display(), e)))
}

/// Parse every key in an `authorized_keys` style document. Options and
/// comments on each line are ignored.
pub fn parse_authorized_keys(content: &str) -> Result<Vec<PublicKey>> {
    let mut keys = Vec::new();
    for entry in AuthorizedKeys::new(content) {
        let entry = entry?;
        keys.push(entry.public_key().clone());
    }
    if keys.is_empty() {
        return Err(CaError::Key("no content in authorized keys file".into()));
    }
    Ok(keys)
}

pub fn load_authorized_keys(path: &Path) -> Result<Vec<PublicKey>> {
    let content = read_key_file(path)?;
    let keys = parse_authorized_keys(&content)?;
    debug!(path = %path.display(), count = keys.len(), "loaded authorized keys");
    Ok(keys)
}

/// Parse a single OpenSSH one-line public key, e.g. the contents of `id_ed25519.pub`.
pub fn parse_public_key(line: &str) -> Result<PublicKey> {
    Ok(PublicKey::from_openssh(line.trim())?)
}

/// Load an OpenSSH private key, asking for a passphrase only when the key
/// is encrypted.
pub fn load_private_key<F>(path: &Path, passphrase: F) -> Result<PrivateKey>
where
    F: FnOnce() -> Result<SecretString>,
{
    let content = read_key_file(path)?;
    decode_private_key(&content, &path.display().to_string(), passphrase)
}

pub fn decode_private_key<F>(content: &str, label: &str, passphrase: F) -> Result<PrivateKey>
where
    F: FnOnce() -> Result<SecretString>,
{
    let key = PrivateKey::from_openssh(content)
        .map_err(|e| CaError::Key(format!("{label} could not be parsed: {e}")))?;
    if !key.is_encrypted() {
        return Ok(key);
    }

    let passphrase = passphrase()?;
    if passphrase.expose_secret().is_empty() {
        return Err(CaError::KeyEncrypted(label.to_string()));
    }
    key.decrypt(passphrase.expose_secret())
        .map_err(|e| CaError::Key(format!("{label} could not be decrypted: {e}")))
}
