// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

/// A settings document that fails validation. Loading is atomic: any of
/// these aborts the whole load and no partial registry is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no valid users found in settings")]
    NoUsers,

    #[error("user provided with empty name")]
    EmptyName,

    #[error("user {0} provided with no principals")]
    NoPrincipals(String),

    #[error("user {0} has no public key")]
    MissingPublicKey(String),

    #[error("user {user} has an invalid public key: {reason}")]
    InvalidPublicKey { user: String, reason: String },

    #[error("user {user} has malformed fingerprint {fingerprint}")]
    MalformedFingerprint { user: String, fingerprint: String },

    #[error("user {0} public key mismatch")]
    FingerprintMismatch(String),

    #[error("user {0} key already exists")]
    DuplicateFingerprint(String),

    #[error("validity must be >0")]
    ValidityNotPositive,

    #[error("validity must be <={0}")]
    ValidityTooLong(u32),

    #[error("extension {0} not permitted")]
    ExtensionNotPermitted(String),

    #[error("value '{value}' for extension {name} not permitted, expected ''")]
    ExtensionValue { name: String, value: String },

    #[error("authorized key {0} has no matching user")]
    UnmatchedAuthorizedKey(String),

    #[error("settings file too large")]
    TooLarge,

    #[error("settings parse error: {0}")]
    Parse(String),
}

/// Failure while building or signing a user certificate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MintError {
    #[error("minting aborted: {0}")]
    Aborted(String),

    #[error("invalid validity window: {0}")]
    Window(String),

    #[error("could not build certificate: {0}")]
    Certificate(String),

    #[error("cert signing error: {0}")]
    Signing(String),
}

#[derive(Error, Debug)]
pub enum CaError {
    #[error("Settings could not be loaded: {0}")]
    Config(#[from] ConfigError),

    #[error("Mint error: {0}")]
    Mint(#[from] MintError),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Key {0} is encrypted and no passphrase was provided")]
    KeyEncrypted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<ssh_key::Error> for CaError {
    fn from(e: ssh_key::Error) -> Self {
        CaError::Key(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CaError>;
