// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide certificate policy.

use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Upper bound on certificate validity: 24 hours.
pub const MAX_VALIDITY_MINUTES: u32 = 24 * 60;

/// Standard user-certificate extensions from OpenSSH PROTOCOL.certkeys.
/// Each one carries only the empty string as its value.
pub const PERMITTED_EXTENSIONS: &[&str] = &[
    "permit-agent-forwarding",
    "permit-port-forwarding",
    "permit-pty",
    "permit-X11-forwarding",
    "permit-user-rc",
];

const PERMITTED_EXTENSION_VALUE: &str = "";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePolicy {
    organisation: String,
    validity_minutes: u32,
    extensions: BTreeMap<String, String>,
    banner: String,
}

impl CertificatePolicy {
    pub fn new(
        organisation: impl Into<String>,
        validity_minutes: u32,
        extensions: BTreeMap<String, String>,
        banner: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        validate_validity(validity_minutes)?;
        validate_extensions(&extensions)?;
        Ok(Self {
            organisation: organisation.into(),
            validity_minutes,
            extensions,
            banner: banner.into(),
        })
    }

    pub fn organisation(&self) -> &str {
        &self.organisation
    }

    pub fn validity_minutes(&self) -> u32 {
        self.validity_minutes
    }

    /// Validity window length, also used as the agent lifetime constraint.
    pub fn validity_secs(&self) -> u64 {
        u64::from(self.validity_minutes) * 60
    }

    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }
}

pub fn validate_validity(minutes: u32) -> Result<(), ConfigError> {
    if minutes == 0 {
        return Err(ConfigError::ValidityNotPositive);
    }
    if minutes > MAX_VALIDITY_MINUTES {
        return Err(ConfigError::ValidityTooLong(MAX_VALIDITY_MINUTES));
    }
    Ok(())
}

pub fn validate_extensions(extensions: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for (name, value) in extensions {
        if !PERMITTED_EXTENSIONS.contains(&name.as_str()) {
            return Err(ConfigError::ExtensionNotPermitted(name.clone()));
        }
        if value != PERMITTED_EXTENSION_VALUE {
            return Err(ConfigError::ExtensionValue {
                name: name.clone(),
                value: value.clone(),
            });
        }
    }
    Ok(())
}
