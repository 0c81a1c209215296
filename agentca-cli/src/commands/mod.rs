// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod check;
pub mod fingerprint;
pub mod serve;

use std::path::{Path, PathBuf};

use dialoguer::{theme::ColorfulTheme, Password};
use secrecy::SecretString;
use ssh_key::PublicKey;
use tracing::debug;

use agentca_core::error::{CaError, Result};
use agentca_core::keys;

use crate::config::Config;

pub const HOST_KEY_PASSPHRASE_ENV: &str = "AGENTCA_HOST_KEY_PASSPHRASE";
pub const CA_KEY_PASSPHRASE_ENV: &str = "AGENTCA_CA_KEY_PASSPHRASE";

fn warn_env_passphrase(var_name: &str) {
    tracing::warn!(
        "Using passphrase from {} environment variable. \
         Environment variables may be visible to other processes via /proc on Linux.",
        var_name
    );
}

/// Take a passphrase from the environment, removing it so child processes
/// and later readers never see it. Must run before the runtime starts
/// worker threads.
fn passphrase_from_env(var_name: &str) -> Option<SecretString> {
    let value = std::env::var(var_name).ok()?;
    std::env::remove_var(var_name);
    debug!("using passphrase from {} env var", var_name);
    warn_env_passphrase(var_name);
    Some(SecretString::from(value))
}

fn read_passphrase(prompt: &str) -> Result<String> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()
        .map_err(|e| CaError::Other(format!("Failed to read passphrase: {}", e)))
}

pub fn get_passphrase(env_var: &str, prompt: &str) -> Result<SecretString> {
    if let Some(pw) = passphrase_from_env(env_var) {
        return Ok(pw);
    }
    read_passphrase(prompt).map(SecretString::from)
}

/// The authorized keys path from the command line, else from the config.
pub(crate) fn load_authorized_keys(
    flag: Option<PathBuf>,
    cfg: &Config,
) -> Result<Option<Vec<PublicKey>>> {
    match flag.or_else(|| cfg.authorized_keys.clone()) {
        Some(path) => Ok(Some(keys::load_authorized_keys(&path)?)),
        None => Ok(None),
    }
}

pub(crate) fn ensure_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CaError::Other(format!(
            "{} file {} not found",
            what,
            path.display()
        )))
    }
}
