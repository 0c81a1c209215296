// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;
use std::sync::Arc;

use ssh_key::HashAlg;
use tracing::{debug, info};

use agentca_core::error::{CaError, Result};
use agentca_core::{keys, settings};
use agentca_server::{load_host_key, Server, ServerConfig};

use crate::config::Config;
use crate::output::Output;

use super::{
    ensure_file, get_passphrase, load_authorized_keys, CA_KEY_PASSPHRASE_ENV,
    HOST_KEY_PASSPHRASE_ENV,
};

pub(crate) struct ServeArgs {
    pub host_key: PathBuf,
    pub ca_key: PathBuf,
    pub authorized_keys: Option<PathBuf>,
    pub ip_address: Option<String>,
    pub port: Option<u16>,
    pub settings: PathBuf,
}

pub(crate) fn cmd_serve(out: &Output, cfg: &Config, args: ServeArgs) -> Result<()> {
    ensure_file(&args.settings, "settings")?;
    ensure_file(&args.host_key, "host key")?;
    ensure_file(&args.ca_key, "CA key")?;

    let authorized = load_authorized_keys(args.authorized_keys, cfg)?;
    let (registry, policy) = settings::load(&args.settings, authorized.as_deref())?.into_parts();

    // Both keys are decrypted before the runtime exists so passphrase
    // environment variables are removed while the process is single threaded.
    let host_key = load_host_key(&args.host_key, || {
        get_passphrase(HOST_KEY_PASSPHRASE_ENV, "Host key passphrase")
    })?;
    let ca_key = keys::load_private_key(&args.ca_key, || {
        get_passphrase(CA_KEY_PASSPHRASE_ENV, "CA key passphrase")
    })?;
    let ca_fingerprint = ca_key.public_key().fingerprint(HashAlg::Sha256).to_string();

    let config = ServerConfig {
        listen_address: args
            .ip_address
            .unwrap_or_else(|| cfg.listen_address().to_string()),
        port: args.port.unwrap_or_else(|| cfg.port()),
        completion_timeout: cfg.completion_timeout(),
        inactivity_timeout: cfg.inactivity_timeout(),
        ..ServerConfig::default()
    };
    let addr = config.addr();

    out.header(&format!("Certificate authority for {}", policy.organisation()));
    out.field("Users", &registry.len().to_string());
    out.field("Validity", &format!("{} minutes", policy.validity_minutes()));
    out.key_field("CA", &ca_fingerprint);
    out.field("Listening", &addr);
    out.newline();

    debug!(users = registry.len(), %addr, "starting server");
    let server = Server::new(host_key, registry, policy, Arc::new(ca_key), config);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CaError::Other(format!("tokio: {}", e)))?;

    rt.block_on(async {
        tokio::select! {
            result = server.run() => result.map_err(CaError::from),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("shutting down");
                Ok(())
            }
        }
    })
}
