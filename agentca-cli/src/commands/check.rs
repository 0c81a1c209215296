// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::{Path, PathBuf};

use agentca_core::error::Result;
use agentca_core::settings;

use crate::config::Config;
use crate::output::Output;

use super::{ensure_file, load_authorized_keys};

pub(crate) fn cmd_check(
    out: &Output,
    cfg: &Config,
    authorized_keys: Option<PathBuf>,
    settings_path: &Path,
) -> Result<()> {
    ensure_file(settings_path, "settings")?;
    let authorized = load_authorized_keys(authorized_keys, cfg)?;
    let settings = settings::load(settings_path, authorized.as_deref())?;
    let policy = &settings.policy;

    out.header("Policy");
    out.field("Organisation", policy.organisation());
    out.field("Validity", &format!("{} minutes", policy.validity_minutes()));
    let extensions: Vec<&str> = policy.extensions().keys().map(String::as_str).collect();
    if extensions.is_empty() {
        out.field("Extensions", "(none)");
    } else {
        out.field("Extensions", &extensions.join(", "));
    }
    if !policy.banner().is_empty() {
        out.field("Banner", policy.banner());
    }

    out.principals_header();
    for record in settings.registry.records() {
        out.principal_row(record.name(), record.principals(), record.fingerprint());
    }
    out.newline();

    if authorized.is_some() {
        out.success("settings valid; every authorized key maps to a user");
    } else {
        out.success("settings valid");
    }
    Ok(())
}
