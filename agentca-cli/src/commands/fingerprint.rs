// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::Path;

use agentca_core::error::Result;
use agentca_core::{keys, PublicKeyIdentity};

use crate::output::Output;

use super::ensure_file;

/// Accepts a single `.pub` file or a whole authorized_keys file.
pub(crate) fn cmd_fingerprint(out: &Output, path: &Path) -> Result<()> {
    ensure_file(path, "public key")?;
    for key in keys::load_authorized_keys(path)? {
        let fingerprint = PublicKeyIdentity::fingerprint(&key);
        let comment = key.comment();
        if comment.is_empty() {
            out.info(&fingerprint);
        } else {
            out.info(&format!("{} {}", fingerprint, comment));
        }
    }
    Ok(())
}
