// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agentca")]
#[command(about = "SSH certificate authority that issues short-lived certificates into forwarded agents")]
#[command(version)]
pub(crate) struct Cli {
    #[arg(long, global = true, help = "Daemon config file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the certificate authority server
    Serve {
        #[arg(short = 't', long, help = "Server host private key")]
        host_key: PathBuf,
        #[arg(short = 'c', long, help = "Certificate authority private key")]
        ca_key: PathBuf,
        #[arg(short = 'a', long, help = "authorized_keys file to cross-check")]
        authorized_keys: Option<PathBuf>,
        #[arg(short = 'i', long, help = "Address to listen on")]
        ip_address: Option<String>,
        #[arg(short = 'p', long, help = "Port to listen on")]
        port: Option<u16>,
        settings: PathBuf,
    },
    /// Validate a settings file and print what it grants
    Check {
        #[arg(short = 'a', long)]
        authorized_keys: Option<PathBuf>,
        settings: PathBuf,
    },
    /// Print SHA256 fingerprints of the keys in a public key file
    Fingerprint { public_key: PathBuf },
}
