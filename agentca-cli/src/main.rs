// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

#![deny(unsafe_code)]

mod cli;
mod commands;
mod config;
mod output;
mod panic;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use agentca_core::error::Result;

use crate::cli::{Cli, Commands};
use crate::commands::serve::ServeArgs;
use crate::config::{Config, LogLevel};
use crate::output::Output;

fn init_logging(level: LogLevel) {
    let use_json = std::env::var("AGENTCA_LOG_JSON").is_ok();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if use_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_span_events(FmtSpan::CLOSE)
            .init();
    }
}

fn main() {
    let cli = Cli::parse();
    let out = Output::new();

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            out.error(&e.to_string());
            std::process::exit(1);
        }
    };

    init_logging(cfg.log_level);
    panic::install();

    if let Err(e) = run(&out, cli, &cfg) {
        out.error(&e.to_string());
        std::process::exit(1);
    }
}

#[tracing::instrument(skip_all)]
fn run(out: &Output, cli: Cli, cfg: &Config) -> Result<()> {
    debug!(log_level = %cfg.log_level, "starting command");

    match cli.command {
        Commands::Serve {
            host_key,
            ca_key,
            authorized_keys,
            ip_address,
            port,
            settings,
        } => commands::serve::cmd_serve(
            out,
            cfg,
            ServeArgs {
                host_key,
                ca_key,
                authorized_keys,
                ip_address,
                port,
                settings,
            },
        ),
        Commands::Check {
            authorized_keys,
            settings,
        } => commands::check::cmd_check(out, cfg, authorized_keys, &settings),
        Commands::Fingerprint { public_key } => {
            commands::fingerprint::cmd_fingerprint(out, &public_key)
        }
    }
}
