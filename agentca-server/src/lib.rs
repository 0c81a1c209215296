// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

#![forbid(unsafe_code)]

pub mod agent;
pub mod error;
pub mod gate;
pub mod host_key;
pub mod server;
pub mod session;
pub mod state;

pub use agent::{deliver, AgentClient, RemoteAgent};
pub use error::{sanitize_error_for_client, DeliveryError, Result, ServerError, SessionError};
pub use gate::{Gate, TransportKey};
pub use host_key::load_host_key;
pub use server::{Server, ServerConfig};
pub use session::{Connection, ExitStatus, Orchestrator, Terminal};
pub use state::{SessionState, StateTracker};
