// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use agentca_core::error::{CaError, MintError};
use ssh_agent_lib::error::AgentError;
use thiserror::Error;

/// Failure talking to the client's forwarded agent.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("agent request failed: {0}")]
    Agent(#[from] AgentError),
}

/// Per-connection failure. Never fatal to the listener.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("unknown public key {fingerprint} for user {user}")]
    Unauthorized { fingerprint: String, user: String },

    #[error("could not open agent channel: {0}")]
    AgentChannel(String),

    #[error(transparent)]
    Mint(#[from] MintError),

    #[error("agent delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("timed out waiting for certificate delivery")]
    TimedOut,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session cancelled")]
    Cancelled,
}

impl From<russh::Error> for SessionError {
    fn from(e: russh::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}

/// Startup failure. These end the process.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host key error: {0}")]
    HostKey(String),

    #[error(transparent)]
    Ca(#[from] CaError),
}

impl From<ServerError> for CaError {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::Ca(inner) => inner,
            other => CaError::Other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// The only text derived from an error that ever reaches a client.
pub fn sanitize_error_for_client(e: &SessionError) -> &'static str {
    match e {
        SessionError::Unauthorized { .. } => "authentication failed",
        SessionError::AgentChannel(_) => "agent forwarding required",
        SessionError::Mint(_)
        | SessionError::Delivery(_)
        | SessionError::TimedOut
        | SessionError::Cancelled => "certificate creation error",
        SessionError::Transport(_) => "connection error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_error(msg: &str) -> DeliveryError {
        AgentError::from(std::io::Error::other(msg.to_string())).into()
    }

    #[test]
    fn test_sanitized_errors_hide_detail() {
        let errors = [
            SessionError::Unauthorized {
                fingerprint: "SHA256:abc".into(),
                user: "root".into(),
            },
            SessionError::Mint(MintError::Signing("pkcs11 slot 3 locked".into())),
            SessionError::Delivery(agent_error("agent socket 99 closed")),
            SessionError::Transport("broken pipe".into()),
        ];
        for e in &errors {
            let text = sanitize_error_for_client(e);
            assert!(!text.contains("SHA256"));
            assert!(!text.contains("pkcs11"));
            assert!(!text.contains("socket"));
            assert!(!text.contains("pipe"));
        }
    }

    #[test]
    fn test_completion_failures_share_one_message() {
        assert_eq!(
            sanitize_error_for_client(&SessionError::TimedOut),
            "certificate creation error"
        );
        assert_eq!(
            sanitize_error_for_client(&SessionError::Delivery(agent_error("refused"))),
            "certificate creation error"
        );
    }

    #[test]
    fn test_bind_error_message() {
        let e = ServerError::Bind {
            addr: "0.0.0.0:22".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(e.to_string().starts_with("failed to listen on 0.0.0.0:22"));

        let wrapped: CaError = e.into();
        assert!(matches!(wrapped, CaError::Other(_)));
    }
}
