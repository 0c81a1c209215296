// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-connection orchestration of issuance and terminal feedback.
//!
//! Two tasks run for every authenticated connection. The issuance task
//! opens the agent channel and mints the certificate, delivers it once the
//! client has asked for agent forwarding, and sends the outcome through a
//! oneshot. The terminal task greets the user once
//! the agent channel is open, waits for that outcome and reports it before
//! closing the connection. Both stop when the connection's cancellation
//! token fires.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agentca_core::{mint, CaSigner, CertificatePolicy, MintError, PrincipalRecord};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{self, AgentClient, RemoteAgent};
use crate::error::{sanitize_error_for_client, SessionError};
use crate::state::{SessionState, StateTracker};

pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

pub const UNSUPPORTED_REQUEST: &str = "request type not supported";
const SUCCESS_LINES: &[&str] = &[
    "certificate generation complete",
    "run 'ssh-add -l' to view",
    "goodbye",
];
const GOODBYE: &str = "goodbye";

pub type Completion = Result<(), SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    pub fn code(self) -> u32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
        }
    }
}

/// The authenticated transport connection.
pub trait Connection: Send + Sync + 'static {
    type AgentStream: fmt::Debug + AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static;

    fn open_agent_channel(
        &self,
    ) -> impl Future<Output = Result<Self::AgentStream, SessionError>> + Send;

    fn disconnect(&self, reason: &str) -> impl Future<Output = ()> + Send;
}

/// The interactive session channel.
pub trait Terminal: Send + 'static {
    fn write_line(&mut self, line: &str) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Send the exit status, then EOF and close.
    fn finish(&mut self, status: ExitStatus)
        -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Shared, read-only context for both per-connection tasks.
#[derive(Clone)]
pub struct Orchestrator {
    principal: Arc<PrincipalRecord>,
    policy: Arc<CertificatePolicy>,
    signer: Arc<dyn CaSigner>,
    state: Arc<StateTracker>,
    cancel: CancellationToken,
    completion_timeout: Duration,
    forwarding: Arc<Notify>,
}

impl Orchestrator {
    pub fn new(
        principal: Arc<PrincipalRecord>,
        policy: Arc<CertificatePolicy>,
        signer: Arc<dyn CaSigner>,
        state: Arc<StateTracker>,
        cancel: CancellationToken,
        completion_timeout: Duration,
    ) -> Self {
        Self {
            principal,
            policy,
            signer,
            state,
            cancel,
            completion_timeout,
            forwarding: Arc::new(Notify::new()),
        }
    }

    pub fn principal(&self) -> &PrincipalRecord {
        &self.principal
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    /// The client sent `auth-agent-req@openssh.com`. Delivery waits for this.
    pub fn forwarding_requested(&self) {
        self.forwarding.notify_one();
    }

    /// Issuance task body. Sends exactly one completion unless the agent
    /// channel cannot be opened or the connection is cancelled first.
    pub async fn issue<C: Connection>(&self, conn: &C, completion: oneshot::Sender<Completion>) {
        self.state.advance(SessionState::AgentChannelOpening);

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            r = conn.open_agent_channel() => r,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.state.advance(SessionState::AgentChannelFailed);
                warn!(user = self.principal.name(), error = %e, "could not open agent channel");
                conn.disconnect(sanitize_error_for_client(&e)).await;
                self.cancel.cancel();
                return;
            }
        };
        self.state.advance(SessionState::AgentChannelOpen);

        let mut agent = AgentClient::new(stream);
        self.state.advance(SessionState::Minting);
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
            r = self.mint_and_deliver(&mut agent) => r,
        };

        match &result {
            Ok(()) => {
                self.state.advance(SessionState::MintSucceeded);
                info!(
                    user = self.principal.name(),
                    validity_minutes = self.policy.validity_minutes(),
                    "certificate creation and insertion in agent done"
                );
            }
            Err(SessionError::Cancelled) => {
                debug!(user = self.principal.name(), "issuance cancelled");
            }
            Err(e) => {
                self.state.advance(SessionState::MintFailed);
                warn!(user = self.principal.name(), error = %e, "certificate creation error");
            }
        }

        if completion.send(result).is_err() {
            debug!("terminal task gone before completion");
        }
    }

    /// Mint on the blocking pool, then hand the result to the agent once
    /// forwarding has been requested.
    pub async fn mint_and_deliver<A: RemoteAgent>(&self, agent: &mut A) -> Completion {
        let principal = self.principal.clone();
        let policy = self.policy.clone();
        let signer = self.signer.clone();
        let issued = tokio::task::spawn_blocking(move || mint(&principal, &policy, signer.as_ref()))
            .await
            .map_err(|e| MintError::Aborted(e.to_string()))??;

        self.forwarding.notified().await;
        agent::deliver(agent, &issued).await?;
        Ok(())
    }

    /// Terminal task body, started once the client has asked for agent
    /// forwarding on its session channel.
    pub async fn serve_terminal<C: Connection, T: Terminal>(
        &self,
        conn: &C,
        mut terminal: T,
        completion: oneshot::Receiver<Completion>,
    ) {
        let settled = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            s = tokio::time::timeout(
                self.completion_timeout,
                self.state.wait_until(SessionState::agent_channel_settled),
            ) => s,
        };
        let settled = match settled {
            Ok(state) => state,
            Err(_) => {
                warn!(
                    user = self.principal.name(),
                    timeout_secs = self.completion_timeout.as_secs(),
                    "agent channel was never opened"
                );
                self.state.advance(SessionState::AgentChannelFailed);
                conn.disconnect(sanitize_error_for_client(&SessionError::AgentChannel(
                    "timed out".into(),
                )))
                .await;
                self.cancel.cancel();
                return;
            }
        };
        if settled == SessionState::AgentChannelFailed || settled == SessionState::Closed {
            return;
        }

        let banner = self.policy.banner();
        if !banner.is_empty() {
            self.write(&mut terminal, banner).await;
        }
        self.write(&mut terminal, &format!("welcome, {}", self.principal.name()))
            .await;

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            r = tokio::time::timeout(self.completion_timeout, completion) => match r {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(SessionError::Cancelled),
                Err(_) => Err(SessionError::TimedOut),
            },
        };

        if let Err(SessionError::TimedOut) = outcome {
            warn!(
                user = self.principal.name(),
                timeout_secs = self.completion_timeout.as_secs(),
                "timed out waiting for certificate"
            );
            self.state.advance(SessionState::MintFailed);
        }

        self.state.advance(SessionState::Notifying);
        let status = match &outcome {
            Ok(()) => {
                for line in SUCCESS_LINES {
                    self.write(&mut terminal, line).await;
                }
                ExitStatus::Success
            }
            Err(e) => {
                self.write(&mut terminal, sanitize_error_for_client(e)).await;
                self.write(&mut terminal, GOODBYE).await;
                ExitStatus::Failure
            }
        };
        self.close(conn, &mut terminal, status).await;
    }

    /// A shell or exec request arrived before agent forwarding was asked
    /// for. Nothing is issued to this connection.
    pub async fn reject_request<C: Connection, T: Terminal>(&self, conn: &C, mut terminal: T) {
        info!(user = self.principal.name(), "session request before agent forwarding");
        self.cancel.cancel();
        self.write(&mut terminal, UNSUPPORTED_REQUEST).await;
        self.close(conn, &mut terminal, ExitStatus::Failure).await;
    }

    async fn write<T: Terminal>(&self, terminal: &mut T, line: &str) {
        if let Err(e) = terminal.write_line(line).await {
            debug!(error = %e, "terminal write failed");
        }
    }

    async fn close<C: Connection, T: Terminal>(&self, conn: &C, terminal: &mut T, status: ExitStatus) {
        if let Err(e) = terminal.finish(status).await {
            debug!(error = %e, "could not close session channel");
        }
        self.state.advance(SessionState::Closed);
        info!(user = self.principal.name(), exit_status = status.code(), "closing the connection");
        conn.disconnect(GOODBYE).await;
        self.cancel.cancel();
    }
}
