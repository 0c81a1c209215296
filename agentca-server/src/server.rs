// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use agentca_core::{AuthorizationRegistry, CaSigner, CertificatePolicy, PrincipalRecord};
use russh::keys::ssh_key::{PrivateKey, PublicKey};
use russh::server::{Auth, Handle, Msg, Session};
use russh::{Channel, ChannelId, ChannelStream, CryptoVec, Disconnect, Pty};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError, SessionError};
use crate::gate::{Gate, TransportKey};
use crate::session::{
    Completion, Connection, ExitStatus, Orchestrator, Terminal, DEFAULT_COMPLETION_TIMEOUT,
};
use crate::state::{SessionState, StateTracker};

/// Pause after a failed accept so descriptor exhaustion does not spin.
pub(crate) const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct ServerConfig {
    pub listen_address: String,
    pub port: u16,
    pub completion_timeout: Duration,
    pub inactivity_timeout: Duration,
    pub auth_rejection_time: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".into(),
            port: 2222,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            inactivity_timeout: Duration::from_secs(300),
            auth_rejection_time: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }
}

pub struct Server {
    config: ServerConfig,
    ssh_config: Arc<russh::server::Config>,
    gate: Gate,
    policy: Arc<CertificatePolicy>,
    signer: Arc<dyn CaSigner>,
}

impl Server {
    pub fn new(
        host_key: PrivateKey,
        registry: AuthorizationRegistry,
        policy: CertificatePolicy,
        signer: Arc<dyn CaSigner>,
        config: ServerConfig,
    ) -> Self {
        let ssh_config = russh::server::Config {
            keys: vec![host_key],
            inactivity_timeout: Some(config.inactivity_timeout),
            auth_rejection_time: config.auth_rejection_time,
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        };
        Self {
            config,
            ssh_config: Arc::new(ssh_config),
            gate: Gate::new(Arc::new(registry)),
            policy: Arc::new(policy),
            signer,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        self.serve(listener).await
    }

    #[tracing::instrument(skip_all, fields(organisation = %self.policy.organisation()))]
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        match listener.local_addr() {
            Ok(addr) => info!(%addr, "listening"),
            Err(_) => info!("listening"),
        }

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    back_off_after_accept_error(&e).await;
                    continue;
                }
            };
            if let Err(e) = socket.set_nodelay(true) {
                debug!(error = %e, "could not set TCP_NODELAY");
            }

            let handler = self.connection_handler(peer);
            let ssh_config = self.ssh_config.clone();
            tokio::spawn(async move {
                match russh::server::run_stream(ssh_config, socket, handler).await {
                    Ok(session) => {
                        if let Err(e) = session.await {
                            debug!(%peer, error = %e, "connection ended with error");
                        }
                    }
                    Err(e) => warn!(%peer, error = %e, "failed to handshake"),
                }
            });
        }
    }

    fn connection_handler(&self, peer: SocketAddr) -> ConnectionHandler {
        let state = Arc::new(StateTracker::new(SessionState::Listening));
        state.advance(SessionState::Accepted);
        info!(%peer, "new ssh connection");
        ConnectionHandler {
            peer,
            gate: self.gate.clone(),
            policy: self.policy.clone(),
            signer: self.signer.clone(),
            completion_timeout: self.config.completion_timeout,
            state,
            cancel: CancellationToken::new(),
            principal: None,
            orchestrator: None,
            completion: None,
            session_channel: None,
            agent_requested: false,
            refused: false,
        }
    }
}

async fn back_off_after_accept_error(e: &io::Error) {
    warn!(error = %e, "failed to accept incoming connection");
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

/// russh handle seen as the orchestrator's connection.
#[derive(Clone)]
pub struct SshConnection {
    handle: Handle,
}

/// Byte stream of the `auth-agent@openssh.com` channel.
pub struct ForwardedAgent(ChannelStream<Msg>);

impl fmt::Debug for ForwardedAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ForwardedAgent")
    }
}

impl AsyncRead for ForwardedAgent {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for ForwardedAgent {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl Connection for SshConnection {
    type AgentStream = ForwardedAgent;

    async fn open_agent_channel(&self) -> std::result::Result<Self::AgentStream, SessionError> {
        let channel = self
            .handle
            .channel_open_agent()
            .await
            .map_err(|e| SessionError::AgentChannel(e.to_string()))?;
        Ok(ForwardedAgent(channel.into_stream()))
    }

    async fn disconnect(&self, reason: &str) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, reason.to_string(), "en".to_string())
            .await
        {
            debug!(error = %e, "disconnect failed");
        }
    }
}

/// The client's session channel seen as a line-oriented terminal.
pub struct SshTerminal {
    handle: Handle,
    channel: ChannelId,
}

impl Terminal for SshTerminal {
    async fn write_line(&mut self, line: &str) -> std::result::Result<(), SessionError> {
        let text = format!("{}\r\n", line.replace('\n', "\r\n"));
        self.handle
            .data(self.channel, CryptoVec::from_slice(text.as_bytes()))
            .await
            .map_err(|_| SessionError::Transport("session channel closed".into()))
    }

    async fn finish(&mut self, status: ExitStatus) -> std::result::Result<(), SessionError> {
        let closed = || SessionError::Transport("session channel closed".into());
        self.handle
            .exit_status_request(self.channel, status.code())
            .await
            .map_err(|_| closed())?;
        self.handle.eof(self.channel).await.map_err(|_| closed())?;
        self.handle.close(self.channel).await.map_err(|_| closed())?;
        Ok(())
    }
}

struct ConnectionHandler {
    peer: SocketAddr,
    gate: Gate,
    policy: Arc<CertificatePolicy>,
    signer: Arc<dyn CaSigner>,
    completion_timeout: Duration,
    state: Arc<StateTracker>,
    cancel: CancellationToken,
    principal: Option<Arc<PrincipalRecord>>,
    orchestrator: Option<Orchestrator>,
    completion: Option<oneshot::Receiver<Completion>>,
    session_channel: Option<Channel<Msg>>,
    agent_requested: bool,
    refused: bool,
}

impl ConnectionHandler {
    fn begin_authentication(&self) {
        if self.state.current() == SessionState::Accepted {
            self.state.advance(SessionState::Authenticating);
        }
    }

    fn is_session_channel(&self, channel: ChannelId) -> bool {
        self.session_channel
            .as_ref()
            .is_some_and(|c| c.id() == channel)
    }

    /// Shell and exec are only meaningful after agent forwarding was
    /// requested; before that the connection is turned away.
    fn session_request(&mut self, channel: ChannelId, session: &mut Session) -> std::result::Result<(), SessionError> {
        if !self.is_session_channel(channel) {
            session.channel_failure(channel)?;
            return Ok(());
        }
        session.channel_success(channel)?;
        if self.agent_requested || self.refused {
            return Ok(());
        }
        self.refused = true;
        if let Some(orchestrator) = self.orchestrator.clone() {
            let conn = SshConnection {
                handle: session.handle(),
            };
            let terminal = SshTerminal {
                handle: session.handle(),
                channel,
            };
            tokio::spawn(async move { orchestrator.reject_request(&conn, terminal).await });
        }
        Ok(())
    }
}

impl russh::server::Handler for ConnectionHandler {
    type Error = SessionError;

    async fn auth_publickey_offered(
        &mut self,
        _user: &str,
        public_key: &PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        self.begin_authentication();
        if self.gate.is_known(&TransportKey(public_key)) {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::reject())
        }
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        self.begin_authentication();
        match self.gate.authorize(&TransportKey(public_key), user) {
            Ok(principal) => {
                self.principal = Some(principal);
                self.state.advance(SessionState::Authenticated);
                Ok(Auth::Accept)
            }
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "public key rejected");
                Ok(Auth::reject())
            }
        }
    }

    async fn auth_succeeded(&mut self, session: &mut Session) -> std::result::Result<(), Self::Error> {
        let Some(principal) = self.principal.clone() else {
            return Ok(());
        };
        let orchestrator = Orchestrator::new(
            principal,
            self.policy.clone(),
            self.signer.clone(),
            self.state.clone(),
            self.cancel.clone(),
            self.completion_timeout,
        );
        let (tx, rx) = oneshot::channel();
        self.completion = Some(rx);

        // Opening a channel waits on this session's own event loop, so it
        // must not be awaited from inside a handler callback.
        let conn = SshConnection {
            handle: session.handle(),
        };
        let issuer = orchestrator.clone();
        tokio::spawn(async move { issuer.issue(&conn, tx).await });

        self.orchestrator = Some(orchestrator);
        Ok(())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        if self.orchestrator.is_none() || self.session_channel.is_some() {
            debug!(peer = %self.peer, "session channel rejected");
            return Ok(false);
        }
        self.session_channel = Some(channel);
        Ok(true)
    }

    async fn agent_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        if !self.is_session_channel(channel) || self.refused {
            return Ok(false);
        }
        if self.agent_requested {
            return Ok(true);
        }
        let (Some(orchestrator), Some(completion)) =
            (self.orchestrator.clone(), self.completion.take())
        else {
            return Ok(false);
        };
        self.agent_requested = true;
        orchestrator.forwarding_requested();

        let conn = SshConnection {
            handle: session.handle(),
        };
        let terminal = SshTerminal {
            handle: session.handle(),
            channel,
        };
        tokio::spawn(async move { orchestrator.serve_terminal(&conn, terminal, completion).await });
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        if self.is_session_channel(channel) {
            session.channel_success(channel)?;
        } else {
            session.channel_failure(channel)?;
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.session_request(channel, session)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        _data: &[u8],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.session_request(channel, session)
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
        match self.state.current() {
            SessionState::Authenticating => {
                self.state.advance(SessionState::AuthFailed);
                info!(peer = %self.peer, "connection closed without authentication");
            }
            s if !s.is_terminal() => {
                self.state.advance(SessionState::Closed);
            }
            _ => {}
        }
    }
}
