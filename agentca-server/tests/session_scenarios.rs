// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentca_core::{AuthorizationRegistry, CertificatePolicy, PrincipalRecord, PublicKeyIdentity};
use agentca_server::{
    sanitize_error_for_client, Connection, ExitStatus, Gate, Orchestrator, SessionError,
    SessionState, StateTracker, Terminal,
};
use ssh_encoding::Decode;
use ssh_key::private::{Ed25519Keypair, KeypairData};
use ssh_key::public::KeyData;
use ssh_key::{Certificate, HashAlg, PrivateKey, PublicKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

const BANNER: &str = "acme certificate authority";
const SSH_AGENT_FAILURE: u8 = 5;
const SSH_AGENT_SUCCESS: u8 = 6;

fn ca_key() -> PrivateKey {
    PrivateKey::new(
        KeypairData::Ed25519(Ed25519Keypair::from_seed(&[0xca; 32])),
        "ca@acme",
    )
    .unwrap()
}

fn user_key(seed: u8) -> PublicKey {
    PublicKey::new(
        KeyData::Ed25519(Ed25519Keypair::from_seed(&[seed; 32]).public),
        "",
    )
}

fn alice() -> PrincipalRecord {
    PrincipalRecord::new(
        "alice",
        vec!["alice".into(), "ops".into()],
        Some(user_key(1)),
        None,
    )
    .unwrap()
}

fn orchestrator(completion_timeout: Duration) -> Orchestrator {
    let mut extensions = BTreeMap::new();
    extensions.insert("permit-pty".to_string(), String::new());
    let policy = CertificatePolicy::new("acme", 480, extensions, BANNER).unwrap();
    Orchestrator::new(
        Arc::new(alice()),
        Arc::new(policy),
        Arc::new(ca_key()),
        Arc::new(StateTracker::new(SessionState::Authenticated)),
        CancellationToken::new(),
        completion_timeout,
    )
}

#[derive(Default)]
struct MockConnection {
    agent: Mutex<Option<DuplexStream>>,
    stalls: bool,
    disconnects: Mutex<Vec<String>>,
}

impl MockConnection {
    fn with_agent(stream: DuplexStream) -> Self {
        Self {
            agent: Mutex::new(Some(stream)),
            ..Self::default()
        }
    }

    /// The client never answers the agent channel open.
    fn stalled() -> Self {
        Self {
            stalls: true,
            ..Self::default()
        }
    }

    fn disconnects(&self) -> Vec<String> {
        self.disconnects.lock().unwrap().clone()
    }
}

impl Connection for MockConnection {
    type AgentStream = DuplexStream;

    async fn open_agent_channel(&self) -> Result<DuplexStream, SessionError> {
        if self.stalls {
            std::future::pending::<()>().await;
        }
        let stream = self.agent.lock().unwrap().take();
        stream.ok_or_else(|| SessionError::AgentChannel("client did not forward an agent".into()))
    }

    async fn disconnect(&self, reason: &str) {
        self.disconnects.lock().unwrap().push(reason.to_string());
    }
}

#[derive(Default, Clone)]
struct MockTerminal {
    lines: Arc<Mutex<Vec<String>>>,
    status: Arc<Mutex<Option<ExitStatus>>>,
}

impl MockTerminal {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn status(&self) -> Option<ExitStatus> {
        *self.status.lock().unwrap()
    }
}

impl Terminal for MockTerminal {
    async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }

    async fn finish(&mut self, status: ExitStatus) -> Result<(), SessionError> {
        *self.status.lock().unwrap() = Some(status);
        Ok(())
    }
}

/// Reads one request and answers with a single-byte reply. Returns the
/// request body.
async fn fake_agent(mut stream: DuplexStream, reply: u8) -> Vec<u8> {
    let len = stream.read_u32().await.unwrap();
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await.unwrap();
    stream.write_u32(1).await.unwrap();
    stream.write_u8(reply).await.unwrap();
    body
}

async fn run_session(
    orchestrator: &Orchestrator,
    conn: Arc<MockConnection>,
    terminal: MockTerminal,
) {
    let (tx, rx) = oneshot::channel();
    let issuer = {
        let orchestrator = orchestrator.clone();
        let conn = conn.clone();
        tokio::spawn(async move { orchestrator.issue(conn.as_ref(), tx).await })
    };
    orchestrator.forwarding_requested();
    orchestrator.serve_terminal(conn.as_ref(), terminal, rx).await;
    issuer.await.unwrap();
}

#[tokio::test]
async fn test_certificate_delivered() {
    let (client, agent_end) = tokio::io::duplex(64 * 1024);
    let agent = tokio::spawn(fake_agent(agent_end, SSH_AGENT_SUCCESS));
    let conn = Arc::new(MockConnection::with_agent(client));
    let terminal = MockTerminal::default();
    let orchestrator = orchestrator(Duration::from_secs(30));

    run_session(&orchestrator, conn.clone(), terminal.clone()).await;

    assert_eq!(
        terminal.lines(),
        vec![
            BANNER,
            "welcome, alice",
            "certificate generation complete",
            "run 'ssh-add -l' to view",
            "goodbye",
        ]
    );
    assert_eq!(terminal.status(), Some(ExitStatus::Success));
    assert_eq!(orchestrator.state(), SessionState::Closed);
    assert_eq!(conn.disconnects(), vec!["goodbye"]);

    let request = agent.await.unwrap();
    let mut reader = &request[1..];
    let _key_type = String::decode(&mut reader).unwrap();
    let blob = Vec::<u8>::decode(&mut reader).unwrap();
    let cert = Certificate::from_bytes(&blob).unwrap();

    assert_eq!(cert.valid_principals(), &["alice", "ops"]);
    assert_eq!(cert.valid_before() - cert.valid_after(), 480 * 60);
    assert!(cert.extensions().contains_key("permit-pty"));
    assert!(cert.key_id().starts_with("acme_alice_from:"));
    let ca_fingerprint = ca_key().public_key().fingerprint(HashAlg::Sha256);
    cert.validate_at(cert.valid_after(), [&ca_fingerprint]).unwrap();
}

#[tokio::test]
async fn test_agent_refuses_identity() {
    let (client, agent_end) = tokio::io::duplex(64 * 1024);
    tokio::spawn(fake_agent(agent_end, SSH_AGENT_FAILURE));
    let conn = Arc::new(MockConnection::with_agent(client));
    let terminal = MockTerminal::default();
    let orchestrator = orchestrator(Duration::from_secs(30));

    run_session(&orchestrator, conn.clone(), terminal.clone()).await;

    assert_eq!(
        terminal.lines(),
        vec![
            BANNER,
            "welcome, alice",
            "certificate creation error",
            "goodbye"
        ]
    );
    assert_eq!(terminal.status(), Some(ExitStatus::Failure));
    assert_eq!(orchestrator.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_no_forwarded_agent() {
    let conn = Arc::new(MockConnection::default());
    let terminal = MockTerminal::default();
    let orchestrator = orchestrator(Duration::from_secs(30));

    run_session(&orchestrator, conn.clone(), terminal.clone()).await;

    assert!(terminal.lines().is_empty());
    assert_eq!(terminal.status(), None);
    assert_eq!(orchestrator.state(), SessionState::AgentChannelFailed);
    assert_eq!(conn.disconnects(), vec!["agent forwarding required"]);
}

#[test]
fn test_unknown_key_is_refused() {
    let registry = AuthorizationRegistry::from_records(vec![alice()]).unwrap();
    let gate = Gate::new(Arc::new(registry));
    let state = StateTracker::new(SessionState::Authenticating);

    let err = gate.authorize(&user_key(9), "alice").unwrap_err();
    match &err {
        SessionError::Unauthorized { fingerprint, user } => {
            assert_eq!(fingerprint, &PublicKeyIdentity::fingerprint(&user_key(9)));
            assert_eq!(user, "alice");
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    assert_eq!(sanitize_error_for_client(&err), "authentication failed");

    assert!(state.advance(SessionState::AuthFailed));
    assert!(!state.advance(SessionState::AgentChannelOpening));
    assert_eq!(state.current(), SessionState::AuthFailed);
}

#[tokio::test]
async fn test_silent_agent_times_out() {
    let (client, mut agent_end) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let len = agent_end.read_u32().await.unwrap();
        let mut body = vec![0u8; len as usize];
        agent_end.read_exact(&mut body).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(agent_end);
    });
    let conn = Arc::new(MockConnection::with_agent(client));
    let terminal = MockTerminal::default();
    let orchestrator = orchestrator(Duration::from_millis(300));

    run_session(&orchestrator, conn.clone(), terminal.clone()).await;

    assert_eq!(
        terminal.lines(),
        vec![
            BANNER,
            "welcome, alice",
            "certificate creation error",
            "goodbye"
        ]
    );
    assert_eq!(terminal.status(), Some(ExitStatus::Failure));
    assert_eq!(orchestrator.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_shell_before_agent_request_is_refused() {
    let (client, mut agent_end) = tokio::io::duplex(64 * 1024);
    let agent = tokio::spawn(async move { agent_end.read_u8().await.is_ok() });
    let conn = Arc::new(MockConnection::with_agent(client));
    let terminal = MockTerminal::default();
    let orchestrator = orchestrator(Duration::from_secs(30));

    let (tx, rx) = oneshot::channel();
    let issuer = {
        let orchestrator = orchestrator.clone();
        let conn = conn.clone();
        tokio::spawn(async move { orchestrator.issue(conn.as_ref(), tx).await })
    };
    // give the issuance task time to open the agent channel and mint
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator
        .reject_request(conn.as_ref(), terminal.clone())
        .await;
    issuer.await.unwrap();

    assert_eq!(terminal.lines(), vec!["request type not supported"]);
    assert_eq!(terminal.status(), Some(ExitStatus::Failure));
    assert_eq!(orchestrator.state(), SessionState::Closed);
    assert_eq!(conn.disconnects(), vec!["goodbye"]);
    if let Ok(result) = rx.await {
        assert!(matches!(result, Err(SessionError::Cancelled)));
    }
    assert!(!agent.await.unwrap(), "agent must not receive an identity");
}

#[tokio::test]
async fn test_agent_channel_that_never_opens_times_out() {
    let conn = Arc::new(MockConnection::stalled());
    let terminal = MockTerminal::default();
    let orchestrator = orchestrator(Duration::from_millis(200));

    let completion = tokio::time::timeout(
        Duration::from_secs(5),
        run_session(&orchestrator, conn.clone(), terminal.clone()),
    )
    .await;

    assert!(completion.is_ok());
    assert!(terminal.lines().is_empty());
    assert_eq!(orchestrator.state(), SessionState::AgentChannelFailed);
    assert_eq!(conn.disconnects(), vec!["agent forwarding required"]);
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let mut sessions = Vec::new();
    for reply in [SSH_AGENT_SUCCESS, SSH_AGENT_FAILURE, SSH_AGENT_SUCCESS] {
        let (client, agent_end) = tokio::io::duplex(64 * 1024);
        tokio::spawn(fake_agent(agent_end, reply));
        let conn = Arc::new(MockConnection::with_agent(client));
        let terminal = MockTerminal::default();
        let orchestrator = orchestrator(Duration::from_secs(30));
        let handle = {
            let terminal = terminal.clone();
            tokio::spawn(async move {
                run_session(&orchestrator, conn, terminal).await;
            })
        };
        sessions.push((reply, terminal, handle));
    }

    for (reply, terminal, handle) in sessions {
        handle.await.unwrap();
        let expected = if reply == SSH_AGENT_SUCCESS {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        };
        assert_eq!(terminal.status(), Some(expected));
    }
}
