// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Delivery of issued certificates into the client's forwarded agent over
//! the `auth-agent@openssh.com` channel.

use std::fmt;
use std::future::Future;

use agentca_core::IssuedCertificate;
use ssh_agent_lib::agent::Session;
use ssh_agent_lib::client::Client;
use ssh_agent_lib::proto::{
    AddIdentity, AddIdentityConstrained, Credential as PrivateCredential, KeyConstraint, PrivateKeyData,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::DeliveryError;

/// A forwarded agent that can be handed an identity.
pub trait RemoteAgent: Send {
    fn add_identity(
        &mut self,
        issued: &IssuedCertificate,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Agent protocol client over any byte stream.
pub struct AgentClient<S>
where
    S: fmt::Debug + AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    client: Client<S>,
}

impl<S> AgentClient<S>
where
    S: fmt::Debug + AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    pub fn new(stream: S) -> Self {
        Self {
            client: Client::new(stream),
        }
    }
}

impl<S> RemoteAgent for AgentClient<S>
where
    S: fmt::Debug + AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn add_identity(&mut self, issued: &IssuedCertificate) -> Result<(), DeliveryError> {
        self.client
            .add_identity_constrained(add_identity_request(issued))
            .await?;
        Ok(())
    }
}

/// `SSH_AGENTC_ADD_ID_CONSTRAINED` carrying the certificate, its private
/// key and a lifetime matching the certificate window.
pub fn add_identity_request(issued: &IssuedCertificate) -> AddIdentityConstrained {
    let credential = PrivateCredential::Cert {
        algorithm: issued.certificate().algorithm(),
        certificate: Box::new(issued.certificate().clone()),
        privkey: PrivateKeyData::Ed25519(issued.keypair().private.clone().into()),
        comment: issued.identifier().to_string(),
    };
    AddIdentityConstrained {
        identity: AddIdentity { credential },
        constraints: vec![KeyConstraint::Lifetime(issued.lifetime_secs())],
    }
}

pub async fn deliver<A: RemoteAgent>(
    agent: &mut A,
    issued: &IssuedCertificate,
) -> Result<(), DeliveryError> {
    agent.add_identity(issued).await?;
    debug!(
        identifier = issued.identifier(),
        lifetime_secs = issued.lifetime_secs(),
        "identity added to remote agent"
    );
    Ok(())
}
