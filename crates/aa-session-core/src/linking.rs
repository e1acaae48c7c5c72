//! Identity linking protocol
//!
//! Associates a session's derived address with the user identity
//! through a sign-in challenge (SIWE-style): generate a single-use
//! challenge for the address, sign it through the session's client, and
//! submit the signature to the identity collaborator.
//!
//! Linking is idempotent per (identity, address, chain) and abandons
//! itself when the session is superseded mid-flight.

use crate::session::SessionManager;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Single-use sign-in challenge scoped to one address and chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInChallenge {
    /// Address that must produce the signature
    pub address: String,
    /// CAIP-2 chain identifier ("eip155:<id>")
    pub chain_id: String,
    /// Single-use nonce
    pub nonce: String,
    /// Issue timestamp
    pub issued_at: DateTime<Utc>,
    /// Full message text to sign
    pub message: String,
}

/// Association between a derived address and the user identity
///
/// At most one active record exists per (identity, chain); persistence
/// is owned by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub address: String,
    pub chain_id: String,
    pub linked_at: DateTime<Utc>,
}

/// Identity collaborator contract
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Addresses already linked to the current identity on a chain
    async fn linked_addresses(&self, chain_id: &str) -> Result<Vec<String>>;

    /// Generate a fresh single-use challenge for an address
    async fn generate_challenge(&self, address: &str, chain_id: &str) -> Result<SignInChallenge>;

    /// Submit a signed challenge to create the link record
    async fn submit_link(&self, signature: &[u8], challenge: &SignInChallenge)
        -> Result<LinkRecord>;
}

/// Outcome of `ensure_linked`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A new link record was created
    Linked(LinkRecord),
    /// The pair was already linked; no challenge round-trip was made
    AlreadyLinked,
    /// The session was superseded mid-flight; nothing was submitted
    Abandoned,
}

/// Challenge-response linking with exactly-once semantics
pub struct LinkingProtocol {
    identity: Arc<dyn IdentityProvider>,
    /// Links completed through this protocol instance, keyed by
    /// (address, chain); covers the window where the provider's
    /// linked-address list is still catching up.
    completed: DashMap<(String, String), LinkRecord>,
}

impl LinkingProtocol {
    /// Create a protocol instance bound to one identity collaborator
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            completed: DashMap::new(),
        }
    }

    /// Link the current session's address to the user identity
    ///
    /// Requires a `Ready` session. Idempotent: an already-linked pair
    /// short-circuits without generating a challenge. A session change
    /// at any suspension point abandons the attempt; the replacement
    /// session's own call supersedes it.
    pub async fn ensure_linked(&self, manager: &SessionManager) -> Result<LinkOutcome> {
        let session = manager.current_session().ok_or_else(|| {
            Error::SessionNotReady("linking requires a published session".into())
        })?;

        let chain = session.chain_id().caip2();
        let key = (session.address().to_string(), chain.clone());

        if self.completed.contains_key(&key) {
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let linked = self.identity.linked_addresses(&chain).await?;
        if linked
            .iter()
            .any(|a| a.eq_ignore_ascii_case(session.address()))
        {
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let epoch = session.epoch();

        let challenge = self
            .identity
            .generate_challenge(session.address(), &chain)
            .await?;

        // The challenge must be signed by the exact address it names.
        if !challenge.address.eq_ignore_ascii_case(session.address()) {
            return Err(Error::LinkingRejected(format!(
                "challenge names {}, session address is {}",
                challenge.address,
                session.address()
            )));
        }

        if manager.current_epoch() != epoch {
            tracing::debug!(address = %session.address(), "abandoning link for superseded session");
            return Ok(LinkOutcome::Abandoned);
        }

        let signature = session
            .client()
            .sign_message(challenge.message.as_bytes())
            .await?;

        if manager.current_epoch() != epoch {
            tracing::debug!(address = %session.address(), "abandoning link for superseded session");
            return Ok(LinkOutcome::Abandoned);
        }

        let record = self.identity.submit_link(&signature, &challenge).await?;
        self.completed.insert(key, record.clone());

        tracing::info!(
            address = %record.address,
            chain = %record.chain_id,
            "smart account linked to identity"
        );
        Ok(LinkOutcome::Linked(record))
    }
}

impl std::fmt::Debug for LinkingProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkingProtocol")
            .field("completed", &self.completed.len())
            .finish()
    }
}
