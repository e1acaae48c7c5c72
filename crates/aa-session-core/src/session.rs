//! Session lifecycle
//!
//! Orchestrates signer derivation, account construction and middleware
//! wiring into one pipeline keyed by chain context and account variant.
//!
//! State machine: `Idle → Deriving → Ready`, with re-entry into
//! `Deriving` whenever the primary wallet's address changes. A failed
//! derivation returns to `Idle` with no partial session published.
//!
//! Supersession uses a monotonically increasing epoch: every derivation
//! captures the epoch at start and re-checks it at publication time, so
//! a stale result is discarded even when it finishes after a newer one.

use crate::account::build_account;
use crate::middleware::{attach_middleware, Bundler, Paymaster, SmartAccountClient};
use crate::rpc::JsonRpc;
use crate::types::{AccountVariant, ChainContext, ChainId};
use crate::wallet::{derive_signer, PrimaryWallet};
use crate::Result;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Session manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No primary wallet, or the last derivation failed
    Idle,
    /// The derivation pipeline is running
    Deriving,
    /// A session is published and usable
    Ready,
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }
}

/// A published smart account session
///
/// Immutable once published; a primary-wallet change produces a
/// replacement session rather than mutating this one.
pub struct SmartAccountSession {
    address: String,
    eoa_address: String,
    chain_id: ChainId,
    ready: bool,
    client: Arc<SmartAccountClient>,
    epoch: u64,
}

impl SmartAccountSession {
    /// Derived smart account address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Address of the primary wallet this session was derived from
    pub fn eoa_address(&self) -> &str {
        &self.eoa_address
    }

    /// Target chain
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Whether the session finished derivation and middleware wiring
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Transaction-submission client bound to sponsorship middleware
    pub fn client(&self) -> &Arc<SmartAccountClient> {
        &self.client
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl std::fmt::Debug for SmartAccountSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartAccountSession")
            .field("address", &self.address)
            .field("eoa_address", &self.eoa_address)
            .field("chain_id", &self.chain_id)
            .field("ready", &self.ready)
            .finish()
    }
}

/// Outcome of a derivation run
#[derive(Debug)]
pub enum SessionOutcome {
    /// The session was published and is now current
    Published(Arc<SmartAccountSession>),
    /// A newer wallet change superseded this derivation; nothing was published
    Superseded,
}

/// Smart account session manager
///
/// Single writer of the published session; consumers read the current
/// session and must re-fetch it after a primary-wallet change rather
/// than caching it.
pub struct SessionManager {
    chain: ChainContext,
    variant: AccountVariant,
    paymaster: Arc<dyn Paymaster>,
    bundler: Arc<dyn Bundler>,
    rpc: Arc<dyn JsonRpc>,
    state: RwLock<SessionState>,
    current: RwLock<Option<Arc<SmartAccountSession>>>,
    wallet: RwLock<Option<Arc<dyn PrimaryWallet>>>,
    epoch: AtomicU64,
}

impl SessionManager {
    /// Create a manager for one (chain, variant) pair
    pub fn new(
        chain: ChainContext,
        variant: AccountVariant,
        paymaster: Arc<dyn Paymaster>,
        bundler: Arc<dyn Bundler>,
        rpc: Arc<dyn JsonRpc>,
    ) -> Self {
        Self {
            chain,
            variant,
            paymaster,
            bundler,
            rpc,
            state: RwLock::new(SessionState::Idle),
            current: RwLock::new(None),
            wallet: RwLock::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current state of the manager
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// The currently published session, if any
    pub fn current_session(&self) -> Option<Arc<SmartAccountSession>> {
        self.current.read().clone()
    }

    /// The primary wallet the manager was last asked to derive from
    pub fn current_wallet(&self) -> Option<Arc<dyn PrimaryWallet>> {
        self.wallet.read().clone()
    }

    /// Chain context this manager targets
    pub fn chain(&self) -> &ChainContext {
        &self.chain
    }

    /// Account variant this manager constructs
    pub fn variant(&self) -> AccountVariant {
        self.variant
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Run the derivation pipeline for a (possibly new) primary wallet
    ///
    /// Supersedes any in-flight derivation: the previous session is
    /// withdrawn immediately, and an older derivation that settles
    /// later is discarded at publication time.
    pub async fn on_wallet_changed(
        &self,
        wallet: Arc<dyn PrimaryWallet>,
    ) -> Result<SessionOutcome> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write() = SessionState::Deriving;
        *self.current.write() = None;
        *self.wallet.write() = Some(Arc::clone(&wallet));
        tracing::debug!(eoa = %wallet.address(), epoch, "deriving smart account session");

        match self.derive(Arc::clone(&wallet)).await {
            Ok(client) => {
                let mut current = self.current.write();
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    tracing::debug!(eoa = %wallet.address(), epoch, "discarding superseded derivation");
                    return Ok(SessionOutcome::Superseded);
                }

                let session = Arc::new(SmartAccountSession {
                    address: client.address().to_string(),
                    eoa_address: wallet.address(),
                    chain_id: self.chain.chain_id,
                    ready: true,
                    client: Arc::new(client),
                    epoch,
                });
                *current = Some(Arc::clone(&session));
                drop(current);
                *self.state.write() = SessionState::Ready;

                tracing::info!(
                    address = %session.address(),
                    eoa = %session.eoa_address(),
                    chain = %session.chain_id(),
                    "smart account session ready"
                );
                Ok(SessionOutcome::Published(session))
            }
            Err(e) => {
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    return Ok(SessionOutcome::Superseded);
                }
                *self.state.write() = SessionState::Idle;
                tracing::warn!(eoa = %wallet.address(), error = %e, "session derivation failed");
                Err(e)
            }
        }
    }

    async fn derive(&self, wallet: Arc<dyn PrimaryWallet>) -> Result<SmartAccountClient> {
        let signer = derive_signer(wallet, &self.chain).await?;
        let account = build_account(&signer, self.variant, &self.chain, self.rpc.as_ref()).await?;
        attach_middleware(
            account,
            signer,
            self.chain.clone(),
            Arc::clone(&self.paymaster),
            Arc::clone(&self.bundler),
            Arc::clone(&self.rpc),
        )
        .await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("chain", &self.chain.chain_id)
            .field("variant", &self.variant)
            .field("state", &self.state())
            .field("epoch", &self.current_epoch())
            .finish()
    }
}
