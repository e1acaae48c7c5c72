//! Signer adaptation
//!
//! Turns the externally supplied primary wallet (EOA) into a uniform,
//! chain-bound signing capability. The chain switch must complete
//! before any signing handle is produced: signing with the wrong active
//! chain is a correctness bug, not a UX issue.

use crate::types::{ChainContext, ChainId};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// The user's primary signing credential
///
/// Owned by the authentication collaborator; read-only to this crate.
#[async_trait]
pub trait PrimaryWallet: Send + Sync {
    /// Chain-agnostic EOA address
    fn address(&self) -> String;

    /// Whether the wallet currently exposes an active provider
    fn has_provider(&self) -> bool;

    /// Switch the wallet's active chain (may require user interaction)
    async fn switch_chain(&self, chain_id: ChainId) -> Result<()>;

    /// Sign a raw message with the wallet's key
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Sign EIP-712 typed structured data
    async fn sign_typed_data(&self, payload: &serde_json::Value) -> Result<Vec<u8>>;
}

/// Chain-bound signer derived from a primary wallet
#[derive(Clone)]
pub struct ChainSigner {
    address: String,
    chain_id: ChainId,
    wallet: Arc<dyn PrimaryWallet>,
}

impl ChainSigner {
    /// Address of the underlying EOA
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Chain this signer is bound to
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Sign a raw message
    pub async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.wallet.sign_message(message).await
    }

    /// Sign EIP-712 typed structured data
    pub async fn sign_typed_data(&self, payload: &serde_json::Value) -> Result<Vec<u8>> {
        self.wallet.sign_typed_data(payload).await
    }
}

impl std::fmt::Debug for ChainSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSigner")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Derive a chain-bound signer from the primary wallet
///
/// Not retried automatically: a refused chain switch may require user
/// interaction, so the failure surfaces to the caller.
pub async fn derive_signer(
    wallet: Arc<dyn PrimaryWallet>,
    chain: &ChainContext,
) -> Result<ChainSigner> {
    if !wallet.has_provider() {
        return Err(Error::SignerUnavailable(
            "wallet has no active provider".into(),
        ));
    }

    if !chain.chain_id.is_supported() {
        return Err(Error::SignerUnavailable(format!(
            "unsupported chain: {}",
            chain.chain_id
        )));
    }

    wallet
        .switch_chain(chain.chain_id)
        .await
        .map_err(|e| Error::SignerUnavailable(format!("chain switch refused: {}", e)))?;

    Ok(ChainSigner {
        address: wallet.address(),
        chain_id: chain.chain_id,
        wallet,
    })
}
