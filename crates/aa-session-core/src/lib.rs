//! # AA Session Core
//!
//! Smart account session management for sponsored (gas-abstracted)
//! transactions.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Signer Adapter**: wraps a primary wallet (EOA) into a chain-bound
//!   signing capability
//! - **Account Variant Builder**: constructs light/kernel/safe smart
//!   accounts against the matching ERC-4337 entry-point generation and
//!   derives their counterfactual addresses
//! - **Sponsorship Middleware**: paymaster and bundler clients wired into
//!   a single typed client that sponsors, prices and relays operations
//! - **Session Manager**: the `Idle → Deriving → Ready` pipeline with
//!   supersession on primary-wallet change
//! - **Identity Linking**: idempotent SIWE-style challenge-response
//!   linking of the derived address to the user identity
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aa_session_core::{
//!     AccountVariant, Call, LinkingProtocol, SessionManager, StackConfig,
//! };
//! use std::sync::Arc;
//!
//! let config = StackConfig::from_env()?;
//! let manager = SessionManager::new(
//!     config.chain_context()?,
//!     config.variant,
//!     config.paymaster()?,
//!     config.bundler()?,
//!     Arc::new(config.rpc()?),
//! );
//!
//! // Derive a session whenever the authenticated wallet (re)appears
//! manager.on_wallet_changed(wallet).await?;
//!
//! // Submit a sponsored transaction through the published session
//! let session = manager.current_session().expect("session ready");
//! let op_hash = session.client().send_transaction(&call).await?;
//!
//! // Link the derived address to the user identity (idempotent)
//! let linking = LinkingProtocol::new(identity);
//! linking.ensure_linked(&manager).await?;
//! ```

pub mod account;
pub mod config;
pub mod error;
pub mod linking;
pub mod middleware;
pub mod rpc;
pub mod session;
pub mod types;
pub mod wallet;

pub use account::{
    build_account, counterfactual_address, SmartAccount, UserOperation, VariantParams,
};
pub use config::StackConfig;
pub use error::{Error, Result};
pub use linking::{IdentityProvider, LinkOutcome, LinkRecord, LinkingProtocol, SignInChallenge};
pub use middleware::{
    attach_middleware, Bundler, GasFees, Paymaster, SmartAccountClient, SponsorshipData,
    UserOperationReceipt,
};
pub use rpc::{HttpRpc, JsonRpc};
pub use session::{SessionManager, SessionOutcome, SessionState, SmartAccountSession};
pub use types::{
    keccak256, AccountVariant, Call, ChainContext, ChainId, EntryPointVersion, ENTRY_POINT_V06,
    ENTRY_POINT_V07,
};
pub use wallet::{derive_signer, ChainSigner, PrimaryWallet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
