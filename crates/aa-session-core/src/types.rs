//! Core types for smart account sessions
//!
//! Defines the chain descriptor, entry-point versions, account variants
//! and the call payload submitted through a session client.

use crate::{Error, Result};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ERC-4337 EntryPoint v0.6 address (same on most chains)
pub const ENTRY_POINT_V06: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

/// ERC-4337 EntryPoint v0.7 address
pub const ENTRY_POINT_V07: &str = "0x0000000071727De22E5E9d8BAf0edAc6f37da032";

// ============================================================================
// Chain Identity
// ============================================================================

/// Blockchain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const ETHEREUM_MAINNET: ChainId = ChainId(1);
    pub const ETHEREUM_SEPOLIA: ChainId = ChainId(11155111);
    pub const OPTIMISM: ChainId = ChainId(10);
    pub const ARBITRUM_ONE: ChainId = ChainId(42161);
    pub const BASE: ChainId = ChainId(8453);
    pub const BASE_SEPOLIA: ChainId = ChainId(84532);
    pub const POLYGON: ChainId = ChainId(137);

    /// Get the name for this chain
    pub fn name(&self) -> &'static str {
        match self.0 {
            1 => "Ethereum Mainnet",
            11155111 => "Ethereum Sepolia",
            10 => "Optimism",
            42161 => "Arbitrum One",
            8453 => "Base",
            84532 => "Base Sepolia",
            137 => "Polygon",
            _ => "Unknown Chain",
        }
    }

    /// Check if sessions can target this chain
    pub fn is_supported(&self) -> bool {
        matches!(self.0, 1 | 11155111 | 10 | 42161 | 8453 | 84532 | 137)
    }

    /// CAIP-2 identifier used by the identity collaborator
    pub fn caip2(&self) -> String {
        format!("eip155:{}", self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId(id)
    }
}

// ============================================================================
// Entry Point Versions
// ============================================================================

/// ERC-4337 entry-point contract generation
///
/// The two generations have incompatible interfaces; an account, its
/// paymaster and its bundler must all target the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntryPointVersion {
    /// ERC-4337 v0.6
    #[default]
    V06,
    /// ERC-4337 v0.7
    V07,
}

impl EntryPointVersion {
    /// Canonical deployed address of this entry-point generation
    pub fn address(&self) -> &'static str {
        match self {
            EntryPointVersion::V06 => ENTRY_POINT_V06,
            EntryPointVersion::V07 => ENTRY_POINT_V07,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPointVersion::V06 => "v0.6",
            EntryPointVersion::V07 => "v0.7",
        }
    }
}

impl fmt::Display for EntryPointVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Account Variants
// ============================================================================

/// Smart account implementation variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountVariant {
    /// Minimal-proxy account
    Light,
    /// Module-based account
    Kernel,
    /// Multisig-capable account
    Safe,
}

impl AccountVariant {
    /// Entry-point generation this variant is built against
    pub fn entry_point_version(&self) -> EntryPointVersion {
        match self {
            AccountVariant::Light => EntryPointVersion::V06,
            AccountVariant::Kernel | AccountVariant::Safe => EntryPointVersion::V07,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountVariant::Light => "light",
            AccountVariant::Kernel => "kernel",
            AccountVariant::Safe => "safe",
        }
    }

    /// Get all supported variants
    pub fn all() -> [AccountVariant; 3] {
        [
            AccountVariant::Light,
            AccountVariant::Kernel,
            AccountVariant::Safe,
        ]
    }
}

impl fmt::Display for AccountVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" | "light_account" => Ok(AccountVariant::Light),
            "kernel" => Ok(AccountVariant::Kernel),
            "safe" => Ok(AccountVariant::Safe),
            other => Err(Error::UnsupportedVariant(other.to_string())),
        }
    }
}

// ============================================================================
// Chain Context
// ============================================================================

/// Immutable descriptor of the target network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainContext {
    /// Chain identifier
    pub chain_id: ChainId,
    /// RPC endpoint URLs (for failover)
    pub rpc_urls: Vec<String>,
    /// Block explorer URL (optional)
    pub explorer_url: Option<String>,
    /// Entry-point generation this context requires
    pub entry_point: EntryPointVersion,
}

impl ChainContext {
    /// Create context for Ethereum Mainnet
    pub fn ethereum_mainnet(entry_point: EntryPointVersion) -> Self {
        Self {
            chain_id: ChainId::ETHEREUM_MAINNET,
            rpc_urls: vec![
                "https://eth.llamarpc.com".to_string(),
                "https://rpc.ankr.com/eth".to_string(),
            ],
            explorer_url: Some("https://etherscan.io".to_string()),
            entry_point,
        }
    }

    /// Create context for Ethereum Sepolia testnet
    pub fn ethereum_sepolia(entry_point: EntryPointVersion) -> Self {
        Self {
            chain_id: ChainId::ETHEREUM_SEPOLIA,
            rpc_urls: vec![
                "https://rpc.sepolia.org".to_string(),
                "https://rpc.ankr.com/eth_sepolia".to_string(),
            ],
            explorer_url: Some("https://sepolia.etherscan.io".to_string()),
            entry_point,
        }
    }

    /// Create context for Base
    pub fn base(entry_point: EntryPointVersion) -> Self {
        Self {
            chain_id: ChainId::BASE,
            rpc_urls: vec![
                "https://mainnet.base.org".to_string(),
                "https://base.llamarpc.com".to_string(),
            ],
            explorer_url: Some("https://basescan.org".to_string()),
            entry_point,
        }
    }

    /// Create context for Base Sepolia testnet
    pub fn base_sepolia(entry_point: EntryPointVersion) -> Self {
        Self {
            chain_id: ChainId::BASE_SEPOLIA,
            rpc_urls: vec![
                "https://sepolia.base.org".to_string(),
                "https://base-sepolia.drpc.org".to_string(),
            ],
            explorer_url: Some("https://sepolia.basescan.org".to_string()),
            entry_point,
        }
    }

    /// Create context for Optimism
    pub fn optimism(entry_point: EntryPointVersion) -> Self {
        Self {
            chain_id: ChainId::OPTIMISM,
            rpc_urls: vec![
                "https://mainnet.optimism.io".to_string(),
                "https://rpc.ankr.com/optimism".to_string(),
            ],
            explorer_url: Some("https://optimistic.etherscan.io".to_string()),
            entry_point,
        }
    }

    /// Create a custom context
    pub fn custom(chain_id: u64, rpc_urls: Vec<String>, entry_point: EntryPointVersion) -> Self {
        Self {
            chain_id: ChainId(chain_id),
            rpc_urls,
            explorer_url: None,
            entry_point,
        }
    }

    /// Look up the built-in context for a known chain
    pub fn preset(chain_id: ChainId, entry_point: EntryPointVersion) -> Option<Self> {
        match chain_id {
            ChainId::ETHEREUM_MAINNET => Some(Self::ethereum_mainnet(entry_point)),
            ChainId::ETHEREUM_SEPOLIA => Some(Self::ethereum_sepolia(entry_point)),
            ChainId::BASE => Some(Self::base(entry_point)),
            ChainId::BASE_SEPOLIA => Some(Self::base_sepolia(entry_point)),
            ChainId::OPTIMISM => Some(Self::optimism(entry_point)),
            _ => None,
        }
    }

    /// Set explorer URL
    pub fn with_explorer(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }

    /// Get the explorer URL for a transaction
    pub fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base, tx_hash))
    }

    /// Get the explorer URL for an address
    pub fn explorer_address_url(&self, address: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/address/{}", base, address))
    }
}

// ============================================================================
// Calls
// ============================================================================

/// A single call to execute through a smart account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Target contract or recipient
    pub to: String,
    /// Native value to attach (wei)
    pub value: U256,
    /// Encoded call data
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Call {
    /// Create a new call
    pub fn new(to: impl Into<String>, value: U256) -> Self {
        Self {
            to: to.into(),
            value,
            data: vec![],
        }
    }

    /// Attach call data
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }
}

/// Compute Keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use tiny_keccak::{Hasher, Keccak};
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}
