//! Smart account construction
//!
//! Maps an account variant to its entry-point generation and
//! construction parameters, computes the counterfactual address, and
//! provides the ERC-4337 `UserOperation` type with signing hashes and
//! wire formats for both entry-point generations.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aa_session_core::account::{counterfactual_address, VariantParams};
//! use aa_session_core::{AccountVariant, EntryPointVersion};
//!
//! let params = VariantParams::for_variant(AccountVariant::Safe);
//! let address = counterfactual_address("0x...", &params, EntryPointVersion::V07)?;
//! ```

use crate::rpc::{call_typed, JsonRpc};
use crate::types::{keccak256, AccountVariant, ChainContext, ChainId, EntryPointVersion};
use crate::wallet::ChainSigner;
use crate::{Error, Result};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Factory Constants
// ============================================================================

/// LightAccount factory (v1.1.0)
pub const LIGHT_ACCOUNT_FACTORY: &str = "0x15Ba39375ee2Ab563E8873C8390be6f2E2F50232";

/// Kernel ECDSA-validator factory
pub const KERNEL_FACTORY: &str = "0x5de4839a76cf55d0c90e2061ef4386d962E15ae3";

/// Safe proxy factory (v1.4.1)
pub const SAFE_PROXY_FACTORY: &str = "0x4e1DCf7AD4e460CfD30791CCC4F9c8a4f820ec67";

/// Implementation release deployed for light accounts
pub const LIGHT_ACCOUNT_VERSION: &str = "1.1.0";

/// Singleton release deployed for safe accounts
pub const SAFE_VERSION: &str = "1.4.1";

// ============================================================================
// Variant Parameters
// ============================================================================

/// Variant-specific construction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VariantParams {
    /// Minimal-proxy account; `version` selects the implementation release
    Light { version: String },
    /// Module-based account; `index` salts the validator installation
    Kernel { index: u64 },
    /// Multisig-capable account; `version` selects the singleton release
    Safe { version: String },
}

impl VariantParams {
    /// Default construction parameters for a variant
    pub fn for_variant(variant: AccountVariant) -> Self {
        match variant {
            AccountVariant::Light => VariantParams::Light {
                version: LIGHT_ACCOUNT_VERSION.to_string(),
            },
            AccountVariant::Kernel => VariantParams::Kernel { index: 0 },
            AccountVariant::Safe => VariantParams::Safe {
                version: SAFE_VERSION.to_string(),
            },
        }
    }

    /// Factory contract that deploys this kind of account
    pub fn factory(&self) -> &'static str {
        match self {
            VariantParams::Light { .. } => LIGHT_ACCOUNT_FACTORY,
            VariantParams::Kernel { .. } => KERNEL_FACTORY,
            VariantParams::Safe { .. } => SAFE_PROXY_FACTORY,
        }
    }

    /// CREATE2 salt for the deployment
    pub fn salt(&self) -> [u8; 32] {
        let mut salt = [0u8; 32];
        if let VariantParams::Kernel { index } = self {
            salt[24..].copy_from_slice(&index.to_be_bytes());
        }
        salt
    }

    /// Stable byte encoding fed into the init-code hash
    fn encode(&self) -> Vec<u8> {
        match self {
            VariantParams::Light { version } => {
                let mut bytes = b"light:".to_vec();
                bytes.extend_from_slice(version.as_bytes());
                bytes
            }
            VariantParams::Kernel { index } => {
                let mut bytes = b"kernel:".to_vec();
                bytes.extend_from_slice(&index.to_be_bytes());
                bytes
            }
            VariantParams::Safe { version } => {
                let mut bytes = b"safe:".to_vec();
                bytes.extend_from_slice(version.as_bytes());
                bytes
            }
        }
    }
}

// ============================================================================
// Counterfactual Address
// ============================================================================

/// Compute the counterfactual address for a smart account
///
/// Uses CREATE2: address = keccak256(0xff || factory || salt || keccak256(initCode))[12:]
///
/// Deterministic in (owner address, variant parameters, entry-point
/// version); no chain state and no on-chain transaction is required.
pub fn counterfactual_address(
    owner: &str,
    params: &VariantParams,
    entry_point: EntryPointVersion,
) -> Result<String> {
    let owner_addr = Address::from_str(owner)
        .map_err(|e| Error::DerivationFailed(format!("Invalid owner address: {}", e)))?;
    let factory = Address::from_str(params.factory())
        .map_err(|e| Error::InvalidConfig(format!("Invalid factory address: {}", e)))?;
    let entry_point_addr = Address::from_str(entry_point.address())
        .map_err(|e| Error::InvalidConfig(format!("Invalid EntryPoint address: {}", e)))?;

    // Init code is factory-specific; hash over the inputs that pin the
    // deployment instead of fetching factory bytecode.
    let init_code_hash = {
        let mut input = Vec::new();
        input.extend_from_slice(owner_addr.as_slice());
        input.extend_from_slice(&params.encode());
        input.extend_from_slice(entry_point_addr.as_slice());
        keccak256(&input)
    };

    let mut buf = Vec::with_capacity(85);
    buf.push(0xff);
    buf.extend_from_slice(factory.as_slice());
    buf.extend_from_slice(&params.salt());
    buf.extend_from_slice(&init_code_hash);
    let hash = keccak256(&buf);

    // Take last 20 bytes
    Ok(format!("0x{}", hex::encode(&hash[12..])))
}

// ============================================================================
// Smart Account Descriptor
// ============================================================================

/// A constructed, not yet transaction-capable, smart account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartAccount {
    /// Counterfactual on-chain address
    pub address: String,
    /// Owning EOA address
    pub owner: String,
    /// Implementation variant
    pub variant: AccountVariant,
    /// Construction parameters used for derivation
    pub params: VariantParams,
    /// Entry-point generation the account validates against
    pub entry_point: EntryPointVersion,
    /// Target chain
    pub chain_id: ChainId,
}

impl SmartAccount {
    /// Factory call data used to deploy the account on first operation
    pub fn init_code(&self) -> Result<Vec<u8>> {
        let factory = Address::from_str(self.params.factory())
            .map_err(|e| Error::InvalidConfig(format!("Invalid factory address: {}", e)))?;
        let owner = Address::from_str(&self.owner)
            .map_err(|e| Error::DerivationFailed(format!("Invalid owner address: {}", e)))?;

        let mut code = factory.as_slice().to_vec();
        code.extend_from_slice(owner.as_slice());
        code.extend_from_slice(&self.params.salt());
        Ok(code)
    }
}

/// Construct the account descriptor for a signer and variant
///
/// Verifies the variant/chain entry-point pairing, checks that the
/// variant's factory exists on the target chain, and derives the
/// counterfactual address. An unreachable RPC surfaces as
/// `DerivationFailed`, which is safe to retry with the same inputs.
pub async fn build_account(
    signer: &ChainSigner,
    variant: AccountVariant,
    chain: &ChainContext,
    rpc: &dyn JsonRpc,
) -> Result<SmartAccount> {
    let required = variant.entry_point_version();
    if required != chain.entry_point {
        return Err(Error::InvalidConfig(format!(
            "{} accounts require EntryPoint {}, chain context is configured for {}",
            variant, required, chain.entry_point
        )));
    }

    let params = VariantParams::for_variant(variant);

    let code: String = call_typed(
        rpc,
        "eth_getCode",
        serde_json::json!([params.factory(), "latest"]),
    )
    .await
    .map_err(|e| Error::DerivationFailed(format!("factory code read failed: {}", e)))?;

    if code == "0x" || code == "0x0" {
        return Err(Error::DerivationFailed(format!(
            "account factory {} not deployed on {}",
            params.factory(),
            chain.chain_id
        )));
    }

    let address = counterfactual_address(signer.address(), &params, required)?;
    tracing::debug!(owner = %signer.address(), %variant, %address, "derived counterfactual address");

    Ok(SmartAccount {
        address,
        owner: signer.address().to_string(),
        variant,
        params,
        entry_point: required,
        chain_id: chain.chain_id,
    })
}

// ============================================================================
// UserOperation
// ============================================================================

/// ERC-4337 UserOperation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// Smart account address
    pub sender: String,
    /// Anti-replay nonce
    pub nonce: U256,
    /// Account initialization code (empty if account exists)
    #[serde(with = "bytes_hex")]
    pub init_code: Vec<u8>,
    /// Encoded call to execute
    #[serde(with = "bytes_hex")]
    pub call_data: Vec<u8>,
    /// Gas for the execution call
    pub call_gas_limit: U256,
    /// Gas for signature verification and account creation
    pub verification_gas_limit: U256,
    /// Pre-verification gas
    pub pre_verification_gas: U256,
    /// Maximum fee per gas
    pub max_fee_per_gas: U256,
    /// Maximum priority fee per gas
    pub max_priority_fee_per_gas: U256,
    /// Paymaster and data (empty if self-paying)
    #[serde(with = "bytes_hex")]
    pub paymaster_and_data: Vec<u8>,
    /// Signature
    #[serde(with = "bytes_hex")]
    pub signature: Vec<u8>,
}

mod bytes_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

impl UserOperation {
    /// Create a new UserOperation
    pub fn new(sender: impl Into<String>, nonce: U256, call_data: Vec<u8>) -> Self {
        Self {
            sender: sender.into(),
            nonce,
            init_code: vec![],
            call_data,
            call_gas_limit: U256::from(100_000),
            verification_gas_limit: U256::from(100_000),
            pre_verification_gas: U256::from(21_000),
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            paymaster_and_data: vec![],
            signature: vec![],
        }
    }

    /// Set gas prices
    pub fn with_gas_prices(mut self, max_fee: u128, max_priority_fee: u128) -> Self {
        self.max_fee_per_gas = U256::from(max_fee);
        self.max_priority_fee_per_gas = U256::from(max_priority_fee);
        self
    }

    /// Set signature
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = signature;
        self
    }

    /// Calculate the hash to sign for the given entry-point generation
    pub fn hash(&self, entry_point: EntryPointVersion, chain_id: u64) -> Result<[u8; 32]> {
        let entry_point_addr = Address::from_str(entry_point.address())
            .map_err(|e| Error::InvalidConfig(format!("Invalid EntryPoint address: {}", e)))?;

        let packed = match entry_point {
            EntryPointVersion::V06 => self.pack_v06()?,
            EntryPointVersion::V07 => self.pack_v07()?,
        };

        let inner_hash = keccak256(&packed);

        // keccak256(innerHash || entryPoint || chainId)
        let mut outer = Vec::with_capacity(84);
        outer.extend_from_slice(&inner_hash);
        outer.extend_from_slice(entry_point_addr.as_slice());
        let mut chain_id_bytes = [0u8; 32];
        chain_id_bytes[24..].copy_from_slice(&chain_id.to_be_bytes());
        outer.extend_from_slice(&chain_id_bytes);

        Ok(keccak256(&outer))
    }

    /// Pack fields for hashing (v0.6 layout)
    fn pack_v06(&self) -> Result<Vec<u8>> {
        let sender = Address::from_str(&self.sender)
            .map_err(|e| Error::InvalidConfig(format!("Invalid sender: {}", e)))?;

        let mut packed = Vec::new();

        // sender (address - 32 bytes padded)
        packed.extend_from_slice(&[0u8; 12]);
        packed.extend_from_slice(sender.as_slice());
        packed.extend_from_slice(&self.nonce.to_be_bytes::<32>());
        packed.extend_from_slice(&keccak256(&self.init_code));
        packed.extend_from_slice(&keccak256(&self.call_data));
        packed.extend_from_slice(&self.call_gas_limit.to_be_bytes::<32>());
        packed.extend_from_slice(&self.verification_gas_limit.to_be_bytes::<32>());
        packed.extend_from_slice(&self.pre_verification_gas.to_be_bytes::<32>());
        packed.extend_from_slice(&self.max_fee_per_gas.to_be_bytes::<32>());
        packed.extend_from_slice(&self.max_priority_fee_per_gas.to_be_bytes::<32>());
        packed.extend_from_slice(&keccak256(&self.paymaster_and_data));

        Ok(packed)
    }

    /// Pack fields for hashing (v0.7 layout: gas limits and fees are
    /// packed pairwise into single words)
    fn pack_v07(&self) -> Result<Vec<u8>> {
        let sender = Address::from_str(&self.sender)
            .map_err(|e| Error::InvalidConfig(format!("Invalid sender: {}", e)))?;

        let mut packed = Vec::new();

        packed.extend_from_slice(&[0u8; 12]);
        packed.extend_from_slice(sender.as_slice());
        packed.extend_from_slice(&self.nonce.to_be_bytes::<32>());
        packed.extend_from_slice(&keccak256(&self.init_code));
        packed.extend_from_slice(&keccak256(&self.call_data));
        packed.extend_from_slice(&pack_pair(
            self.verification_gas_limit,
            self.call_gas_limit,
        ));
        packed.extend_from_slice(&self.pre_verification_gas.to_be_bytes::<32>());
        packed.extend_from_slice(&pack_pair(
            self.max_priority_fee_per_gas,
            self.max_fee_per_gas,
        ));
        packed.extend_from_slice(&keccak256(&self.paymaster_and_data));

        Ok(packed)
    }

    /// Convert to the JSON-RPC wire form for the given generation
    ///
    /// v0.7 splits `initCode` into `factory`/`factoryData` and
    /// `paymasterAndData` into `paymaster`/`paymasterData`.
    pub fn to_rpc_format(&self, entry_point: EntryPointVersion) -> serde_json::Value {
        match entry_point {
            EntryPointVersion::V06 => serde_json::json!({
                "sender": self.sender,
                "nonce": format!("0x{:x}", self.nonce),
                "initCode": format!("0x{}", hex::encode(&self.init_code)),
                "callData": format!("0x{}", hex::encode(&self.call_data)),
                "callGasLimit": format!("0x{:x}", self.call_gas_limit),
                "verificationGasLimit": format!("0x{:x}", self.verification_gas_limit),
                "preVerificationGas": format!("0x{:x}", self.pre_verification_gas),
                "maxFeePerGas": format!("0x{:x}", self.max_fee_per_gas),
                "maxPriorityFeePerGas": format!("0x{:x}", self.max_priority_fee_per_gas),
                "paymasterAndData": format!("0x{}", hex::encode(&self.paymaster_and_data)),
                "signature": format!("0x{}", hex::encode(&self.signature)),
            }),
            EntryPointVersion::V07 => {
                let mut op = serde_json::json!({
                    "sender": self.sender,
                    "nonce": format!("0x{:x}", self.nonce),
                    "callData": format!("0x{}", hex::encode(&self.call_data)),
                    "callGasLimit": format!("0x{:x}", self.call_gas_limit),
                    "verificationGasLimit": format!("0x{:x}", self.verification_gas_limit),
                    "preVerificationGas": format!("0x{:x}", self.pre_verification_gas),
                    "maxFeePerGas": format!("0x{:x}", self.max_fee_per_gas),
                    "maxPriorityFeePerGas": format!("0x{:x}", self.max_priority_fee_per_gas),
                    "signature": format!("0x{}", hex::encode(&self.signature)),
                });
                if self.init_code.len() >= 20 {
                    op["factory"] = serde_json::json!(format!(
                        "0x{}",
                        hex::encode(&self.init_code[..20])
                    ));
                    op["factoryData"] = serde_json::json!(format!(
                        "0x{}",
                        hex::encode(&self.init_code[20..])
                    ));
                }
                if self.paymaster_and_data.len() >= 20 {
                    op["paymaster"] = serde_json::json!(format!(
                        "0x{}",
                        hex::encode(&self.paymaster_and_data[..20])
                    ));
                    op["paymasterData"] = serde_json::json!(format!(
                        "0x{}",
                        hex::encode(&self.paymaster_and_data[20..])
                    ));
                }
                op
            }
        }
    }
}

/// Pack two 128-bit values into one 32-byte word (high || low)
fn pack_pair(high: U256, low: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(&high.to_be_bytes::<32>()[16..]);
    out[16..].copy_from_slice(&low.to_be_bytes::<32>()[16..]);
    out
}

// ============================================================================
// Call Encoding
// ============================================================================

/// Build call data for execute(address,uint256,bytes)
pub fn encode_execute(to: &str, value: U256, data: &[u8]) -> Result<Vec<u8>> {
    let to_addr =
        Address::from_str(to).map_err(|e| Error::InvalidConfig(format!("Invalid address: {}", e)))?;

    // keccak256("execute(address,uint256,bytes)")[:4] = 0xb61d27f6
    let selector = [0xb6, 0x1d, 0x27, 0xf6];

    let mut encoded = selector.to_vec();

    // address (32 bytes padded)
    encoded.extend_from_slice(&[0u8; 12]);
    encoded.extend_from_slice(to_addr.as_slice());

    // uint256 value
    encoded.extend_from_slice(&value.to_be_bytes::<32>());

    // bytes data - encoded as (offset, length, data); offset is 96
    encoded.extend_from_slice(&U256::from(96u64).to_be_bytes::<32>());
    encoded.extend_from_slice(&U256::from(data.len()).to_be_bytes::<32>());
    encoded.extend_from_slice(data);
    let padding = (32 - (data.len() % 32)) % 32;
    encoded.extend_from_slice(&vec![0u8; padding]);

    Ok(encoded)
}

/// Build call data for EntryPoint getNonce(address,uint192)
pub(crate) fn encode_get_nonce(address: &str, key: u64) -> Result<Vec<u8>> {
    let addr = Address::from_str(address)
        .map_err(|e| Error::InvalidConfig(format!("Invalid address: {}", e)))?;

    // keccak256("getNonce(address,uint192)")[:4] = 0x35567e1a
    let selector = [0x35, 0x56, 0x7e, 0x1a];

    let mut encoded = selector.to_vec();
    encoded.extend_from_slice(&[0u8; 12]);
    encoded.extend_from_slice(addr.as_slice());
    encoded.extend_from_slice(&U256::from(key).to_be_bytes::<32>());

    Ok(encoded)
}

/// Parse a hex-quantity JSON value as U256
pub(crate) fn parse_u256(value: &serde_json::Value) -> Result<U256> {
    let s = value
        .as_str()
        .ok_or_else(|| Error::Rpc("Expected hex string".into()))?;
    let s = s.strip_prefix("0x").unwrap_or(s);

    if s.is_empty() || s == "0" {
        return Ok(U256::ZERO);
    }

    let bytes = hex::decode(format!("{:0>64}", s))
        .map_err(|e| Error::Rpc(format!("Failed to decode U256: {}", e)))?;

    Ok(U256::from_be_slice(&bytes))
}
