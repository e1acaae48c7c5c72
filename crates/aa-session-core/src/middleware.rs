//! Sponsorship middleware wiring
//!
//! Attaches paymaster (gas sponsorship) and bundler (fee quote,
//! submission) clients to a constructed account, producing the
//! session's transaction-capable client. Every outgoing operation is
//! annotated with sponsorship data, priced with the bundler's fast-tier
//! quote, signed, and submitted through the bundler; nothing is
//! broadcast directly.
//!
//! The entry-point version used by the account, the paymaster and the
//! bundler must be identical; mismatches fail at construction, not at
//! submission time.

use crate::account::{encode_execute, encode_get_nonce, parse_u256, SmartAccount, UserOperation};
use crate::rpc::{call_typed, HttpRpc, JsonRpc};
use crate::types::{keccak256, Call, ChainContext, ChainId, EntryPointVersion};
use crate::wallet::ChainSigner;
use crate::{Error, Result};
use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Middleware Contracts
// ============================================================================

/// Gas sponsorship data returned by a paymaster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SponsorshipData {
    /// Paymaster address and validation payload
    pub paymaster_and_data: Vec<u8>,
    /// Sponsor-adjusted gas limits, when provided
    pub call_gas_limit: Option<U256>,
    pub verification_gas_limit: Option<U256>,
    pub pre_verification_gas: Option<U256>,
}

/// Fee quote from the bundler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasFees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Receipt for a confirmed user operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOperationReceipt {
    pub user_op_hash: String,
    pub sender: String,
    pub success: bool,
    pub actual_gas_cost: U256,
    pub tx_hash: String,
    pub block_number: u64,
}

/// Gas sponsorship service contract
#[async_trait]
pub trait Paymaster: Send + Sync {
    /// Entry-point generation this paymaster validates against
    fn entry_point(&self) -> EntryPointVersion;

    /// Reachability and configuration check, run once at wiring time
    async fn probe(&self, chain: &ChainContext) -> Result<()>;

    /// Ask whether the operation's gas will be sponsored, and with what data
    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        chain_id: ChainId,
    ) -> Result<SponsorshipData>;
}

/// Operation relay service contract
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Entry-point generation this bundler submits to
    fn entry_point(&self) -> EntryPointVersion;

    /// Reachability and configuration check, run once at wiring time
    async fn probe(&self, chain: &ChainContext) -> Result<()>;

    /// Current recommended fees (fast tier)
    async fn gas_fees(&self) -> Result<GasFees>;

    /// Submit a signed operation; returns the operation hash
    async fn send_user_operation(&self, op: &UserOperation) -> Result<String>;

    /// Fetch the receipt for a submitted operation, if mined
    async fn user_operation_receipt(&self, op_hash: &str) -> Result<Option<UserOperationReceipt>>;
}

// ============================================================================
// HTTP Clients
// ============================================================================

/// HTTP paymaster client speaking the pm_ JSON-RPC dialect
pub struct HttpPaymasterClient {
    rpc: HttpRpc,
    entry_point: EntryPointVersion,
    url: String,
}

impl HttpPaymasterClient {
    /// Create a paymaster client scoped to one endpoint and entry point
    pub fn new(url: impl Into<String>, entry_point: EntryPointVersion) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "Paymaster endpoint URL is required".into(),
            ));
        }
        Ok(Self {
            rpc: HttpRpc::single(url.clone())?,
            entry_point,
            url,
        })
    }
}

#[async_trait]
impl Paymaster for HttpPaymasterClient {
    fn entry_point(&self) -> EntryPointVersion {
        self.entry_point
    }

    async fn probe(&self, chain: &ChainContext) -> Result<()> {
        let id: String = call_typed(&self.rpc, "eth_chainId", serde_json::json!([]))
            .await
            .map_err(|e| {
                Error::MiddlewareUnavailable(format!(
                    "paymaster endpoint {} unreachable: {}",
                    self.url, e
                ))
            })?;

        let id = u64::from_str_radix(id.trim_start_matches("0x"), 16)
            .map_err(|e| Error::MiddlewareUnavailable(format!("bad chain id from paymaster: {}", e)))?;

        if id != chain.chain_id.0 {
            return Err(Error::InvalidConfig(format!(
                "paymaster serves chain {}, session targets {}",
                id, chain.chain_id
            )));
        }

        Ok(())
    }

    async fn sponsor_user_operation(
        &self,
        op: &UserOperation,
        _chain_id: ChainId,
    ) -> Result<SponsorshipData> {
        let result = self
            .rpc
            .call(
                "pm_sponsorUserOperation",
                serde_json::json!([
                    op.to_rpc_format(self.entry_point),
                    self.entry_point.address()
                ]),
            )
            .await
            .map_err(|e| Error::SponsorshipRejected(e.to_string()))?;

        let paymaster_and_data = if let Some(s) =
            result.get("paymasterAndData").and_then(|v| v.as_str())
        {
            decode_hex(s)?
        } else if let Some(p) = result.get("paymaster").and_then(|v| v.as_str()) {
            // v0.7 wire form returns the address and data separately
            let mut bytes = decode_hex(p)?;
            if let Some(d) = result.get("paymasterData").and_then(|v| v.as_str()) {
                bytes.extend_from_slice(&decode_hex(d)?);
            }
            bytes
        } else {
            return Err(Error::SponsorshipRejected(
                "paymaster returned no sponsorship data".into(),
            ));
        };

        Ok(SponsorshipData {
            paymaster_and_data,
            call_gas_limit: result.get("callGasLimit").and_then(|v| parse_u256(v).ok()),
            verification_gas_limit: result
                .get("verificationGasLimit")
                .and_then(|v| parse_u256(v).ok()),
            pre_verification_gas: result
                .get("preVerificationGas")
                .and_then(|v| parse_u256(v).ok()),
        })
    }
}

/// HTTP bundler client speaking the ERC-4337 bundler dialect
pub struct HttpBundlerClient {
    rpc: HttpRpc,
    entry_point: EntryPointVersion,
    url: String,
}

impl HttpBundlerClient {
    /// Create a bundler client scoped to one endpoint and entry point
    pub fn new(url: impl Into<String>, entry_point: EntryPointVersion) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "Bundler endpoint URL is required".into(),
            ));
        }
        Ok(Self {
            rpc: HttpRpc::single(url.clone())?,
            entry_point,
            url,
        })
    }
}

#[async_trait]
impl Bundler for HttpBundlerClient {
    fn entry_point(&self) -> EntryPointVersion {
        self.entry_point
    }

    async fn probe(&self, _chain: &ChainContext) -> Result<()> {
        let supported: Vec<String> =
            call_typed(&self.rpc, "eth_supportedEntryPoints", serde_json::json!([]))
                .await
                .map_err(|e| {
                    Error::MiddlewareUnavailable(format!(
                        "bundler endpoint {} unreachable: {}",
                        self.url, e
                    ))
                })?;

        let address = self.entry_point.address();
        if !supported.iter().any(|a| a.eq_ignore_ascii_case(address)) {
            return Err(Error::InvalidConfig(format!(
                "bundler at {} does not support EntryPoint {}",
                self.url, self.entry_point
            )));
        }

        Ok(())
    }

    async fn gas_fees(&self) -> Result<GasFees> {
        let result = self
            .rpc
            .call("pimlico_getUserOperationGasPrice", serde_json::json!([]))
            .await
            .map_err(|e| Error::SubmissionFailed(format!("fee quote unavailable: {}", e)))?;

        let fast = result
            .get("fast")
            .ok_or_else(|| Error::SubmissionFailed("fee quote missing fast tier".into()))?;

        Ok(GasFees {
            max_fee_per_gas: parse_hex_u128(fast.get("maxFeePerGas"))?,
            max_priority_fee_per_gas: parse_hex_u128(fast.get("maxPriorityFeePerGas"))?,
        })
    }

    async fn send_user_operation(&self, op: &UserOperation) -> Result<String> {
        call_typed(
            &self.rpc,
            "eth_sendUserOperation",
            serde_json::json!([
                op.to_rpc_format(self.entry_point),
                self.entry_point.address()
            ]),
        )
        .await
        .map_err(|e| Error::SubmissionFailed(e.to_string()))
    }

    async fn user_operation_receipt(&self, op_hash: &str) -> Result<Option<UserOperationReceipt>> {
        let result = self
            .rpc
            .call("eth_getUserOperationReceipt", serde_json::json!([op_hash]))
            .await
            .map_err(|e| Error::SubmissionFailed(e.to_string()))?;

        if result.is_null() {
            return Ok(None);
        }

        Ok(Some(UserOperationReceipt {
            user_op_hash: op_hash.to_string(),
            sender: result["sender"].as_str().unwrap_or_default().to_string(),
            success: result["success"].as_bool().unwrap_or(false),
            actual_gas_cost: parse_u256(&result["actualGasCost"]).unwrap_or(U256::ZERO),
            tx_hash: result["receipt"]["transactionHash"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            block_number: result["receipt"]["blockNumber"]
                .as_str()
                .and_then(|s| u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).ok())
                .unwrap_or(0),
        }))
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Wire sponsorship middleware onto a constructed account
///
/// Invariant: account, paymaster and bundler must agree on the
/// entry-point version. Both services are probed here so an unreachable
/// endpoint fails the wiring instead of the first submission.
pub async fn attach_middleware(
    account: SmartAccount,
    signer: ChainSigner,
    chain: ChainContext,
    paymaster: Arc<dyn Paymaster>,
    bundler: Arc<dyn Bundler>,
    rpc: Arc<dyn JsonRpc>,
) -> Result<SmartAccountClient> {
    let version = account.entry_point;

    if paymaster.entry_point() != version {
        return Err(Error::InvalidConfig(format!(
            "paymaster is configured for EntryPoint {}, account uses {}",
            paymaster.entry_point(),
            version
        )));
    }
    if bundler.entry_point() != version {
        return Err(Error::InvalidConfig(format!(
            "bundler is configured for EntryPoint {}, account uses {}",
            bundler.entry_point(),
            version
        )));
    }

    paymaster.probe(&chain).await?;
    bundler.probe(&chain).await?;

    Ok(SmartAccountClient {
        account,
        signer,
        chain,
        paymaster,
        bundler,
        rpc,
    })
}

// ============================================================================
// Smart Account Client
// ============================================================================

/// Transaction-capable client for a smart account session
///
/// The single capability handed to consumers: message signing and
/// sponsored operation submission, nothing else.
pub struct SmartAccountClient {
    account: SmartAccount,
    signer: ChainSigner,
    chain: ChainContext,
    paymaster: Arc<dyn Paymaster>,
    bundler: Arc<dyn Bundler>,
    rpc: Arc<dyn JsonRpc>,
}

impl SmartAccountClient {
    /// Smart account address
    pub fn address(&self) -> &str {
        &self.account.address
    }

    /// Owning EOA address
    pub fn owner(&self) -> &str {
        self.signer.address()
    }

    /// Entry-point generation every layer of this client targets
    pub fn entry_point(&self) -> EntryPointVersion {
        self.account.entry_point
    }

    /// Target chain
    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id
    }

    /// The underlying account descriptor
    pub fn account(&self) -> &SmartAccount {
        &self.account
    }

    /// Check if the account contract is already deployed
    async fn is_deployed(&self) -> Result<bool> {
        let code: String = call_typed(
            self.rpc.as_ref(),
            "eth_getCode",
            serde_json::json!([self.account.address, "latest"]),
        )
        .await
        .map_err(|e| Error::SubmissionFailed(format!("deployment check failed: {}", e)))?;

        Ok(code != "0x" && code != "0x0")
    }

    /// Read the account nonce from the entry point
    async fn entry_point_nonce(&self) -> Result<U256> {
        let call_data = encode_get_nonce(&self.account.address, 0)?;

        let result: String = call_typed(
            self.rpc.as_ref(),
            "eth_call",
            serde_json::json!([{
                "to": self.entry_point().address(),
                "data": format!("0x{}", hex::encode(&call_data)),
            }, "latest"]),
        )
        .await
        .map_err(|e| Error::SubmissionFailed(format!("nonce read failed: {}", e)))?;

        let bytes = decode_hex(&result)?;
        if bytes.len() < 32 {
            return Err(Error::SubmissionFailed("invalid nonce response".into()));
        }

        Ok(U256::from_be_slice(&bytes[..32]))
    }

    /// Build, sponsor, price, sign and submit one operation
    ///
    /// Failures surface by kind (`SponsorshipRejected`,
    /// `SubmissionFailed`, `SigningDeclined`) and are never retried
    /// here; the caller may want to adjust the operation first.
    pub async fn send_transaction(&self, call: &Call) -> Result<String> {
        let call_data = encode_execute(&call.to, call.value, &call.data)?;
        let nonce = self.entry_point_nonce().await?;

        let mut op = UserOperation::new(&self.account.address, nonce, call_data);
        if !self.is_deployed().await? {
            op.init_code = self.account.init_code()?;
        }

        let fees = self.bundler.gas_fees().await?;
        op = op.with_gas_prices(fees.max_fee_per_gas, fees.max_priority_fee_per_gas);

        let sponsorship = self
            .paymaster
            .sponsor_user_operation(&op, self.chain.chain_id)
            .await?;
        apply_sponsorship(&mut op, &sponsorship);

        let hash = op.hash(self.entry_point(), self.chain.chain_id.0)?;
        let signature = self.signer.sign_message(&hash).await?;
        op = op.with_signature(signature);

        let op_hash = self.bundler.send_user_operation(&op).await?;
        tracing::info!(%op_hash, sender = %self.account.address, "user operation submitted");

        Ok(op_hash)
    }

    /// Sign a message with the smart account as signing principal
    ///
    /// EIP-191 personal-message digest, with validation delegated to
    /// the owning signer (ERC-1271 style).
    pub async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = eip191_hash(message);
        self.signer.sign_message(&digest).await
    }

    /// Wait for the bundler to confirm an operation
    pub async fn wait_for_user_operation(
        &self,
        op_hash: &str,
        timeout_secs: u64,
    ) -> Result<UserOperationReceipt> {
        let start = std::time::Instant::now();
        let timeout = std::time::Duration::from_secs(timeout_secs);

        loop {
            if start.elapsed() > timeout {
                return Err(Error::Timeout(format!(
                    "user operation {} (after {}s)",
                    op_hash, timeout_secs
                )));
            }

            if let Some(receipt) = self.bundler.user_operation_receipt(op_hash).await? {
                return Ok(receipt);
            }

            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }
    }
}

impl std::fmt::Debug for SmartAccountClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartAccountClient")
            .field("address", &self.account.address)
            .field("entry_point", &self.account.entry_point)
            .field("chain_id", &self.chain.chain_id)
            .finish()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Fold sponsorship data into an operation
fn apply_sponsorship(op: &mut UserOperation, sponsorship: &SponsorshipData) {
    op.paymaster_and_data = sponsorship.paymaster_and_data.clone();
    if let Some(v) = sponsorship.call_gas_limit {
        op.call_gas_limit = v;
    }
    if let Some(v) = sponsorship.verification_gas_limit {
        op.verification_gas_limit = v;
    }
    if let Some(v) = sponsorship.pre_verification_gas {
        op.pre_verification_gas = v;
    }
}

/// EIP-191 personal-message digest
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message);
    keccak256(&data)
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| Error::Serialization(format!("invalid hex payload: {}", e)))
}

fn parse_hex_u128(value: Option<&serde_json::Value>) -> Result<u128> {
    let s = value
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::SubmissionFailed("fee quote missing field".into()))?;
    u128::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16)
        .map_err(|e| Error::SubmissionFailed(format!("bad fee quote: {}", e)))
}
