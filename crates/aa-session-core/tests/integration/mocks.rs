//! Mock collaborators shared by the integration tests
//!
//! Each mock stands in for one external interface: the authentication
//! collaborator (wallet + identity), the chain RPC, and the
//! bundler/paymaster services.

use aa_session_core::account::{KERNEL_FACTORY, LIGHT_ACCOUNT_FACTORY, SAFE_PROXY_FACTORY};
use aa_session_core::{
    keccak256, AccountVariant, Bundler, ChainContext, ChainId, EntryPointVersion, Error, GasFees,
    IdentityProvider, JsonRpc, LinkRecord, Paymaster, PrimaryWallet, Result, SessionManager,
    SignInChallenge, SponsorshipData, UserOperation, UserOperationReceipt,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================================
// Primary Wallet
// ============================================================================

pub struct MockWallet {
    address: String,
    has_provider: bool,
    refuse_switch: bool,
    refuse_sign: bool,
    pub sign_count: AtomicUsize,
    switch_started: Option<Arc<Notify>>,
    switch_gate: Option<Arc<Notify>>,
}

impl MockWallet {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            has_provider: true,
            refuse_switch: false,
            refuse_sign: false,
            sign_count: AtomicUsize::new(0),
            switch_started: None,
            switch_gate: None,
        }
    }

    pub fn without_provider(mut self) -> Self {
        self.has_provider = false;
        self
    }

    pub fn refusing_switch(mut self) -> Self {
        self.refuse_switch = true;
        self
    }

    pub fn refusing_sign(mut self) -> Self {
        self.refuse_sign = true;
        self
    }

    /// Park the chain switch on `gate`, signalling `started` on entry
    pub fn with_switch_rendezvous(mut self, started: Arc<Notify>, gate: Arc<Notify>) -> Self {
        self.switch_started = Some(started);
        self.switch_gate = Some(gate);
        self
    }

    fn fake_signature(&self, message: &[u8]) -> Vec<u8> {
        let mut sig = keccak256(message).to_vec();
        sig.extend_from_slice(&keccak256(self.address.as_bytes()));
        sig.push(27);
        sig
    }
}

#[async_trait]
impl PrimaryWallet for MockWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn has_provider(&self) -> bool {
        self.has_provider
    }

    async fn switch_chain(&self, _chain_id: ChainId) -> Result<()> {
        if let Some(started) = &self.switch_started {
            started.notify_one();
        }
        if let Some(gate) = &self.switch_gate {
            gate.notified().await;
        }
        if self.refuse_switch {
            return Err(Error::SignerUnavailable("user rejected chain switch".into()));
        }
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>> {
        if self.refuse_sign {
            return Err(Error::SigningDeclined("user rejected signature".into()));
        }
        self.sign_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.fake_signature(message))
    }

    async fn sign_typed_data(&self, payload: &serde_json::Value) -> Result<Vec<u8>> {
        if self.refuse_sign {
            return Err(Error::SigningDeclined("user rejected signature".into()));
        }
        self.sign_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.fake_signature(payload.to_string().as_bytes()))
    }
}

// ============================================================================
// Chain RPC
// ============================================================================

pub struct MockRpc {
    pub fail: AtomicBool,
    chain_id: u64,
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            chain_id: 84532,
        }
    }
}

#[async_trait]
impl JsonRpc for MockRpc {
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Rpc("connection refused".into()));
        }

        match method {
            "eth_getCode" => {
                let addr = params[0].as_str().unwrap_or_default();
                let factories = [LIGHT_ACCOUNT_FACTORY, KERNEL_FACTORY, SAFE_PROXY_FACTORY];
                if factories.iter().any(|f| f.eq_ignore_ascii_case(addr)) {
                    Ok(serde_json::json!("0x60806040"))
                } else {
                    Ok(serde_json::json!("0x"))
                }
            }
            "eth_call" => Ok(serde_json::json!(format!("0x{}", "00".repeat(32)))),
            "eth_chainId" => Ok(serde_json::json!(format!("0x{:x}", self.chain_id))),
            other => Err(Error::Rpc(format!("unexpected method {}", other))),
        }
    }
}

// ============================================================================
// Paymaster
// ============================================================================

pub struct MockPaymaster {
    entry_point: EntryPointVersion,
    unreachable: bool,
    decline: bool,
    pub sponsored: AtomicUsize,
}

impl MockPaymaster {
    pub fn new(entry_point: EntryPointVersion) -> Self {
        Self {
            entry_point,
            unreachable: false,
            decline: false,
            sponsored: AtomicUsize::new(0),
        }
    }

    pub fn unreachable(entry_point: EntryPointVersion) -> Self {
        Self {
            unreachable: true,
            ..Self::new(entry_point)
        }
    }

    pub fn declining(entry_point: EntryPointVersion) -> Self {
        Self {
            decline: true,
            ..Self::new(entry_point)
        }
    }
}

#[async_trait]
impl Paymaster for MockPaymaster {
    fn entry_point(&self) -> EntryPointVersion {
        self.entry_point
    }

    async fn probe(&self, _chain: &ChainContext) -> Result<()> {
        if self.unreachable {
            return Err(Error::MiddlewareUnavailable(
                "paymaster endpoint unreachable".into(),
            ));
        }
        Ok(())
    }

    async fn sponsor_user_operation(
        &self,
        _op: &UserOperation,
        _chain_id: ChainId,
    ) -> Result<SponsorshipData> {
        if self.decline {
            return Err(Error::SponsorshipRejected(
                "operation not eligible for sponsorship".into(),
            ));
        }
        self.sponsored.fetch_add(1, Ordering::SeqCst);
        Ok(SponsorshipData {
            paymaster_and_data: vec![0xaa; 24],
            ..Default::default()
        })
    }
}

// ============================================================================
// Bundler
// ============================================================================

pub struct MockBundler {
    entry_point: EntryPointVersion,
    unreachable: bool,
    reject: bool,
    pub submitted: AtomicUsize,
    pub last_op: Mutex<Option<UserOperation>>,
}

impl MockBundler {
    pub fn new(entry_point: EntryPointVersion) -> Self {
        Self {
            entry_point,
            unreachable: false,
            reject: false,
            submitted: AtomicUsize::new(0),
            last_op: Mutex::new(None),
        }
    }

    pub fn unreachable(entry_point: EntryPointVersion) -> Self {
        Self {
            unreachable: true,
            ..Self::new(entry_point)
        }
    }

    pub fn rejecting(entry_point: EntryPointVersion) -> Self {
        Self {
            reject: true,
            ..Self::new(entry_point)
        }
    }
}

#[async_trait]
impl Bundler for MockBundler {
    fn entry_point(&self) -> EntryPointVersion {
        self.entry_point
    }

    async fn probe(&self, _chain: &ChainContext) -> Result<()> {
        if self.unreachable {
            return Err(Error::MiddlewareUnavailable(
                "bundler endpoint unreachable".into(),
            ));
        }
        Ok(())
    }

    async fn gas_fees(&self) -> Result<GasFees> {
        Ok(GasFees {
            max_fee_per_gas: 1_500_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        })
    }

    async fn send_user_operation(&self, op: &UserOperation) -> Result<String> {
        if self.reject {
            return Err(Error::SubmissionFailed("bundler rejected operation".into()));
        }
        *self.last_op.lock().unwrap() = Some(op.clone());
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0x{}", hex::encode(keccak256(op.sender.as_bytes()))))
    }

    async fn user_operation_receipt(
        &self,
        _op_hash: &str,
    ) -> Result<Option<UserOperationReceipt>> {
        Ok(None)
    }
}

// ============================================================================
// Identity Provider
// ============================================================================

pub struct MockIdentity {
    pub linked: Mutex<Vec<LinkRecord>>,
    pub challenges_issued: AtomicUsize,
    pub submissions: AtomicUsize,
    reject_submissions: bool,
    fixed_nonce: Option<String>,
    nonce_counter: AtomicUsize,
    consumed_nonces: Mutex<HashSet<String>>,
    challenge_started: Option<Arc<Notify>>,
    challenge_gate: Option<Arc<Notify>>,
}

impl MockIdentity {
    pub fn new() -> Self {
        Self {
            linked: Mutex::new(vec![]),
            challenges_issued: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            reject_submissions: false,
            fixed_nonce: None,
            nonce_counter: AtomicUsize::new(0),
            consumed_nonces: Mutex::new(HashSet::new()),
            challenge_started: None,
            challenge_gate: None,
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject_submissions: true,
            ..Self::new()
        }
    }

    /// Always issue the same, already-consumed nonce
    pub fn with_stale_nonce() -> Self {
        let identity = Self::new();
        identity
            .consumed_nonces
            .lock()
            .unwrap()
            .insert("stale-nonce".to_string());
        Self {
            fixed_nonce: Some("stale-nonce".to_string()),
            ..identity
        }
    }

    /// Seed the identity with an existing link
    pub fn prelinked(address: &str, chain_id: &str) -> Self {
        let identity = Self::new();
        identity.linked.lock().unwrap().push(LinkRecord {
            address: address.to_string(),
            chain_id: chain_id.to_string(),
            linked_at: Utc::now(),
        });
        identity
    }

    /// Park challenge generation on `gate`, signalling `started` on entry
    pub fn with_challenge_rendezvous(started: Arc<Notify>, gate: Arc<Notify>) -> Self {
        Self {
            challenge_started: Some(started),
            challenge_gate: Some(gate),
            ..Self::new()
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn linked_addresses(&self, chain_id: &str) -> Result<Vec<String>> {
        Ok(self
            .linked
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.chain_id == chain_id)
            .map(|r| r.address.clone())
            .collect())
    }

    async fn generate_challenge(&self, address: &str, chain_id: &str) -> Result<SignInChallenge> {
        if let Some(started) = &self.challenge_started {
            started.notify_one();
        }
        if let Some(gate) = &self.challenge_gate {
            gate.notified().await;
        }

        self.challenges_issued.fetch_add(1, Ordering::SeqCst);
        let nonce = self.fixed_nonce.clone().unwrap_or_else(|| {
            format!("nonce-{}", self.nonce_counter.fetch_add(1, Ordering::SeqCst))
        });
        let message = format!(
            "example.app wants you to sign in with your Ethereum account:\n{}\n\nURI: https://example.app\nVersion: 1\nChain ID: {}\nNonce: {}",
            address, chain_id, nonce
        );

        Ok(SignInChallenge {
            address: address.to_string(),
            chain_id: chain_id.to_string(),
            nonce,
            issued_at: Utc::now(),
            message,
        })
    }

    async fn submit_link(
        &self,
        signature: &[u8],
        challenge: &SignInChallenge,
    ) -> Result<LinkRecord> {
        self.submissions.fetch_add(1, Ordering::SeqCst);

        if self.reject_submissions {
            return Err(Error::LinkingRejected("signature verification failed".into()));
        }
        if signature.len() != 65 {
            return Err(Error::LinkingRejected("malformed signature".into()));
        }
        if !self
            .consumed_nonces
            .lock()
            .unwrap()
            .insert(challenge.nonce.clone())
        {
            return Err(Error::LinkingRejected("nonce already used".into()));
        }

        let record = LinkRecord {
            address: challenge.address.clone(),
            chain_id: challenge.chain_id.clone(),
            linked_at: Utc::now(),
        };
        self.linked.lock().unwrap().push(record.clone());
        Ok(record)
    }
}

// ============================================================================
// Stack Assembly
// ============================================================================

pub struct TestStack {
    pub manager: Arc<SessionManager>,
    pub rpc: Arc<MockRpc>,
    pub paymaster: Arc<MockPaymaster>,
    pub bundler: Arc<MockBundler>,
}

pub fn build_stack(
    chain: ChainContext,
    variant: AccountVariant,
    paymaster: MockPaymaster,
    bundler: MockBundler,
) -> TestStack {
    let rpc = Arc::new(MockRpc::new());
    let paymaster = Arc::new(paymaster);
    let bundler = Arc::new(bundler);
    let manager = Arc::new(SessionManager::new(
        chain,
        variant,
        Arc::clone(&paymaster) as Arc<dyn Paymaster>,
        Arc::clone(&bundler) as Arc<dyn Bundler>,
        Arc::clone(&rpc) as Arc<dyn JsonRpc>,
    ));

    TestStack {
        manager,
        rpc,
        paymaster,
        bundler,
    }
}

/// Safe variant on Base Sepolia with healthy collaborators
pub fn safe_stack() -> TestStack {
    build_stack(
        ChainContext::base_sepolia(EntryPointVersion::V07),
        AccountVariant::Safe,
        MockPaymaster::new(EntryPointVersion::V07),
        MockBundler::new(EntryPointVersion::V07),
    )
}
