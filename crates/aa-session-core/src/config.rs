//! Environment configuration
//!
//! Recognized options:
//!
//! - `AA_SESSION_BUNDLER_URL` - bundler endpoint (required)
//! - `AA_SESSION_PAYMASTER_URL` - paymaster endpoint (required)
//! - `AA_SESSION_CHAIN_ID` - numeric target chain id (default: 84532)
//! - `AA_SESSION_ACCOUNT_VARIANT` - light | kernel | safe (default: safe)
//! - `AA_SESSION_RPC_URL` - comma-separated RPC override (optional)
//!
//! These select which entry-point generation and which remote services
//! the pipeline targets. A missing required endpoint surfaces as a
//! configuration error when the middleware is wired, never silently.

use crate::middleware::{Bundler, HttpBundlerClient, HttpPaymasterClient, Paymaster};
use crate::rpc::HttpRpc;
use crate::types::{AccountVariant, ChainContext, ChainId};
use crate::{Error, Result};
use std::sync::Arc;

pub const ENV_BUNDLER_URL: &str = "AA_SESSION_BUNDLER_URL";
pub const ENV_PAYMASTER_URL: &str = "AA_SESSION_PAYMASTER_URL";
pub const ENV_CHAIN_ID: &str = "AA_SESSION_CHAIN_ID";
pub const ENV_ACCOUNT_VARIANT: &str = "AA_SESSION_ACCOUNT_VARIANT";
pub const ENV_RPC_URL: &str = "AA_SESSION_RPC_URL";

/// Resolved configuration for one session stack
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Bundler endpoint URL
    pub bundler_url: String,
    /// Paymaster endpoint URL
    pub paymaster_url: String,
    /// Target chain
    pub chain_id: ChainId,
    /// Smart account variant to construct
    pub variant: AccountVariant,
    /// RPC endpoint override; empty means use the chain preset
    pub rpc_urls: Vec<String>,
}

impl StackConfig {
    /// Create a configuration explicitly
    pub fn new(
        bundler_url: impl Into<String>,
        paymaster_url: impl Into<String>,
        chain_id: ChainId,
        variant: AccountVariant,
    ) -> Self {
        Self {
            bundler_url: bundler_url.into(),
            paymaster_url: paymaster_url.into(),
            chain_id,
            variant,
            rpc_urls: vec![],
        }
    }

    /// Override the chain's RPC endpoints
    pub fn with_rpc_urls(mut self, urls: Vec<String>) -> Self {
        self.rpc_urls = urls;
        self
    }

    /// Resolve configuration from the environment
    pub fn from_env() -> Result<Self> {
        let bundler_url = require_env(ENV_BUNDLER_URL)?;
        let paymaster_url = require_env(ENV_PAYMASTER_URL)?;

        let chain_id = match std::env::var(ENV_CHAIN_ID) {
            Ok(s) => ChainId(s.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{} must be a numeric chain id, got {:?}", ENV_CHAIN_ID, s))
            })?),
            Err(_) => ChainId::BASE_SEPOLIA,
        };

        let variant = match std::env::var(ENV_ACCOUNT_VARIANT) {
            Ok(s) => s.parse()?,
            Err(_) => AccountVariant::Safe,
        };

        let rpc_urls = std::env::var(ENV_RPC_URL)
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bundler_url,
            paymaster_url,
            chain_id,
            variant,
            rpc_urls,
        })
    }

    /// Chain context this configuration targets
    ///
    /// The entry-point version follows the selected variant; unknown
    /// chains require an explicit RPC endpoint.
    pub fn chain_context(&self) -> Result<ChainContext> {
        let entry_point = self.variant.entry_point_version();

        let mut ctx = match ChainContext::preset(self.chain_id, entry_point) {
            Some(ctx) => ctx,
            None => {
                if self.rpc_urls.is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "no RPC endpoint configured for chain {}",
                        self.chain_id
                    )));
                }
                ChainContext::custom(self.chain_id.0, self.rpc_urls.clone(), entry_point)
            }
        };

        if !self.rpc_urls.is_empty() {
            ctx.rpc_urls = self.rpc_urls.clone();
        }

        Ok(ctx)
    }

    /// Construct the chain RPC client
    pub fn rpc(&self) -> Result<HttpRpc> {
        HttpRpc::new(self.chain_context()?.rpc_urls)
    }

    /// Construct the paymaster client for this configuration
    pub fn paymaster(&self) -> Result<Arc<dyn Paymaster>> {
        Ok(Arc::new(HttpPaymasterClient::new(
            &self.paymaster_url,
            self.variant.entry_point_version(),
        )?))
    }

    /// Construct the bundler client for this configuration
    pub fn bundler(&self) -> Result<Arc<dyn Bundler>> {
        Ok(Arc::new(HttpBundlerClient::new(
            &self.bundler_url,
            self.variant.entry_point_version(),
        )?))
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::InvalidConfig(format!("{} is required", name)))
}
