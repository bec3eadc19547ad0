use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    // Chain RPC
    pub rpc_url: String,
    pub rpc_fallback: Option<String>,
    pub chain_id: u64,

    // Contracts
    pub flow_contract: Address,
    pub consent_contract: Address,

    // Storage indexer endpoints, one per network profile
    pub indexer_url: String,
    pub indexer_turbo_url: String,

    // Signing
    pub signer_private_key: String,

    // Confirmation engine
    pub confirm_timeout_ms: u64,
    pub confirm_max_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            rpc_url: std::env::var("RPC_URL").context("RPC_URL required")?,
            rpc_fallback: std::env::var("RPC_FALLBACK").ok(),
            chain_id: std::env::var("CHAIN_ID")
                .unwrap_or_else(|_| "16600".to_string())
                .parse()
                .context("Invalid CHAIN_ID")?,

            flow_contract: Self::parse_address("FLOW_CONTRACT_ADDRESS")?,
            consent_contract: Self::parse_address("CONSENT_CONTRACT_ADDRESS")?,

            indexer_url: std::env::var("INDEXER_URL").context("INDEXER_URL required")?,
            indexer_turbo_url: std::env::var("INDEXER_TURBO_URL")
                .context("INDEXER_TURBO_URL required")?,

            signer_private_key: std::env::var("SIGNER_PRIVATE_KEY")
                .context("SIGNER_PRIVATE_KEY required")?,

            confirm_timeout_ms: std::env::var("CONFIRM_TIMEOUT_MS")
                .unwrap_or_else(|_| "300000".to_string())
                .parse()
                .context("Invalid CONFIRM_TIMEOUT_MS")?,
            confirm_max_retries: std::env::var("CONFIRM_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("Invalid CONFIRM_MAX_RETRIES")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_address(var: &str) -> Result<Address> {
        let addr_str = std::env::var(var).with_context(|| format!("{} required", var))?;
        Address::from_str(&addr_str).with_context(|| format!("Invalid address for {}", var))
    }

    fn validate(&self) -> Result<()> {
        if !self.rpc_url.starts_with("http") {
            bail!("RPC_URL must be HTTP(S) URL");
        }
        if !self.indexer_url.starts_with("http") {
            bail!("INDEXER_URL must be HTTP(S) URL");
        }
        if !self.indexer_turbo_url.starts_with("http") {
            bail!("INDEXER_TURBO_URL must be HTTP(S) URL");
        }
        if !self.signer_private_key.starts_with("0x") {
            bail!("SIGNER_PRIVATE_KEY must start with 0x");
        }
        if self.confirm_timeout_ms == 0 {
            bail!("CONFIRM_TIMEOUT_MS must be positive");
        }

        tracing::info!(
            chain_id = self.chain_id,
            "Configuration validated"
        );

        Ok(())
    }
}
