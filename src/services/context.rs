use crate::config::Config;
use crate::error::MedVaultError;
use crate::models::{NetworkProfile, SEGMENT_SIZE};
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, U256},
};
use std::sync::Arc;

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Provider/signer pair every chain-touching operation runs against.
/// Constructed once per call context and passed in; there is no shared
/// process-wide instance.
pub struct ChainContext {
    pub provider: Arc<Provider<Http>>,
    pub client: Arc<SignerClient>,
}

impl ChainContext {
    pub async fn connect(config: &Config) -> Result<Self, MedVaultError> {
        let provider =
            Self::probe_provider(&config.rpc_url, config.rpc_fallback.as_deref()).await?;

        let wallet = config
            .signer_private_key
            .parse::<LocalWallet>()
            .map_err(|e| MedVaultError::SignerUnavailable(e.to_string()))?
            .with_chain_id(config.chain_id);

        tracing::info!(signer = %wallet.address(), "Signer attached");

        let client = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));
        Ok(Self { provider, client })
    }

    /// Non-probing constructor; tests and callers that manage their own
    /// connection lifecycle use this.
    pub fn new(provider: Provider<Http>, wallet: LocalWallet) -> Self {
        let provider = Arc::new(provider);
        let client = Arc::new(SignerMiddleware::new((*provider).clone(), wallet));
        Self { provider, client }
    }

    pub fn sender_address(&self) -> Address {
        self.client.address()
    }

    async fn probe_provider(
        rpc_url: &str,
        fallback_url: Option<&str>,
    ) -> Result<Arc<Provider<Http>>, MedVaultError> {
        let primary = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| MedVaultError::ProviderUnavailable(e.to_string()))?;

        match primary.get_block_number().await {
            Ok(block_number) => {
                tracing::info!(%block_number, "Chain RPC connected");
                return Ok(Arc::new(primary));
            }
            Err(e) if fallback_url.is_some() => {
                tracing::warn!(error = %e, "Primary RPC unreachable, trying fallback");
            }
            Err(e) => return Err(MedVaultError::ProviderUnavailable(e.to_string())),
        }

        let fallback = Provider::<Http>::try_from(fallback_url.unwrap_or_default())
            .map_err(|e| MedVaultError::ProviderUnavailable(e.to_string()))?;
        let block_number = fallback
            .get_block_number()
            .await
            .map_err(|e| MedVaultError::ProviderUnavailable(e.to_string()))?;

        tracing::info!(%block_number, "Chain RPC connected via fallback");
        Ok(Arc::new(fallback))
    }
}

/// Storage fee owed for a payload, charged per 256-byte segment at the
/// profile's rate. Pure: no clock, no network, no state.
pub fn compute_storage_fee(payload_len: usize, profile: NetworkProfile) -> U256 {
    // An empty payload still occupies an index entry, so it pays for one
    // segment; the flow contract rejects zero-value submissions.
    let segments = payload_len.div_ceil(SEGMENT_SIZE).max(1);
    profile.fee_per_segment() * U256::from(segments as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_deterministic() {
        let a = compute_storage_fee(1024, NetworkProfile::Standard);
        let b = compute_storage_fee(1024, NetworkProfile::Standard);
        assert_eq!(a, b);
    }

    #[test]
    fn fee_charges_whole_segments() {
        let one = compute_storage_fee(1, NetworkProfile::Standard);
        let full = compute_storage_fee(SEGMENT_SIZE, NetworkProfile::Standard);
        assert_eq!(one, full);

        let two = compute_storage_fee(SEGMENT_SIZE + 1, NetworkProfile::Standard);
        assert_eq!(two, full * 2);
    }

    #[test]
    fn empty_payload_pays_one_segment() {
        let fee = compute_storage_fee(0, NetworkProfile::Turbo);
        assert_eq!(fee, NetworkProfile::Turbo.fee_per_segment());
    }

    #[test]
    fn turbo_pays_a_premium() {
        let standard = compute_storage_fee(4096, NetworkProfile::Standard);
        let turbo = compute_storage_fee(4096, NetworkProfile::Turbo);
        assert!(turbo > standard);
    }
}
