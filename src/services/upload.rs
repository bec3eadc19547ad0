use crate::config::Config;
use crate::contracts::MedVaultFlow;
use crate::error::MedVaultError;
use crate::models::{
    NetworkProfile, UploadDescriptor, UploadOptions, UploadPayload, UploadResult, DIRECT_UPLOAD,
    UNKNOWN_ROOT,
};
use crate::services::confirm::{Confirmation, ConfirmationEngine, RpcPendingHandle};
use crate::services::context::{compute_storage_fee, ChainContext};
use crate::services::merkle;
use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ethers::types::{Address, H256, U256};
use futures::FutureExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_FINALITY_POLL_MS: u64 = 3_000;
const DEFAULT_FINALITY_MAX_POLLS: u32 = 60;

/// Pushes a payload to the replicated storage network. Implementations must
/// not report success under `finality_required` until the network confirms
/// durable replication, not merely acceptance.
#[async_trait]
pub trait StorageIndexer: Send + Sync {
    async fn upload(&self, descriptor: &UploadDescriptor, options: &UploadOptions) -> Result<()>;
}

/// HTTP client for one indexer endpoint; the network profile decides which
/// endpoint a given upload talks to.
pub struct HttpIndexerClient {
    http: reqwest::Client,
    base_url: String,
    finality_poll_interval: Duration,
    finality_max_polls: u32,
}

impl HttpIndexerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            finality_poll_interval: Duration::from_millis(DEFAULT_FINALITY_POLL_MS),
            finality_max_polls: DEFAULT_FINALITY_MAX_POLLS,
        }
    }

    pub fn with_finality_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.finality_poll_interval = interval;
        self.finality_max_polls = max_polls;
        self
    }

    async fn wait_for_finality(&self, root: H256) -> Result<()> {
        #[derive(Deserialize)]
        struct FileInfo {
            finalized: bool,
        }

        let url = format!("{}/file/info/{:#x}", self.base_url, root);
        for _ in 0..self.finality_max_polls {
            let info: FileInfo = self
                .http
                .get(&url)
                .send()
                .await
                .context("indexer file-info query failed")?
                .error_for_status()
                .context("indexer file-info query rejected")?
                .json()
                .await
                .context("malformed file-info response")?;

            if info.finalized {
                tracing::debug!(root = %root, "Replication finalized");
                return Ok(());
            }
            tokio::time::sleep(self.finality_poll_interval).await;
        }

        bail!(
            "replication not finalized after {} polls",
            self.finality_max_polls
        )
    }
}

#[async_trait]
impl StorageIndexer for HttpIndexerClient {
    async fn upload(&self, descriptor: &UploadDescriptor, options: &UploadOptions) -> Result<()> {
        let url = format!("{}/file/segment", self.base_url);
        let body = json!({
            "root": descriptor.root.map(|r| format!("{:#x}", r)),
            "data": BASE64.encode(&descriptor.bytes),
            "options": options,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("indexer unreachable")?;

        if !response.status().is_success() {
            bail!("indexer rejected segment: {}", response.status());
        }

        if options.finality_required {
            match descriptor.root {
                Some(root) => self.wait_for_finality(root).await?,
                // Finality is tracked per root; with no root there is
                // nothing to poll, so the indexer ack has to stand.
                None => tracing::warn!("Finality requested without a root; accepting indexer ack"),
            }
        }

        Ok(())
    }
}

/// Orchestrates one upload: fee → root → optional on-chain flow record →
/// indexer push. Stateless between calls; durability lives in the chain and
/// the storage network.
pub struct UploadService {
    ctx: ChainContext,
    engine: ConfirmationEngine,
    flow_address: Address,
    standard_indexer: Arc<dyn StorageIndexer>,
    turbo_indexer: Arc<dyn StorageIndexer>,
}

impl UploadService {
    pub fn new(
        ctx: ChainContext,
        engine: ConfirmationEngine,
        flow_address: Address,
        standard_indexer: Arc<dyn StorageIndexer>,
        turbo_indexer: Arc<dyn StorageIndexer>,
    ) -> Self {
        Self {
            ctx,
            engine,
            flow_address,
            standard_indexer,
            turbo_indexer,
        }
    }

    pub fn from_config(ctx: ChainContext, config: &Config) -> Self {
        let engine = ConfirmationEngine::from_config(ctx.provider.clone(), config);
        let standard = Arc::new(HttpIndexerClient::new(&config.indexer_url));
        let turbo = Arc::new(HttpIndexerClient::new(&config.indexer_turbo_url));
        Self::new(ctx, engine, config.flow_contract, standard, turbo)
    }

    fn indexer_for(&self, profile: NetworkProfile) -> &dyn StorageIndexer {
        match profile {
            NetworkProfile::Standard => self.standard_indexer.as_ref(),
            NetworkProfile::Turbo => self.turbo_indexer.as_ref(),
        }
    }

    /// Uploads a payload, optionally recording the submission on-chain
    /// first. Root resolution is best-effort metadata: if it fails but the
    /// indexer push succeeds, the result carries the `unknown-hash`
    /// sentinel instead of failing the operation.
    pub async fn upload(
        &self,
        payload: UploadPayload,
        profile: NetworkProfile,
        require_onchain_record: bool,
    ) -> Result<UploadResult, MedVaultError> {
        let op = Uuid::new_v4();
        let fee = compute_storage_fee(payload.len(), profile);
        tracing::info!(
            %op,
            bytes = payload.len(),
            ?profile,
            %fee,
            require_onchain_record,
            "Upload started"
        );

        let root = match merkle::resolve_root(&payload) {
            Ok(root) => Some(root),
            Err(e) => {
                tracing::warn!(%op, error = %e, "Proceeding without content root");
                None
            }
        };

        let tx_hash = match (require_onchain_record, root) {
            (true, Some(root)) => {
                let confirmation = self.submit_flow_record(root, fee).await?;
                format!("{:#x}", confirmation.receipt.transaction_hash)
            }
            (true, None) => {
                // A flow record carries the root; with none resolved there
                // is nothing meaningful to record, so degrade to a direct
                // upload rather than fail a storable payload.
                tracing::warn!(%op, "No root resolved; skipping on-chain record");
                DIRECT_UPLOAD.to_string()
            }
            (false, _) => DIRECT_UPLOAD.to_string(),
        };

        let recorded_on_chain = tx_hash != DIRECT_UPLOAD;
        let descriptor = UploadDescriptor {
            bytes: payload.into_bytes(),
            root,
            fee,
            profile,
        };
        let options = UploadOptions::for_profile(profile, fee, recorded_on_chain);

        self.indexer_for(profile)
            .upload(&descriptor, &options)
            .await
            .map_err(MedVaultError::UploadFailed)?;

        let root = root
            .map(|r| format!("0x{}", hex::encode(r)))
            .unwrap_or_else(|| UNKNOWN_ROOT.to_string());
        tracing::info!(%op, %root, tx = %tx_hash, "Upload complete");

        Ok(UploadResult {
            success: true,
            root,
            tx_hash,
        })
    }

    /// Records the submission on the flow contract. The transaction value
    /// carries exactly the storage fee; there is no separate execution fee.
    async fn submit_flow_record(
        &self,
        root: H256,
        fee: U256,
    ) -> Result<Confirmation, MedVaultError> {
        let flow = MedVaultFlow::new(self.flow_address, self.ctx.client.clone());
        let lookup = self.engine.receipt_lookup();

        self.engine
            .submit_and_confirm(
                async move {
                    let call = flow.submit(root.to_fixed_bytes()).value(fee);
                    let pending = call
                        .send()
                        .await
                        .map_err(|e| MedVaultError::ProviderUnavailable(e.to_string()))?;
                    Ok(RpcPendingHandle::new(*pending, lookup))
                }
                .boxed(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::confirm::ReceiptLookup;
    use ethers::signers::LocalWallet;
    use ethers::types::TransactionReceipt;
    use ethers::utils::keccak256;
    use std::sync::Mutex;

    struct NullLookup;

    #[async_trait]
    impl ReceiptLookup for NullLookup {
        async fn receipt_by_hash(&self, _hash: H256) -> Result<Option<TransactionReceipt>> {
            Ok(None)
        }
    }

    struct RecordingIndexer {
        seen: Mutex<Vec<(Option<H256>, UploadOptions)>>,
        fail: bool,
    }

    impl RecordingIndexer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl StorageIndexer for RecordingIndexer {
        async fn upload(
            &self,
            descriptor: &UploadDescriptor,
            options: &UploadOptions,
        ) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push((descriptor.root, options.clone()));
            if self.fail {
                bail!("replica shortfall")
            }
            Ok(())
        }
    }

    fn service(indexer: Arc<RecordingIndexer>) -> UploadService {
        let provider = ethers::providers::Provider::try_from("http://localhost:8545").unwrap();
        let wallet: LocalWallet =
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .parse()
                .unwrap();
        let ctx = ChainContext::new(provider, wallet);
        let engine = ConfirmationEngine::new(Arc::new(NullLookup));
        UploadService::new(ctx, engine, Address::zero(), indexer.clone(), indexer)
    }

    #[tokio::test]
    async fn direct_upload_reports_root_and_sentinel_hash() {
        let indexer = RecordingIndexer::new(false);
        let service = service(indexer.clone());

        let bytes = vec![0xabu8; 100];
        let expected_root = H256::from(keccak256(&bytes));
        let result = service
            .upload(UploadPayload::new(bytes), NetworkProfile::Turbo, false)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.root, format!("{:#x}", expected_root));
        assert_eq!(result.tx_hash, DIRECT_UPLOAD);

        let seen = indexer.seen.lock().unwrap();
        let (root, options) = &seen[0];
        assert_eq!(*root, Some(expected_root));
        assert_eq!(options.expected_replica, 4);
        assert!(!options.finality_required);
        assert!(!options.skip_tx);
        assert_eq!(options.fee, compute_storage_fee(100, NetworkProfile::Turbo));
    }

    #[tokio::test]
    async fn unresolvable_root_degrades_to_sentinel() {
        let indexer = RecordingIndexer::new(false);
        let service = service(indexer.clone());

        // Empty payload: no root, and the on-chain record is skipped even
        // though one was requested.
        let result = service
            .upload(UploadPayload::new(Vec::new()), NetworkProfile::Standard, true)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.root, UNKNOWN_ROOT);
        assert_eq!(result.tx_hash, DIRECT_UPLOAD);

        let seen = indexer.seen.lock().unwrap();
        assert_eq!(seen[0].0, None);
        assert!(!seen[0].1.skip_tx);
    }

    #[tokio::test]
    async fn indexer_failure_is_fatal() {
        let indexer = RecordingIndexer::new(true);
        let service = service(indexer);

        let err = service
            .upload(
                UploadPayload::new(vec![1u8; 64]),
                NetworkProfile::Turbo,
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MedVaultError::UploadFailed(_)));
    }

    #[tokio::test]
    async fn http_indexer_posts_segment() {
        let mut server = mockito::Server::new_async().await;
        let accept = server
            .mock("POST", "/file/segment")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = HttpIndexerClient::new(server.url());
        let bytes = vec![7u8; 32];
        let descriptor = UploadDescriptor {
            root: Some(H256::from(keccak256(&bytes))),
            bytes,
            fee: U256::from(1u64),
            profile: NetworkProfile::Turbo,
        };
        let options = UploadOptions::for_profile(NetworkProfile::Turbo, descriptor.fee, false);

        client.upload(&descriptor, &options).await.unwrap();
        accept.assert_async().await;
    }

    #[tokio::test]
    async fn http_indexer_waits_for_finality() {
        let mut server = mockito::Server::new_async().await;
        let bytes = vec![9u8; 32];
        let root = H256::from(keccak256(&bytes));

        let accept = server
            .mock("POST", "/file/segment")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let info = server
            .mock("GET", format!("/file/info/{:#x}", root).as_str())
            .with_status(200)
            .with_body(r#"{"finalized": true}"#)
            .create_async()
            .await;

        let client = HttpIndexerClient::new(server.url())
            .with_finality_polling(Duration::from_millis(10), 3);
        let descriptor = UploadDescriptor {
            root: Some(root),
            bytes,
            fee: U256::from(1u64),
            profile: NetworkProfile::Standard,
        };
        let options = UploadOptions::for_profile(NetworkProfile::Standard, descriptor.fee, true);
        assert!(options.finality_required);

        client.upload(&descriptor, &options).await.unwrap();
        accept.assert_async().await;
        info.assert_async().await;
    }

    #[tokio::test]
    async fn http_indexer_surfaces_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _reject = server
            .mock("POST", "/file/segment")
            .with_status(507)
            .create_async()
            .await;

        let client = HttpIndexerClient::new(server.url());
        let descriptor = UploadDescriptor {
            bytes: vec![1u8; 8],
            root: None,
            fee: U256::zero(),
            profile: NetworkProfile::Turbo,
        };
        let options = UploadOptions::for_profile(NetworkProfile::Turbo, U256::zero(), false);

        let err = client.upload(&descriptor, &options).await.unwrap_err();
        assert!(err.to_string().contains("507"));
    }
}
