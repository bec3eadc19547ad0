use crate::config::Config;
use crate::error::MedVaultError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::LocalWallet,
    types::{TransactionReceipt, H256, U64},
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const BASE_BACKOFF_MS: u64 = 5_000;
const MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Point lookup for a mined receipt. Backs both the polling wait and the
/// engine's reconciliation fallback.
#[async_trait]
pub trait ReceiptLookup: Send + Sync {
    async fn receipt_by_hash(&self, hash: H256) -> Result<Option<TransactionReceipt>>;
}

#[async_trait]
impl ReceiptLookup for Provider<Http> {
    async fn receipt_by_hash(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(self.get_transaction_receipt(hash).await?)
    }
}

#[async_trait]
impl ReceiptLookup for SignerMiddleware<Provider<Http>, LocalWallet> {
    async fn receipt_by_hash(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(self.get_transaction_receipt(hash).await?)
    }
}

/// Handle to an already-broadcast transaction. `wait` may be called again
/// after a timeout or transport error; the broadcast itself never repeats.
#[async_trait]
pub trait PendingHandle: Send + Sync {
    fn tx_hash(&self) -> H256;

    /// One confirmation wait. `Ok(None)` means the wait machinery gave up
    /// without a receipt, not that the transaction failed.
    async fn wait(&self) -> Result<Option<TransactionReceipt>>;
}

/// Production wait: polls the chain for a receipt on a fixed interval.
/// The engine's timeout bounds each call.
pub struct RpcPendingHandle {
    hash: H256,
    lookup: Arc<dyn ReceiptLookup>,
    poll_interval: Duration,
}

impl RpcPendingHandle {
    pub fn new(hash: H256, lookup: Arc<dyn ReceiptLookup>) -> Self {
        Self {
            hash,
            lookup,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl PendingHandle for RpcPendingHandle {
    fn tx_hash(&self) -> H256 {
        self.hash
    }

    async fn wait(&self) -> Result<Option<TransactionReceipt>> {
        loop {
            if let Some(receipt) = self.lookup.receipt_by_hash(self.hash).await? {
                return Ok(Some(receipt));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// How a confirmation was obtained. Both paths are success; callers that
/// do not care may ignore the distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationPath {
    /// The handle's own wait produced the receipt.
    Direct,
    /// The wait kept failing but a direct chain query found the receipt.
    Reconciled,
}

#[derive(Debug, Clone)]
pub struct Confirmation {
    pub receipt: TransactionReceipt,
    pub path: ConfirmationPath,
    pub confirmed_at: DateTime<Utc>,
}

/// Submits a transaction once and waits for durable confirmation with
/// bounded retries, capped exponential backoff, and a final reconciliation
/// query against the chain.
pub struct ConfirmationEngine {
    lookup: Arc<dyn ReceiptLookup>,
    timeout: Duration,
    max_retries: u32,
}

impl ConfirmationEngine {
    pub fn new(lookup: Arc<dyn ReceiptLookup>) -> Self {
        Self {
            lookup,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn from_config(lookup: Arc<dyn ReceiptLookup>, config: &Config) -> Self {
        Self::new(lookup)
            .with_timeout(Duration::from_millis(config.confirm_timeout_ms))
            .with_max_retries(config.confirm_max_retries)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn receipt_lookup(&self) -> Arc<dyn ReceiptLookup> {
        self.lookup.clone()
    }

    /// Runs `send` exactly once, then waits for the resulting transaction to
    /// confirm. Re-broadcasting an already-sent transaction risks nonce
    /// conflicts, so only the wait is retried; after the final failed wait
    /// the chain is queried directly to distinguish "never mined" from
    /// "mined while the wait machinery failed".
    pub async fn submit_and_confirm<H>(
        &self,
        send: BoxFuture<'_, Result<H, MedVaultError>>,
    ) -> Result<Confirmation, MedVaultError>
    where
        H: PendingHandle,
    {
        let handle = send.await?;
        let hash = handle.tx_hash();
        tracing::info!(tx = %hash, timeout_ms = self.timeout.as_millis() as u64, "Transaction submitted");

        let mut last_error: Option<anyhow::Error> = None;
        for attempt in 0..=self.max_retries {
            match tokio::time::timeout(self.timeout, handle.wait()).await {
                Ok(Ok(Some(receipt))) => {
                    tracing::info!(
                        tx = %hash,
                        block = receipt.block_number.unwrap_or_default().as_u64(),
                        attempt,
                        "Transaction confirmed"
                    );
                    return self.finish(receipt, ConfirmationPath::Direct);
                }
                Ok(Ok(None)) => {
                    last_error = Some(anyhow!("confirmation wait returned no receipt"));
                }
                Ok(Err(e)) => {
                    last_error = Some(e);
                }
                Err(_) => {
                    last_error = Some(anyhow!(
                        "confirmation wait timed out after {}ms",
                        self.timeout.as_millis()
                    ));
                }
            }

            if attempt == self.max_retries {
                match self.lookup.receipt_by_hash(hash).await {
                    Ok(Some(receipt)) => {
                        tracing::info!(tx = %hash, "Receipt recovered by reconciliation");
                        return self.finish(receipt, ConfirmationPath::Reconciled);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(tx = %hash, error = %e, "Reconciliation lookup failed");
                        last_error = Some(e);
                    }
                }

                tracing::error!(
                    tx = %hash,
                    attempts = self.max_retries + 1,
                    "Transaction confirmation failed"
                );
                return Err(MedVaultError::TransactionTimeout {
                    hash,
                    attempts: self.max_retries + 1,
                    last_error,
                });
            }

            let delay = backoff_delay(attempt);
            tracing::warn!(
                tx = %hash,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Confirmation retry scheduled"
            );
            tokio::time::sleep(delay).await;
        }

        unreachable!("final attempt either returns a confirmation or an error")
    }

    fn finish(
        &self,
        receipt: TransactionReceipt,
        path: ConfirmationPath,
    ) -> Result<Confirmation, MedVaultError> {
        // status=0 is mined-but-reverted: the transaction exists on-chain,
        // which is a different failure than never confirming.
        if receipt.status == Some(U64::zero()) {
            let block = receipt.block_number.unwrap_or_default().as_u64();
            tracing::error!(tx = %receipt.transaction_hash, block, "Transaction execution reverted");
            return Err(MedVaultError::TransactionExecutionFailed {
                hash: receipt.transaction_hash,
                block,
            });
        }

        Ok(Confirmation {
            receipt,
            path,
            confirmed_at: Utc::now(),
        })
    }
}

/// Backoff before retry `attempt + 1`: 5s doubling per attempt, capped at 30s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let ms = BASE_BACKOFF_MS
        .checked_shl(attempt)
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_MS);
    Duration::from_millis(ms)
}
