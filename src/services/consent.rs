use crate::config::Config;
use crate::contracts::{ConsentCreatedFilter, ConsentRegistry};
use crate::error::MedVaultError;
use crate::models::{
    AccessLevel, ConsentAction, ConsentRecord, ConsentStatus, ConsentTransactionResult,
};
use crate::services::confirm::{Confirmation, ConfirmationEngine, RpcPendingHandle};
use crate::services::context::{ChainContext, SignerClient};
use anyhow::anyhow;
use ethers::{
    abi::{Detokenize, RawLog},
    contract::{ContractCall, EthLogDecode},
    types::{Address, Log, TransactionReceipt, U256},
};
use futures::FutureExt;

/// On-chain consent lifecycle: NonExistent → Pending → Approved | Revoked.
/// Approved and Revoked are terminal for a given id; regaining access means
/// creating a new consent. All state lives on-chain; reads are re-derived
/// on every call and never cached.
pub struct ConsentService {
    contract: ConsentRegistry<SignerClient>,
    engine: ConfirmationEngine,
    sender: Address,
}

impl ConsentService {
    pub fn new(ctx: &ChainContext, engine: ConfirmationEngine, contract_address: Address) -> Self {
        Self {
            contract: ConsentRegistry::new(contract_address, ctx.client.clone()),
            engine,
            sender: ctx.sender_address(),
        }
    }

    pub fn from_config(ctx: &ChainContext, config: &Config) -> Self {
        let engine = ConfirmationEngine::from_config(ctx.provider.clone(), config);
        Self::new(ctx, engine, config.consent_contract)
    }

    pub async fn create_consent(
        &self,
        provider: Address,
        patient: Address,
        access_level: AccessLevel,
        duration_days: u64,
        note: &str,
    ) -> Result<ConsentTransactionResult, MedVaultError> {
        let action = ConsentAction::Creation;
        let call = self.contract.create_consent_request(
            provider,
            patient,
            access_level.as_u8(),
            U256::from(duration_days),
            note.to_string(),
        );

        match self.submit(action, call).await {
            Ok(confirmation) => {
                let consent_id = consent_id_from_logs(&confirmation.receipt.logs);
                if consent_id.is_none() {
                    tracing::warn!(
                        tx = %confirmation.receipt.transaction_hash,
                        "Consent created but no ConsentCreated event found"
                    );
                }
                Ok(shape_result(action, consent_id, &confirmation.receipt))
            }
            Err(e) => self.reverted_or_err(action, None, e),
        }
    }

    pub async fn approve_consent(
        &self,
        id: U256,
    ) -> Result<ConsentTransactionResult, MedVaultError> {
        let action = ConsentAction::Approval;
        let call = self.contract.approve_consent_request(id);
        match self.submit(action, call).await {
            Ok(confirmation) => Ok(shape_result(action, Some(id), &confirmation.receipt)),
            Err(e) => self.reverted_or_err(action, Some(id), e),
        }
    }

    pub async fn revoke_consent(
        &self,
        id: U256,
        reason: &str,
    ) -> Result<ConsentTransactionResult, MedVaultError> {
        let action = ConsentAction::Revocation;
        let call = self.contract.revoke_consent(id, reason.to_string());
        match self.submit(action, call).await {
            Ok(confirmation) => Ok(shape_result(action, Some(id), &confirmation.receipt)),
            Err(e) => self.reverted_or_err(action, Some(id), e),
        }
    }

    /// Fail-closed validity check: callers gate access on the answer, and
    /// "unknown" must gate exactly like "invalid", so any RPC failure is
    /// reported as `false` rather than propagated.
    pub async fn is_consent_valid(&self, id: U256) -> bool {
        match self.contract.is_consent_valid(id).call().await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(
                    consent = %id,
                    error = %e,
                    "Consent validity check failed; treating as invalid"
                );
                false
            }
        }
    }

    /// Chain read of the full record. `created_at` is the block timestamp
    /// exactly as the chain returns it.
    pub async fn consent_details(&self, id: U256) -> Result<ConsentRecord, MedVaultError> {
        let (provider_id, patient_id, access_level, duration_days, created_at, active) = self
            .contract
            .get_consent_details(id)
            .call()
            .await
            .map_err(|e| MedVaultError::consent(ConsentAction::Query, anyhow!(e.to_string())))?;

        Ok(ConsentRecord {
            id,
            provider_id,
            patient_id,
            access_level,
            duration_days,
            created_at,
            active,
        })
    }

    /// Routes one mutation through the confirmation engine. Anything that
    /// is not already consent-tagged gets wrapped with the action, keeping
    /// the original failure as the source; reverted executions pass through
    /// untouched so callers can shape a failed result from them.
    async fn submit<D>(
        &self,
        action: ConsentAction,
        call: ContractCall<SignerClient, D>,
    ) -> Result<Confirmation, MedVaultError>
    where
        D: Detokenize + Send + Sync + 'static,
    {
        let lookup = self.engine.receipt_lookup();
        self.engine
            .submit_and_confirm(
                async move {
                    let pending = call
                        .send()
                        .await
                        .map_err(|e| MedVaultError::consent(action, anyhow!(e.to_string())))?;
                    Ok(RpcPendingHandle::new(*pending, lookup))
                }
                .boxed(),
            )
            .await
            .map_err(|e| match e {
                e @ MedVaultError::ConsentContract { .. } => e,
                e @ MedVaultError::TransactionExecutionFailed { .. } => e,
                other => MedVaultError::consent(action, other),
            })
    }

    /// A mined-but-reverted mutation still produced a receipt on-chain, so
    /// it surfaces as a failed result rather than an error; everything else
    /// propagates.
    fn reverted_or_err(
        &self,
        action: ConsentAction,
        consent_id: Option<U256>,
        err: MedVaultError,
    ) -> Result<ConsentTransactionResult, MedVaultError> {
        match err {
            MedVaultError::TransactionExecutionFailed { hash, block } => {
                tracing::error!(tx = %hash, block, %action, "Consent mutation reverted");
                Ok(failed_result(action, consent_id, self.sender))
            }
            other => Err(other),
        }
    }
}

/// First `ConsentCreated` event in the receipt logs, if any.
pub fn consent_id_from_logs(logs: &[Log]) -> Option<U256> {
    logs.iter().find_map(|log| {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        ConsentCreatedFilter::decode_log(&raw).ok().map(|ev| ev.id)
    })
}

pub(crate) fn shape_result(
    action: ConsentAction,
    consent_id: Option<U256>,
    receipt: &TransactionReceipt,
) -> ConsentTransactionResult {
    ConsentTransactionResult {
        action,
        status: ConsentStatus::Confirmed,
        consent_id,
        from: receipt.from,
        gas_used: receipt.gas_used.unwrap_or_default(),
        effective_gas_price: receipt.effective_gas_price.unwrap_or_default(),
    }
}

pub(crate) fn failed_result(
    action: ConsentAction,
    consent_id: Option<U256>,
    from: Address,
) -> ConsentTransactionResult {
    ConsentTransactionResult {
        action,
        status: ConsentStatus::Failed,
        consent_id,
        from,
        gas_used: U256::zero(),
        effective_gas_price: U256::zero(),
    }
}
