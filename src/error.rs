use crate::models::ConsentAction;
use ethers::types::H256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MedVaultError {
    #[error("chain provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("no signer attached to provider: {0}")]
    SignerUnavailable(String),

    #[error("transaction {hash:?} not confirmed after {attempts} wait attempts")]
    TransactionTimeout {
        hash: H256,
        attempts: u32,
        #[source]
        last_error: Option<anyhow::Error>,
    },

    #[error("transaction {hash:?} mined in block {block} but execution reverted")]
    TransactionExecutionFailed { hash: H256, block: u64 },

    #[error("merkle root unavailable: {0}")]
    MerkleRootUnavailable(#[source] anyhow::Error),

    #[error("storage indexer upload failed: {0}")]
    UploadFailed(#[source] anyhow::Error),

    #[error("consent {action} failed: {source}")]
    ConsentContract {
        action: ConsentAction,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl MedVaultError {
    /// True only for mined-but-reverted executions; a timeout means the
    /// transaction's fate is unknown, not that it failed on-chain.
    pub fn is_on_chain(&self) -> bool {
        matches!(self, MedVaultError::TransactionExecutionFailed { .. })
    }

    pub fn consent(action: ConsentAction, source: impl Into<anyhow::Error>) -> Self {
        MedVaultError::ConsentContract {
            action,
            source: source.into(),
        }
    }
}
