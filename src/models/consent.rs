use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access scope granted by a consent, as stored on-chain (uint8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read = 1,
    ReadWrite = 2,
    Full = 3,
}

impl AccessLevel {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for AccessLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AccessLevel::Read),
            2 => Ok(AccessLevel::ReadWrite),
            3 => Ok(AccessLevel::Full),
            other => Err(format!("unknown access level: {}", other)),
        }
    }
}

/// Tags every consent result and error with the operation that produced it.
/// Results only ever carry the three mutations; `Query` appears on errors
/// from the read surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentAction {
    Creation,
    Approval,
    Revocation,
    Query,
}

impl fmt::Display for ConsentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsentAction::Creation => "creation",
            ConsentAction::Approval => "approval",
            ConsentAction::Revocation => "revocation",
            ConsentAction::Query => "query",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    Confirmed,
    Failed,
}

/// On-chain consent record as returned by `getConsentDetails`. `created_at`
/// is the chain's block timestamp, passed through untouched; `active` is
/// re-derived from the chain on every read, never cached locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: U256,
    pub provider_id: Address,
    pub patient_id: Address,
    pub access_level: u8,
    pub duration_days: U256,
    pub created_at: U256,
    pub active: bool,
}

/// Uniform result shape for all three consent mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentTransactionResult {
    #[serde(rename = "type")]
    pub action: ConsentAction,
    pub status: ConsentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_id: Option<U256>,
    pub from: Address,
    pub gas_used: U256,
    pub effective_gas_price: U256,
}
