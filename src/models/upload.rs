use crate::config::Config;
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

/// Storage segment size in bytes; also the unit the fee formula charges by.
pub const SEGMENT_SIZE: usize = 256;

/// Root reported when the payload was stored but its root could not be
/// resolved. Durability does not depend on root resolution.
pub const UNKNOWN_ROOT: &str = "unknown-hash";

/// Transaction-hash sentinel for uploads with no on-chain record.
pub const DIRECT_UPLOAD: &str = "direct-upload";

/// Selects indexer endpoint and replication parameters for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProfile {
    Standard,
    Turbo,
}

impl NetworkProfile {
    pub fn expected_replica(&self) -> u64 {
        match self {
            NetworkProfile::Standard => 2,
            NetworkProfile::Turbo => 4,
        }
    }

    pub fn task_size(&self) -> u64 {
        match self {
            NetworkProfile::Standard => 10,
            NetworkProfile::Turbo => 16,
        }
    }

    /// Fee per 256-byte segment, in wei. Turbo pays a premium for priority
    /// replication.
    pub fn fee_per_segment(&self) -> U256 {
        match self {
            NetworkProfile::Standard => U256::from(10_000_000_000u64),
            NetworkProfile::Turbo => U256::from(25_000_000_000u64),
        }
    }

    /// Standard uploads wait for durable replication before reporting
    /// success; turbo trades that wait for latency.
    pub fn finality_required(&self) -> bool {
        matches!(self, NetworkProfile::Standard)
    }

    pub fn indexer_url<'a>(&self, config: &'a Config) -> &'a str {
        match self {
            NetworkProfile::Standard => &config.indexer_url,
            NetworkProfile::Turbo => &config.indexer_turbo_url,
        }
    }
}

impl FromStr for NetworkProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(NetworkProfile::Standard),
            "turbo" => Ok(NetworkProfile::Turbo),
            other => Err(format!("unknown network profile: {}", other)),
        }
    }
}

/// Byte payload headed for the storage network, with a write-once root cache.
/// The cache is the only fast path for root resolution; callers that already
/// know the root supply it via [`UploadPayload::with_root`].
#[derive(Debug)]
pub struct UploadPayload {
    bytes: Vec<u8>,
    root: OnceLock<H256>,
}

impl UploadPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            root: OnceLock::new(),
        }
    }

    pub fn with_root(bytes: Vec<u8>, root: H256) -> Self {
        let payload = Self::new(bytes);
        let _ = payload.root.set(root);
        payload
    }

    pub fn precomputed_root(&self) -> Option<H256> {
        self.root.get().copied()
    }

    /// Stores a freshly computed root. First writer wins; identical bytes
    /// always produce identical roots, so a lost race changes nothing.
    pub fn cache_root(&self, root: H256) {
        let _ = self.root.set(root);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Everything the indexer needs to identify and charge for one upload.
#[derive(Debug, Clone)]
pub struct UploadDescriptor {
    pub bytes: Vec<u8>,
    pub root: Option<H256>,
    pub fee: U256,
    pub profile: NetworkProfile,
}

/// Indexer-facing upload options, derived from the network profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    pub task_size: u64,
    pub expected_replica: u64,
    pub finality_required: bool,
    pub tags: String,
    pub skip_tx: bool,
    pub fee: U256,
}

impl UploadOptions {
    pub fn for_profile(profile: NetworkProfile, fee: U256, skip_tx: bool) -> Self {
        Self {
            task_size: profile.task_size(),
            expected_replica: profile.expected_replica(),
            finality_required: profile.finality_required(),
            tags: "0x".to_string(),
            skip_tx,
            fee,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,
    pub root: String,
    pub tx_hash: String,
}
