use crate::error::MedVaultError;
use crate::models::{UploadPayload, SEGMENT_SIZE};
use anyhow::{anyhow, Result};
use ethers::types::H256;
use ethers::utils::keccak256;

/// Resolves the content-address of a payload. Ordered strategy:
/// 1. the payload's write-once root cache (fast path),
/// 2. explicit tree construction over the bytes,
/// 3. one re-check of the cache, since a concurrent resolver may have
///    populated it while this one was failing.
///
/// Identical bytes always resolve to the identical root; the storage
/// network's deduplication depends on it.
pub fn resolve_root(payload: &UploadPayload) -> Result<H256, MedVaultError> {
    if let Some(root) = payload.precomputed_root() {
        tracing::debug!(root = %root, "Merkle root resolved from cache");
        return Ok(root);
    }

    build_and_cache_root(payload)
}

/// Steps 2 and 3: tree construction, then one cache re-check on failure for
/// roots cached after the fast-path check.
fn build_and_cache_root(payload: &UploadPayload) -> Result<H256, MedVaultError> {
    match build_merkle_root(payload.as_bytes()) {
        Ok(root) => {
            payload.cache_root(root);
            tracing::debug!(root = %root, bytes = payload.len(), "Merkle root computed");
            Ok(root)
        }
        Err(e) => {
            if let Some(root) = payload.precomputed_root() {
                return Ok(root);
            }
            tracing::warn!(error = %e, "Merkle root unavailable");
            Err(MedVaultError::MerkleRootUnavailable(e))
        }
    }
}

/// Binary keccak256 tree over 256-byte segments. Leaves are segment hashes,
/// parents hash the concatenation of their children, and a lone node is
/// promoted unchanged to the next level.
pub fn build_merkle_root(bytes: &[u8]) -> Result<H256> {
    if bytes.is_empty() {
        return Err(anyhow!("empty payload has no merkle root"));
    }

    let mut level: Vec<H256> = bytes
        .chunks(SEGMENT_SIZE)
        .map(|segment| H256::from(keccak256(segment)))
        .collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [lone] => *lone,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
    }

    Ok(level[0])
}

fn hash_pair(left: &H256, right: &H256) -> H256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    H256::from(keccak256(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_identical_root() {
        let payload = vec![0xabu8; 1000];
        let a = build_merkle_root(&payload).unwrap();
        let b = build_merkle_root(&payload).unwrap();
        assert_eq!(a, b);

        let wrapped = UploadPayload::new(payload);
        assert_eq!(resolve_root(&wrapped).unwrap(), a);
        assert_eq!(resolve_root(&wrapped).unwrap(), a);
    }

    #[test]
    fn single_segment_root_is_segment_hash() {
        let payload = vec![7u8; 100];
        let root = build_merkle_root(&payload).unwrap();
        assert_eq!(root, H256::from(keccak256(&payload)));
    }

    #[test]
    fn lone_node_promotes() {
        // Three segments: level 0 = [a, b, c], level 1 = [h(a,b), c].
        let payload = vec![1u8; SEGMENT_SIZE * 3];
        let leaves: Vec<H256> = payload
            .chunks(SEGMENT_SIZE)
            .map(|s| H256::from(keccak256(s)))
            .collect();
        let expected = hash_pair(&hash_pair(&leaves[0], &leaves[1]), &leaves[2]);
        assert_eq!(build_merkle_root(&payload).unwrap(), expected);
    }

    #[test]
    fn precomputed_root_wins() {
        let sentinel = H256::repeat_byte(0x42);
        let payload = UploadPayload::with_root(vec![9u8; 512], sentinel);
        assert_eq!(resolve_root(&payload).unwrap(), sentinel);
    }

    #[test]
    fn empty_payload_fails() {
        let payload = UploadPayload::new(Vec::new());
        let err = resolve_root(&payload).unwrap_err();
        assert!(matches!(err, MedVaultError::MerkleRootUnavailable(_)));
    }

    #[test]
    fn root_cached_after_fast_path_check_recovers_failed_build() {
        // A root landing in the cache between the fast-path check and a
        // failed build is picked up by the re-check instead of erroring.
        // Entering below the fast path pins that interleaving.
        let sentinel = H256::repeat_byte(0x05);
        let payload = UploadPayload::with_root(Vec::new(), sentinel);
        assert_eq!(build_and_cache_root(&payload).unwrap(), sentinel);
    }
}
