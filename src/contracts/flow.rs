use ethers::prelude::*;

// Flow submission contract: records a content root on-chain.
// The attached value carries the storage fee and nothing else.
abigen!(
    MedVaultFlow,
    r#"[
        function submit(bytes32 root) external payable returns (uint256)
        event Submission(uint256 indexed index, bytes32 indexed root, address indexed sender)
    ]"#
);
