use ethers::prelude::*;

// Consent registry: on-chain lifecycle for patient/provider access grants.
abigen!(
    ConsentRegistry,
    r#"[
        function createConsentRequest(address provider, address patient, uint8 accessLevel, uint256 durationDays, string note) external returns (uint256)
        function approveConsentRequest(uint256 id) external
        function revokeConsent(uint256 id, string reason) external
        function isConsentValid(uint256 id) external view returns (bool)
        function getConsentDetails(uint256 id) external view returns (address, address, uint8, uint256, uint256, bool)
        event ConsentCreated(uint256 indexed id, address indexed provider, address indexed patient)
        event ConsentApproved(uint256 indexed id)
        event ConsentRevoked(uint256 indexed id, string reason)
    ]"#
);
