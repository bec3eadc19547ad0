pub mod consent_registry;
pub mod flow;

pub use consent_registry::{ConsentCreatedFilter, ConsentRegistry};
pub use flow::MedVaultFlow;
