pub mod confirm;
pub mod consent;
pub mod context;
pub mod merkle;
pub mod upload;

pub use confirm::{Confirmation, ConfirmationEngine, ConfirmationPath, PendingHandle, ReceiptLookup, RpcPendingHandle};
pub use consent::ConsentService;
pub use context::{compute_storage_fee, ChainContext, SignerClient};
pub use merkle::resolve_root;
pub use upload::{HttpIndexerClient, StorageIndexer, UploadService};
