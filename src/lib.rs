pub mod config;
pub mod contracts;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::MedVaultError;
