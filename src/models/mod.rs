pub mod consent;
pub mod upload;

pub use consent::*;
pub use upload::*;
