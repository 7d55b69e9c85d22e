pub mod config;
pub mod convert;
pub mod error;
pub mod sources;
pub mod types;

pub use error::AppError;
pub use types::*;
