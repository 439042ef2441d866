pub mod config;
pub mod error;
pub mod types;

pub use config::MurmurConfig;
pub use error::{MurmurError, Result};
pub use types::*;
