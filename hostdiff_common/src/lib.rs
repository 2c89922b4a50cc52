pub mod cancel;
pub mod config;
pub mod error;
pub mod remote;
pub mod types;

pub use cancel::*;
pub use config::*;
pub use error::*;
pub use remote::*;
pub use types::*;
