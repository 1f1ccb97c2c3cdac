// Application layer - account operations on top of the ledger repository.

mod config;
mod error;
mod rates;
pub mod refresher;
mod service;

pub use config::*;
pub use error::*;
pub use rates::*;
pub use service::*;
