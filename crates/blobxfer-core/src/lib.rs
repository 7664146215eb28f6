pub mod config;
pub mod logging;

pub mod batch;
pub mod blob;
pub mod buffer_scheduler;
pub mod checksum;
pub mod error;
pub mod http;
pub mod progress;
pub mod retry;
pub mod storage;
pub mod transfer;
pub mod transport;
pub mod url_model;

pub use error::{TransferError, TransferResult};
