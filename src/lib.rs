pub mod cli;
pub mod config;
pub mod csv_io;
pub mod engine;
pub mod errors;
pub mod journal;
pub mod memory_store;
pub mod models;
pub mod pg_store;
pub mod server;
pub mod service;
pub mod storage;
pub mod stress;

pub use engine::{EngineConfig, TransferEngine};
pub use errors::{ErrorKind, StoreError, TransferError};
pub use memory_store::MemoryStore;
pub use models::{Account, AccountId, Amount, NewAccount, Transfer, TransferRequest};
pub use service::TransferService;
pub use storage::{AccountStore, StoreTransaction};
