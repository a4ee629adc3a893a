#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod core;
pub mod error;
pub mod migration;
pub mod query;
pub mod schema;
pub mod stats;
pub mod storage;
pub mod store;

pub use error::{Result, StoreError};
