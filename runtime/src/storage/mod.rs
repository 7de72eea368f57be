use anyhow::Result;

pub mod io;
pub mod manager;

pub use manager::{StorageManager, StoragesStatus};

pub type StorageResult<T> = Result<T>;
