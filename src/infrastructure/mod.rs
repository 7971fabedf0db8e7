//! Storage and delivery adapters behind the domain ports.

pub mod in_memory;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
