//! # Storage
//!
//! A string key-value abstraction with in-memory and sled backends, and the
//! credential layout written on top of it.

pub mod credentials;
pub mod kv;
pub mod sled_store;

pub use credentials::{CredentialRecord, CredentialStore, SecretMaterial, SlotLoad, WalletSlot};
pub use kv::{KeyValueStore, MemoryStore, StoreError, StoreResult};
pub use sled_store::SledStore;
