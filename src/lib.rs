//! MirrorStore library -- pluggable remote-object storage with an
//! optional local mirror.
//!
//! This crate provides a uniform file-storage contract over a remote
//! blob service: gzip transformation of eligible content on upload,
//! CDN-aware URL resolution, hierarchical listings emulated over flat
//! keys, and a dual-write mode that mirrors every stored byte to a
//! local directory for fast reads.

pub mod client;
pub mod config;
pub mod errors;
pub mod naming;
pub mod resolve;
pub mod store;
pub mod transform;

pub use client::api::{BlobClient, BlobProperties, CorsRule, PutOptions};
pub use config::{load_config, Config};
pub use errors::{Result, StorageError};
pub use store::contract::{FileStore, Listing, Payload};
pub use store::dual::DualWriteStore;
pub use store::local::LocalStore;
pub use store::remote::RemoteStore;
