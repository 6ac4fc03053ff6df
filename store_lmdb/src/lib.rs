//! LMDB storage backend for KYC handoff sessions.
//!
//! Implements the storage traits from `kyc-store` using the `heed` LMDB bindings.
//! Sessions live in a single named database within one environment, keyed by
//! session id and encoded with `bincode`.

pub mod environment;
pub mod error;
pub mod integrity;
pub mod session;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use integrity::{check_data_dir, check_integrity, IntegrityReport};
pub use session::LmdbSessionStore;
