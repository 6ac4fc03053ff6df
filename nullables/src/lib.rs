//! Nullable infrastructure for deterministic testing.
//!
//! Everything the handoff touches outside its own logic (clock, id
//! randomness, storage, the camera, the external scorer) sits behind a trait.
//! This crate provides test implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem, the network or real hardware
//!
//! Usage: swap real implementations for nullables in tests.

pub mod camera;
pub mod clock;
pub mod ids;
pub mod scorer;
pub mod store;

pub use camera::NullCamera;
pub use clock::NullClock;
pub use ids::NullIdGenerator;
pub use scorer::NullScorer;
pub use store::NullStore;
