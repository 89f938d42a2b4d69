//! sync-daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to access internal types.

pub mod native_fs;
pub mod snapshot_client;

// Re-export key types for convenience
pub use native_fs::NativeFs;
pub use snapshot_client::SnapshotFileClient;
