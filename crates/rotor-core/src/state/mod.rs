//! Rotation-state store implementations
//!
//! - [`FileStateStore`]: durable JSON file with atomic writes
//! - [`MemoryStateStore`]: ephemeral, for tests and throwaway runs

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
