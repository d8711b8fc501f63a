//! Backends that realize virtual trees.

mod memory;

pub use memory::{MemoryBackend, Op};
