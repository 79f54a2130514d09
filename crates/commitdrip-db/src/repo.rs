//! Repository traits and implementations.

pub mod job;
pub mod memory;

pub use job::{JobRepo, JobUpdate, PgJobRepo};
pub use memory::MemoryJobRepo;
