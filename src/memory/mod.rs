pub mod cache;
pub mod manager;
pub mod notice;
pub mod scheduler;
pub mod types;

pub use manager::{ManagerError, ManagerStatus, MemoryManager, Phase, SaveOutcome};
