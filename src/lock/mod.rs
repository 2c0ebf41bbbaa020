// ABOUTME: Lock module - advisory, expiring file locks shared across processes.
// ABOUTME: Provides LockInfo, path normalization, the LockManager and its conflict log.

mod conflicts;
mod info;
mod manager;

pub use conflicts::{ConflictLog, ConflictRecord};
pub use info::{LockInfo, normalize_path};
pub use manager::LockManager;
