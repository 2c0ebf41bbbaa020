// ABOUTME: Cache module - bounded, short-lived local shadows of store lookups.
// ABOUTME: Avoids store round trips for hot lock and agent reads.

mod read_through;

pub use read_through::{CacheStats, Lookup, ReadThroughCache};
