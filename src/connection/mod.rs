// ABOUTME: Connection module - lifecycle of the shared store connection.
// ABOUTME: Every other component reaches the store through ConnectionManager.

mod manager;

pub use manager::{ConnectionManager, Health, backoff_delay};

#[cfg(test)]
mod manager_test;
