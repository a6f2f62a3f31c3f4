//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache is in use.
//!
//! # Tasks
//! - TTL Sweep: Removes expired entries from both tiers at configured intervals

mod sweep;

pub use sweep::spawn_sweep_task;
