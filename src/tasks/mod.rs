//! Background Tasks Module
//!
//! Contains background tasks the binary runs alongside the cache.
//!
//! # Tasks
//! - Sweep: Deletes expired file records at configured intervals

mod sweep;

pub use sweep::spawn_sweep_task;
