//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry reaper: removes expired L1 entries and dead tag memberships
//! - Distributed connector: attaches a store that was down at startup

mod cleanup;
mod reconnect;

pub use cleanup::spawn_cleanup_task;
pub use reconnect::{spawn_distributed_connector, MAX_RETRY_DELAY};
