//! Cache Key Policy Module
//!
//! Key construction, TTL selection by data category, and compression thresholds.

mod keys;
mod ttl;

pub use keys::{KeyPolicy, HASHED_KEY_PREFIX};
pub use ttl::{DataType, TtlTable};
