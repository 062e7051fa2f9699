//! HTTP API handlers
//!
//! One module per pipeline operation; routing lives in `build_router`
//! at the crate root.

pub mod health;
pub mod stream;
pub mod transform;
pub mod upload;
