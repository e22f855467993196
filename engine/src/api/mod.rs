//! HTTP API module.
//!
//! The axum server, its wire types, and the run log broadcaster every other
//! module reports progress through.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
