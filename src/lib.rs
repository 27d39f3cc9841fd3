//! Container resource monitoring: metric collection, limit profiling, a
//! WebSocket distribution hub and a terminal dashboard.

pub mod app;
pub mod core;
pub mod screens;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;
