//! HTTP surface over the row store and document renderer.

pub mod server;
pub mod types;

pub use server::{AppState, build_router, start_server};
