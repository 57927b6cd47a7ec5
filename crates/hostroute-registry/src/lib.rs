//! Registry (discovery service) client.
//!
//! `POST {base}/api/v1/{keyword}/list` returns scored candidates; the client
//! ranks them by score, drops duplicate names and truncates to `top_k`.

pub mod client;
pub mod models;

pub use client::*;
pub use models::*;
