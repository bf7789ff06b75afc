//! Sync module for shipping snapshots to a remote endpoint
//!
//! Each call is a single bounded `POST`; [`SyncClient::sync_with_retry`]
//! wraps it in a fixed delay ladder that gives up immediately on auth and
//! validation failures.

mod client;
mod error;

pub use client::{SyncAck, SyncClient};
pub use error::{SyncCategory, SyncError};
