//! Session module for the persisted browser profile
//!
//! # Components
//!
//! - `SessionValidator`: checks whether the profile is still authenticated
//! - `CacheMaintainer`: frees profile cache space while preserving auth state

mod cache;
mod validator;

pub use cache::{CacheCleanupReport, CacheMaintainer, CACHE_DIRS};
pub use validator::SessionValidator;
