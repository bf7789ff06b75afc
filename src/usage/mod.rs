//! Usage data types
//!
//! - `UsageSnapshot`: the scraped artifact persisted and synced each cycle
//! - `ValidationResult`: outcome of checking the persisted browser session
//! - Section text parsing into `WindowUsage`

mod parser;
mod types;

pub use parser::{parse_window_usage, UNKNOWN_RESET};
pub use types::{
    RecoveryResult, Section, SnapshotBuilder, UsageSnapshot, ValidationResult, WeeklyLimits,
    WindowUsage, TOTAL_SECTIONS,
};
