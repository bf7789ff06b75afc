//! Version file naming
//!
//! Version files are named `YYYY-MM-DDTHH-mm-ss-xxxxxxxx.json`: a UTC
//! timestamp that sorts lexically, followed by 8 random hex characters so two
//! saves within the same second never collide.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
const TIMESTAMP_LEN: usize = 19;
const SUFFIX_LEN: usize = 8;
const EXTENSION: &str = ".json";

/// Generates a unique version filename for `now`
pub fn generate_version_filename(now: DateTime<Utc>) -> String {
    let suffix: [u8; 4] = rand::random();
    format!(
        "{}-{}{}",
        now.format(TIMESTAMP_FORMAT),
        hex::encode(suffix),
        EXTENSION
    )
}

/// Parses the timestamp out of a version filename
///
/// Returns None for anything not shaped like a generated name.
pub fn parse_timestamp_from_filename(filename: &str) -> Option<DateTime<Utc>> {
    let stem = filename.strip_suffix(EXTENSION)?;
    if stem.len() != TIMESTAMP_LEN + 1 + SUFFIX_LEN || !stem.is_char_boundary(TIMESTAMP_LEN) {
        return None;
    }

    let (timestamp, rest) = stem.split_at(TIMESTAMP_LEN);
    let suffix = rest.strip_prefix('-')?;
    if !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
