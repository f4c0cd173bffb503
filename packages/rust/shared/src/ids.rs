//! Notion object id normalisation.
//!
//! Ids are accepted as 32 hex chars, dashed UUIDs, or any Notion URL that
//! ends in one (`https://www.notion.so/Team-Scores-0123...cdef?v=...`).

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ChartSyncError, Result};

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9a-f]{8})-?([0-9a-f]{4})-?([0-9a-f]{4})-?([0-9a-f]{4})-?([0-9a-f]{12})")
        .expect("valid regex")
});

/// Extract a Notion id and return it in dashed UUID form.
pub fn normalize_id(input: &str) -> Result<String> {
    let trimmed = input.trim();
    // Query strings carry view ids, which are also 32 hex chars.
    let path = trimmed.split(['?', '#']).next().unwrap_or_default();

    let caps = ID_PATTERN
        .captures_iter(path)
        .last()
        .ok_or_else(|| ChartSyncError::validation(format!("no Notion id found in '{trimmed}'")))?;

    Ok(format!(
        "{}-{}-{}-{}-{}",
        &caps[1], &caps[2], &caps[3], &caps[4], &caps[5]
    )
    .to_lowercase())
}
