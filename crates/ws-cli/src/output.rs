// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared list/format helpers every command module renders through:
//! text vs. JSON mode, result truncation, and workspace-age display.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Text
    }
}

/// Renders a timestamp as a short relative age.
pub fn format_time_ago(at: DateTime<Utc>) -> String {
    let delta_secs = (Utc::now() - at).num_seconds().max(0);
    match delta_secs {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3600),
        s => format!("{}d ago", s / 86_400),
    }
}

/// How many rows `apply_limit` dropped, for the "and N more" footer.
pub struct Truncation {
    pub remaining: usize,
}

pub fn apply_limit<T>(items: Vec<T>, limit: Option<usize>) -> (Vec<T>, Option<Truncation>) {
    match limit {
        Some(limit) if items.len() > limit => {
            let remaining = items.len() - limit;
            let mut items = items;
            items.truncate(limit);
            (items, Some(Truncation { remaining }))
        }
        _ => (items, None),
    }
}

/// Prints `items` as JSON, or via `render` in text mode, capped at
/// `limit` rows unless `no_limit` is set.
pub fn handle_list_with_limit<T: Serialize>(
    items: Vec<T>,
    limit: usize,
    no_limit: bool,
    format: OutputFormat,
    render: impl FnOnce(&[T]) -> String,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("(none)");
                return Ok(());
            }
            let (items, truncation) = apply_limit(items, if no_limit { None } else { Some(limit) });
            print!("{}", render(&items));
            if let Some(truncation) = truncation {
                println!("{}", crate::color::context(&format!("... and {} more", truncation.remaining)));
            }
        }
    }
    Ok(())
}

pub fn format_or_json<T: Serialize>(value: &T, format: OutputFormat, text: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => println!("{}", text(value)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        under_limit   = { 3, Some(5) },
        at_limit      = { 5, Some(5) },
        no_limit      = { 9, None },
    )]
    fn apply_limit_keeps_everything(count: usize, limit: Option<usize>) {
        let items: Vec<usize> = (0..count).collect();
        let (kept, truncation) = apply_limit(items, limit);
        assert_eq!(kept.len(), count);
        assert!(truncation.is_none());
    }

    #[test]
    fn apply_limit_truncates_and_reports_remainder() {
        let items: Vec<usize> = (0..10).collect();
        let (kept, truncation) = apply_limit(items, Some(4));
        assert_eq!(kept, vec![0, 1, 2, 3]);
        assert_eq!(truncation.expect("should report truncation").remaining, 6);
    }

    #[yare::parameterized(
        seconds = { 30, "30s ago" },
        minutes = { 90, "1m ago" },
        hours   = { 3700, "1h ago" },
        days    = { 200_000, "2d ago" },
    )]
    fn format_time_ago_buckets_by_magnitude(seconds_ago: i64, expected: &str) {
        let at = Utc::now() - chrono::Duration::seconds(seconds_ago);
        assert_eq!(format_time_ago(at), expected);
    }
}
