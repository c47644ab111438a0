//! sonar - local cache, sync and backup for the Sonar service
//!
//! This library owns the on-disk `SQLite` cache that the `sonar` CLI reads
//! from: it downloads and incrementally syncs remote data into it, and backs
//! it up and restores it with integrity checks and rollback.
//!
//! # Modules
//!
//! - [`storage`] - `SQLite` cache tables and sync state
//! - [`sync`] - Full download and incremental sync
//! - [`backup`] - Online backup and verified restore
//! - [`integrity`] - `PRAGMA integrity_check` verdicts
//! - [`gateway`] - Remote data source trait and GraphQL client
//! - [`config`] - Workspace paths and layered settings
//! - [`error`] - Custom error types with rich context

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod integrity;
pub mod logging;
pub mod model;
pub mod storage;
pub mod sync;

pub use backup::{BackupManager, BackupResult, RestoreResult};
pub use cli::{Cli, Commands};
pub use config::{Config, Settings, Workspace};
pub use error::{
    GatewayError, Result, SonarError, VALID_CONFIG_KEYS, find_closest_match, format_error,
    format_unknown_value_error,
};
pub use gateway::{DataGateway, FeedWindow, GraphqlGateway};
pub use integrity::{IntegrityCheck, IntegrityVerdict, SqliteIntegrityChecker};
pub use model::*;
pub use storage::Storage;
pub use sync::{SyncEngine, SyncMode, SyncReport};

use chrono::{DateTime, Datelike, Utc};

/// Default database filename inside the workspace directory.
pub const DEFAULT_DB_NAME: &str = "data.db";

const BYTES_PER_KB: u64 = 1024;
const BYTES_PER_MB: u64 = 1024 * 1024;
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let abs = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(abs.len() + abs.len() / 3);

    for (idx, ch) in abs.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut formatted: String = out.chars().rev().collect();
    if value < 0 {
        formatted.insert(0, '-');
    }
    formatted
}

/// Format a datetime as a human-friendly relative string.
#[must_use]
pub fn format_relative_date(dt: DateTime<Utc>) -> String {
    format_relative_date_with_base(dt, Utc::now())
}

/// Format a datetime relative to a fixed base time.
///
/// - < 1 minute: "just now"
/// - < 1 hour: "Nm ago"
/// - < 24 hours: "Nh ago"
/// - < 7 days: "Nd ago"
/// - Same calendar year: "Mon D"
/// - Different year: "Mon D, YYYY"
#[must_use]
pub fn format_relative_date_with_base(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(dt);

    if duration.num_seconds() < 0 {
        return dt.format("%b %d, %Y").to_string();
    }

    let minutes = duration.num_minutes();
    let hours = duration.num_hours();
    let days = duration.num_days();

    if duration.num_seconds() < 60 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else if dt.year() == now.year() {
        dt.format("%b %d").to_string()
    } else {
        dt.format("%b %d, %Y").to_string()
    }
}

/// Format bytes into a human-friendly string.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < BYTES_PER_KB {
        format!("{bytes} B")
    } else if bytes < BYTES_PER_MB {
        format_bytes_with_unit(bytes, BYTES_PER_KB, "KB")
    } else if bytes < BYTES_PER_GB {
        format_bytes_with_unit(bytes, BYTES_PER_MB, "MB")
    } else {
        format_bytes_with_unit(bytes, BYTES_PER_GB, "GB")
    }
}

fn format_bytes_with_unit(bytes: u64, unit: u64, suffix: &str) -> String {
    let whole = bytes / unit;
    let tenths = (bytes % unit) * 10 / unit;
    format!("{whole}.{tenths} {suffix}")
}
