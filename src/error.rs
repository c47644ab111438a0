//! Custom error types for sonar.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for sonar operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum SonarError {
    // =========================================================================
    // Backup / Restore Errors
    // =========================================================================
    /// Source database (or backup) does not exist.
    #[error("Source database not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Source and destination resolve to the same file.
    #[error("Source and destination are the same file: {path}")]
    SameFile { path: PathBuf },

    /// Restore source failed its integrity check; nothing was modified.
    #[error("Backup integrity check failed for '{path}': {reason}")]
    SourceIntegrity { path: PathBuf, reason: String },

    /// Freshly written backup failed its integrity check.
    #[error("Backup integrity check failed for '{path}': {reason}")]
    BackupIntegrity { path: PathBuf, reason: String },

    /// Restored database failed verification and there was nothing to roll back to.
    #[error("Restored database integrity check failed for '{path}': {reason}")]
    RestoreIntegrity { path: PathBuf, reason: String },

    /// Restored database failed verification and the previous file was put back.
    #[error(
        "Restored database integrity check failed for '{path}': {reason}. The previous database was restored."
    )]
    RestoreRolledBack { path: PathBuf, reason: String },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database file exists but cannot be opened as a database.
    #[error("Failed to open database at '{path}': {reason}")]
    StoreOpen { path: PathBuf, reason: String },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Remote data gateway failure, surfaced unchanged.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A spawned fetch task panicked or was cancelled by the runtime.
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// JSON encode/decode failure for a stored column.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// Invalid command-line argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

/// Failures talking to the remote GraphQL service.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("No token found. Set SONAR_API_KEY or run: sonar config set token <token>")]
    MissingToken,

    #[error(
        "Request timed out after {seconds}s. The server may be overloaded or unreachable. Check SONAR_API_URL, your network connection, and retry."
    )]
    Timeout { seconds: u64 },

    #[error("Unable to reach server, please try again shortly.")]
    Unreachable(#[source] reqwest::Error),

    #[error("HTTP {status}")]
    Http { status: u16 },

    /// First message of a GraphQL `errors` array.
    #[error("{0}")]
    Graphql(String),

    #[error("Unexpected response from server: {0}")]
    Decode(String),
}

/// Result type alias for sonar operations.
pub type Result<T> = std::result::Result<T, SonarError>;

impl SonarError {
    /// Create a source not found error.
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    /// Create a store open error.
    pub fn store_open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StoreOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Whether the on-disk destination was left untouched or put back.
    #[must_use]
    pub const fn destination_preserved(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::SameFile { .. }
                | Self::SourceIntegrity { .. }
                | Self::RestoreRolledBack { .. }
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::SourceNotFound { .. } => {
                Some("Run 'sonar data download' to create the local database.")
            }
            Self::SameFile { .. } => Some("Pass a different --to path."),
            Self::SourceIntegrity { .. } => Some("Pick another backup file."),
            Self::BackupIntegrity { .. } => {
                Some("Run 'sonar data verify' on the source database.")
            }
            Self::RestoreIntegrity { .. } | Self::StoreOpen { .. } => {
                Some("Run 'sonar data download' to rebuild the local database.")
            }
            Self::Gateway(GatewayError::MissingToken) => {
                Some("Export SONAR_API_KEY or save a token in the config file.")
            }
            _ => None,
        }
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Calculate the Levenshtein edit distance between two strings.
///
/// This is used for "did you mean?" suggestions when users make typos.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();

    if a_chars.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find the best match from a list of candidates for a given input.
#[must_use]
pub fn find_closest_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .map(|&candidate| {
            let distance = levenshtein_distance(&input_lower, &candidate.to_lowercase());
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= 2 && *distance > 0)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Format an error for an unknown value with "did you mean?" support.
#[must_use]
pub fn format_unknown_value_error(kind: &str, input: &str, valid_options: &[&str]) -> String {
    let title = format!("Unknown {kind}: '{input}'");

    let mut suggestions = Vec::new();
    if let Some(closest) = find_closest_match(input, valid_options) {
        suggestions.push(format!("Did you mean '{}'?", closest.green()));
    }
    suggestions.push(format!("Valid {kind}s: {}", valid_options.join(", ")));

    let suggestion_refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
    format_error(&title, "", &suggestion_refs)
}

/// Config keys accepted by `sonar config set`.
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "token",
    "api_url",
    "vendor",
    "feed_render",
    "feed_width",
    "db",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SonarError::source_not_found("/path/to/data.db");
        assert!(err.to_string().contains("/path/to/data.db"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_rolled_back_preserves_destination() {
        let err = SonarError::RestoreRolledBack {
            path: PathBuf::from("/tmp/data.db"),
            reason: "database disk image is malformed".to_string(),
        };
        assert!(err.destination_preserved());
        assert!(err.to_string().contains("previous database was restored"));

        let err = SonarError::RestoreIntegrity {
            path: PathBuf::from("/tmp/data.db"),
            reason: "malformed".to_string(),
        };
        assert!(!err.destination_preserved());
    }

    #[test]
    fn test_gateway_error_is_transparent() {
        let err: SonarError = GatewayError::Graphql("Unauthorized".to_string()).into();
        assert_eq!(err.to_string(), "Unauthorized");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SonarError = io_err.into();
        assert!(matches!(err, SonarError::IoError(_)));
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("hello", "hello"), 0);
        assert_eq!(levenshtein_distance("cat", "cats"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
    }

    #[test]
    fn find_closest_config_key() {
        assert_eq!(find_closest_match("tokn", VALID_CONFIG_KEYS), Some("token"));
        assert_eq!(find_closest_match("vendr", VALID_CONFIG_KEYS), Some("vendor"));
        assert_eq!(find_closest_match("token", VALID_CONFIG_KEYS), None);
        assert_eq!(find_closest_match("zzzzzzzz", VALID_CONFIG_KEYS), None);
    }

    #[test]
    fn format_unknown_value_mentions_candidate() {
        let output = format_unknown_value_error("config key", "api_ur", VALID_CONFIG_KEYS);
        assert!(output.contains("api_ur"));
        assert!(output.contains("api_url"));
    }
}
