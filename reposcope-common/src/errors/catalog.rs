//! Error catalog for the scope engine.
//!
//! Every failure the engine can surface maps to a stable code with a
//! human-readable message and remediation steps, so renderers can show a
//! consistent banner regardless of which component failed.
//!
//! # Error Code Ranges
//!
//! | Range      | Category  | Description                              |
//! |------------|-----------|------------------------------------------|
//! | E001-E099  | Config    | Configuration and environment errors     |
//! | E100-E199  | Catalog   | Repository catalog acquisition           |
//! | E200-E299  | Cache     | Local catalog cache                      |
//! | E300-E399  | Save      | Scope persistence round-trips            |
//! | E400-E499  | Selection | Selection and payload validation         |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all scope engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file contains invalid TOML
    ConfigParseError,
    /// Environment variable has an invalid value
    ConfigEnvError,

    // =========================================================================
    // Catalog Errors (E100-E199)
    // =========================================================================
    /// A catalog page request failed
    CatalogUnavailable,
    /// A catalog record was missing its project key or slug
    CatalogMalformedRecord,

    // =========================================================================
    // Cache Errors (E200-E299)
    // =========================================================================
    /// A cached catalog entry could not be read or decoded
    CacheCorrupt,

    // =========================================================================
    // Save Errors (E300-E399)
    // =========================================================================
    /// The persistence service rejected or failed a scope write
    SaveRejected,
    /// The persisted scope could not be read
    ScopeUnavailable,

    // =========================================================================
    // Selection Errors (E400-E499)
    // =========================================================================
    /// Repository is not present in the catalog
    SelectionUnknownRepository,
    /// Selection or payload failed validation
    SelectionInvalid,
}

impl ErrorCode {
    /// Every code, in numeric order.
    pub fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigEnvError,
            Self::CatalogUnavailable,
            Self::CatalogMalformedRecord,
            Self::CacheCorrupt,
            Self::SaveRejected,
            Self::ScopeUnavailable,
            Self::SelectionUnknownRepository,
            Self::SelectionInvalid,
        ]
    }

    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            Self::ConfigReadError => 1,
            Self::ConfigParseError => 2,
            Self::ConfigEnvError => 3,
            Self::CatalogUnavailable => 100,
            Self::CatalogMalformedRecord => 101,
            Self::CacheCorrupt => 200,
            Self::SaveRejected => 300,
            Self::ScopeUnavailable => 301,
            Self::SelectionUnknownRepository => 400,
            Self::SelectionInvalid => 401,
        }
    }

    /// Returns the formatted error code string (e.g., "RS-E100").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("RS-E{:03}", self.code_number())
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Catalog,
            200..=299 => ErrorCategory::Cache,
            300..=399 => ErrorCategory::Save,
            _ => ErrorCategory::Selection,
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigReadError => "Failed to read configuration file",
            Self::ConfigParseError => "Configuration file contains invalid TOML syntax",
            Self::ConfigEnvError => "Environment variable has invalid value",
            Self::CatalogUnavailable => "Repository catalog could not be loaded",
            Self::CatalogMalformedRecord => "Catalog record is missing its project key or slug",
            Self::CacheCorrupt => "Cached repository catalog is unreadable",
            Self::SaveRejected => "Repository scope could not be saved",
            Self::ScopeUnavailable => "Saved repository scope could not be loaded",
            Self::SelectionUnknownRepository => "Repository is not part of the catalog",
            Self::SelectionInvalid => "Repository selection is invalid",
        }
    }

    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigReadError => &["Check that the configuration path exists and is readable"],
            Self::ConfigParseError => &["Fix the TOML syntax reported in the error message"],
            Self::ConfigEnvError => &["Unset or correct the REPOSCOPE_* variable named above"],
            Self::CatalogUnavailable => &[
                "Retry the catalog load; the last good tree is kept meanwhile",
                "Verify the server URL and that the account has administrator access",
            ],
            Self::CatalogMalformedRecord => &["The record is skipped; no action is required"],
            Self::CacheCorrupt => &["The entry is ignored and the catalog is fetched again"],
            Self::SaveRejected => &[
                "Your selection is unchanged; retry the save",
                "Check the server log for the rejected request",
            ],
            Self::ScopeUnavailable => &["Retry; the selection shown may not match the server"],
            Self::SelectionUnknownRepository => &["Refresh the catalog and select again"],
            Self::SelectionInvalid => &[
                "Select at most 1000 repositories",
                "Use PROJECT/slug keys with upper-case project keys",
            ],
        }
    }

    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Catalog,
    Cache,
    Save,
    Selection,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "Configuration",
            Self::Catalog => "Catalog",
            Self::Cache => "Cache",
            Self::Save => "Save",
            Self::Selection => "Selection",
        };
        f.write_str(name)
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "RS-E100")
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n", self.code, self.message);
        if !self.remediation.is_empty() {
            output.push_str("\nRemediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }
        output
    }

    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numbers_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::all() {
            assert!(
                seen.insert(code.code_number()),
                "Duplicate error code number for {:?}",
                code
            );
        }
    }

    #[test]
    fn test_error_code_format_and_category() {
        assert_eq!(ErrorCode::ConfigReadError.code_string(), "RS-E001");
        assert_eq!(ErrorCode::CatalogUnavailable.code_string(), "RS-E100");
        assert_eq!(ErrorCode::CacheCorrupt.category(), ErrorCategory::Cache);
        assert_eq!(ErrorCode::SaveRejected.category(), ErrorCategory::Save);
        assert_eq!(
            ErrorCode::SelectionInvalid.category(),
            ErrorCategory::Selection
        );
    }

    #[test]
    fn test_every_code_has_remediation() {
        for code in ErrorCode::all() {
            assert!(!code.remediation().is_empty(), "{:?} lacks remediation", code);
        }
    }

    #[test]
    fn test_format_full_numbers_steps() {
        let full = ErrorCode::SaveRejected.entry().format_full();
        assert!(full.starts_with("[RS-E300] Repository scope could not be saved"));
        assert!(full.contains("  1. Your selection is unchanged; retry the save"));
        assert!(full.contains("  2. "));
    }
}
