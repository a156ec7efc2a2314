//! Error taxonomy for the scope engine.
//!
//! No failure here is fatal to the host process: catalog and save failures
//! leave the engine in its last good state and are cleared by retrying the
//! triggering action. Codes are catalogued in [`catalog`].
//!
//! | Variant                  | Surfaced as                               |
//! |--------------------------|-------------------------------------------|
//! | `CatalogUnavailable`     | non-fatal banner, tree keeps last state   |
//! | `CacheCorrupt`           | logged only, falls back to a fetch        |
//! | `SaveRejected`           | banner, selection left untouched          |
//! | `ScopeUnavailable`       | banner, selection starts from defaults    |
//! | `MalformedCatalogRecord` | logged only, record skipped               |

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the scope engine.
///
/// Causes are captured as strings so a single failure can be handed to
/// every caller that joined the same in-flight fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScopeError {
    /// A catalog page request failed; no partial snapshot was cached.
    #[error("repository catalog unavailable: {cause}")]
    CatalogUnavailable { cause: String },

    /// A cached catalog entry could not be decoded.
    #[error("catalog cache entry is corrupt: {reason}")]
    CacheCorrupt { reason: String },

    /// The persistence service failed the scope write.
    #[error("scope save rejected: {cause}")]
    SaveRejected { cause: String },

    /// The persisted scope could not be read.
    #[error("saved scope unavailable: {cause}")]
    ScopeUnavailable { cause: String },

    /// A catalog record lacked a project key or repository slug.
    #[error("malformed catalog record: {detail}")]
    MalformedCatalogRecord { detail: String },

    /// A repository that the current catalog does not contain.
    #[error("repository {key} is not in the catalog")]
    UnknownRepository { key: String },

    /// The selection or its save payload failed validation.
    #[error("invalid selection: {reason}")]
    InvalidSelection { reason: String },

    #[error("failed to read config {path}: {message}")]
    ConfigRead { path: PathBuf, message: String },

    #[error("failed to parse config {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid environment: {message}")]
    ConfigEnv { message: String },
}

impl ScopeError {
    pub fn catalog_unavailable(cause: impl std::fmt::Display) -> Self {
        Self::CatalogUnavailable {
            cause: cause.to_string(),
        }
    }

    pub fn save_rejected(cause: impl std::fmt::Display) -> Self {
        Self::SaveRejected {
            cause: cause.to_string(),
        }
    }

    pub fn scope_unavailable(cause: impl std::fmt::Display) -> Self {
        Self::ScopeUnavailable {
            cause: cause.to_string(),
        }
    }

    pub fn cache_corrupt(reason: impl std::fmt::Display) -> Self {
        Self::CacheCorrupt {
            reason: reason.to_string(),
        }
    }

    /// Catalogued code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CatalogUnavailable { .. } => ErrorCode::CatalogUnavailable,
            Self::CacheCorrupt { .. } => ErrorCode::CacheCorrupt,
            Self::SaveRejected { .. } => ErrorCode::SaveRejected,
            Self::ScopeUnavailable { .. } => ErrorCode::ScopeUnavailable,
            Self::MalformedCatalogRecord { .. } => ErrorCode::CatalogMalformedRecord,
            Self::UnknownRepository { .. } => ErrorCode::SelectionUnknownRepository,
            Self::InvalidSelection { .. } => ErrorCode::SelectionInvalid,
            Self::ConfigRead { .. } => ErrorCode::ConfigReadError,
            Self::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Self::ConfigEnv { .. } => ErrorCode::ConfigEnvError,
        }
    }

    /// Banner text: catalogued message, then the specific cause.
    pub fn banner(&self) -> String {
        format!("{} ({})", self.code().entry().format_brief(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_map_to_catalogued_codes() {
        assert_eq!(
            ScopeError::catalog_unavailable("boom").code(),
            ErrorCode::CatalogUnavailable
        );
        assert_eq!(
            ScopeError::save_rejected("500").code().category(),
            ErrorCategory::Save
        );
        assert_eq!(
            ScopeError::cache_corrupt("eof").code(),
            ErrorCode::CacheCorrupt
        );
    }

    #[test]
    fn banner_includes_code_and_cause() {
        let banner = ScopeError::catalog_unavailable("connection refused").banner();
        assert!(banner.starts_with("[RS-E100]"));
        assert!(banner.contains("connection refused"));
    }
}
