//! Error types for bwdb.
//!
//! The store has exactly two failure identities callers are expected to
//! branch on, so they are modeled as a small enum rather than opaque
//! reports. `Database::with_txn` relies on the `TxnConflict` identity to
//! decide whether an attempt is retryable.

use thiserror::Error;

/// Stable error kinds surfaced by the public API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A configuration value failed verification in [`crate::Database::with_config`].
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    /// A write collided with another transaction's pending intent, or a
    /// commit/close raced with an earlier termination of the same
    /// transaction.
    #[error("transaction conflict")]
    TxnConflict,
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_conflict_is_comparable() {
        assert_eq!(Error::TxnConflict, Error::TxnConflict);
        assert_ne!(Error::TxnConflict, Error::InvalidConfig("x"));
    }

    #[test]
    fn errors_render_messages() {
        assert_eq!(Error::TxnConflict.to_string(), "transaction conflict");
        assert_eq!(
            Error::InvalidConfig("max_delta_count must be positive").to_string(),
            "invalid config: max_delta_count must be positive"
        );
    }

    #[test]
    fn error_downcasts_through_eyre() {
        let report = eyre::Report::new(Error::TxnConflict);
        assert_eq!(report.downcast_ref::<Error>(), Some(&Error::TxnConflict));
    }
}
