use crate::db::RepoError;
use crate::decode::DecodeError;
use thiserror::Error;

/// Failure of the ledger pipeline for a single message.
///
/// Position and back-reference failures are not represented here: they are
/// logged and the pipeline continues.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Rejected event: {0}")]
    Decode(#[from] DecodeError),
    #[error("Duplicate check failed for {key}: {source}")]
    DuplicateCheck { key: String, source: RepoError },
    #[error("Audit append failed for {key}: {source}")]
    AuditWrite { key: String, source: RepoError },
    #[error("Trade history write failed for {symbol}: {source}")]
    Archive { symbol: String, source: RepoError },
}

impl LedgerError {
    /// True when the message itself is unusable and retrying cannot help.
    pub fn is_rejection(&self) -> bool {
        matches!(self, LedgerError::Decode(_))
    }
}
