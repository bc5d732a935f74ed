//! Crate-level error taxonomy.
//!
//! Every subsystem error folds into [`SettlementError`]; callers branch on
//! [`SettlementError::kind`] rather than on individual variants.

use thiserror::Error;

use crate::chain::GatewayError;
use crate::keys::KeyError;
use crate::ledger::LedgerError;

/// How a caller should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any I/O.
    Validation,
    /// An optimistic check was lost; re-fetch and decide.
    Conflict,
    /// Gateway or broadcast failure; safe to retry with backoff.
    TransientNetwork,
    /// Impossible state; abort and surface to the operator.
    FatalInvariant,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientNetwork)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::FatalInvariant => "fatal_invariant",
        }
    }
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("draw {draw_id} is already finalized")]
    AlreadyFinalized { draw_id: u64 },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("broadcast of {txid} failed: {reason}")]
    BroadcastFailed { txid: String, reason: String },

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Keys(#[from] KeyError),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AlreadyFinalized { draw_id } => SettlementError::AlreadyFinalized { draw_id },
            other => SettlementError::Ledger(other),
        }
    }
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Validation(_) => ErrorKind::Validation,
            SettlementError::Conflict(_) | SettlementError::AlreadyFinalized { .. } => ErrorKind::Conflict,
            SettlementError::Gateway(e) => match e {
                GatewayError::NotMined(_) => ErrorKind::Conflict,
                GatewayError::Malformed(_) => ErrorKind::FatalInvariant,
                _ => ErrorKind::TransientNetwork,
            },
            SettlementError::BroadcastFailed { .. } | SettlementError::Timeout(_) => {
                ErrorKind::TransientNetwork
            }
            SettlementError::Ledger(e) => match e {
                LedgerError::Conflict(_) | LedgerError::AlreadyFinalized { .. } => ErrorKind::Conflict,
                LedgerError::NotFound(_) => ErrorKind::Validation,
                _ if e.is_busy() => ErrorKind::Conflict,
                _ => ErrorKind::FatalInvariant,
            },
            SettlementError::Keys(e) => match e {
                KeyError::InvalidAddress { .. } | KeyError::InvalidSignature(_) => ErrorKind::Validation,
                _ => ErrorKind::FatalInvariant,
            },
            SettlementError::Invariant(_) => ErrorKind::FatalInvariant,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        SettlementError::Validation(msg.into())
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy() {
        assert_eq!(SettlementError::validation("bad").kind(), ErrorKind::Validation);
        assert_eq!(
            SettlementError::from(LedgerError::Conflict("watermark".into())).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            SettlementError::from(GatewayError::Timeout(3)).kind(),
            ErrorKind::TransientNetwork
        );
        assert_eq!(
            SettlementError::from(LedgerError::Invariant("rows".into())).kind(),
            ErrorKind::FatalInvariant
        );
        assert!(ErrorKind::TransientNetwork.is_retryable());
        assert!(!ErrorKind::Conflict.is_retryable());
    }

    #[test]
    fn test_already_finalized_is_surfaced_directly() {
        let err = SettlementError::from(LedgerError::AlreadyFinalized { draw_id: 4 });
        assert!(matches!(err, SettlementError::AlreadyFinalized { draw_id: 4 }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
