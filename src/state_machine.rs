//! The transaction state machine.
//!
//! This module only answers one question: is `from -> to` a legal edge. It
//! never touches the database; callers apply the transition under the row
//! lock they already hold (see `db::transactions::update_status_locked`).

use crate::error::{Error, Result};
use crate::types::TransactionStatus as S;

/// Returns `true` if the transition `from -> to` is one of the allowed
/// edges. `from == to` is never valid: every call must make progress.
pub fn is_valid_transition(from: S, to: S) -> bool {
    use S::*;
    matches!(
        (from, to),
        (Initiated, NecPending)
            | (Initiated, FtdPending)
            | (Initiated, Failed)
            | (NecPending, NecSuccess)
            | (NecPending, NecFailed)
            | (NecSuccess, Completed)
            | (NecSuccess, FtdPending)
            | (NecFailed, Failed)
            | (FtdPending, FtdSuccess)
            | (FtdPending, FtdFailed)
            | (FtdPending, FtdTsq)
            | (FtdPending, Timeout)
            | (FtdTsq, FtdSuccess)
            | (FtdTsq, FtdFailed)
            | (FtdTsq, Timeout)
            | (FtdSuccess, FtcPending)
            | (FtdFailed, Failed)
            | (FtcPending, FtcSuccess)
            | (FtcPending, FtcFailed)
            | (FtcPending, FtcTsq)
            | (FtcPending, Timeout)
            | (FtcTsq, FtcSuccess)
            | (FtcTsq, FtcFailed)
            | (FtcTsq, Timeout)
            | (FtcSuccess, Completed)
            | (FtcFailed, ReversalPending)
            | (ReversalPending, ReversalSuccess)
            | (ReversalPending, ReversalFailed)
            | (ReversalSuccess, Failed)
            | (ReversalFailed, Failed)
    )
}

/// Validates a proposed transition, returning the typed error the rest of
/// the engine expects when the edge does not exist.
pub fn validate_transition(from: S, to: S) -> Result<()> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(Error::InvalidStateTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionStatus::*;

    #[test]
    fn happy_path_ft_edges_are_legal() {
        assert!(is_valid_transition(Initiated, FtdPending));
        assert!(is_valid_transition(FtdPending, FtdSuccess));
        assert!(is_valid_transition(FtdSuccess, FtcPending));
        assert!(is_valid_transition(FtcPending, FtcSuccess));
        assert!(is_valid_transition(FtcSuccess, Completed));
    }

    #[test]
    fn reversal_chain_is_legal() {
        assert!(is_valid_transition(FtcFailed, ReversalPending));
        assert!(is_valid_transition(ReversalPending, ReversalSuccess));
        assert!(is_valid_transition(ReversalSuccess, Failed));
        assert!(is_valid_transition(ReversalPending, ReversalFailed));
        assert!(is_valid_transition(ReversalFailed, Failed));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [Completed, Failed, Timeout] {
            for to in [
                Initiated, NecPending, NecSuccess, NecFailed, FtdPending, FtdTsq, FtdSuccess,
                FtdFailed, FtcPending, FtcTsq, FtcSuccess, FtcFailed, ReversalPending,
                ReversalSuccess, ReversalFailed, Completed, Failed, Timeout,
            ] {
                assert!(!is_valid_transition(terminal, to), "{terminal} -> {to} should be invalid");
            }
        }
    }

    #[test]
    fn skipping_ftd_to_ftc_is_rejected() {
        assert!(!is_valid_transition(FtdPending, FtcPending));
        assert!(!is_valid_transition(Initiated, Completed));
    }

    #[test]
    fn self_loops_are_rejected() {
        assert!(!is_valid_transition(FtdPending, FtdPending));
    }

    #[test]
    fn validate_transition_surfaces_typed_error() {
        let err = validate_transition(Completed, FtdPending).unwrap_err();
        match err {
            Error::InvalidStateTransition { from, to } => {
                assert_eq!(from, Completed);
                assert_eq!(to, FtdPending);
            }
            _ => panic!("expected InvalidStateTransition"),
        }
    }
}
