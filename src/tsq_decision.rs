//! The TSQ decision table: maps a Transaction Status Query
//! response's `(actionCode, statusCode)` pair to a terminal-ish verdict the
//! TSQ Worker and Timeout Worker apply per leg type.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsqDecision {
    /// The leg succeeded; commit it.
    Success,
    /// Still processing at the Gateway; requeue for another attempt.
    RetryLater,
    /// The Gateway has a definite negative answer; fail the leg.
    Fail,
    /// Mismatched values or a stale business day; needs operator review.
    Manual,
}

/// Classifies a TSQ response against the known `(actionCode, statusCode)`
/// table. Any pair not listed is treated as `RetryLater`, matching the
/// explicit `UNKNOWN -> RETRY_LATER` row.
pub fn classify(action_code: Option<&str>, status_code: Option<&str>) -> TsqDecision {
    match action_code {
        Some("000") => match status_code {
            Some("000") => TsqDecision::Success,
            Some("990") => TsqDecision::RetryLater,
            Some("381") => TsqDecision::Fail,
            _ => TsqDecision::RetryLater,
        },
        Some("381") => TsqDecision::Manual,
        Some("999") => TsqDecision::Fail,
        Some("990") => TsqDecision::RetryLater,
        _ => TsqDecision::RetryLater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_both_codes_zero() {
        assert_eq!(classify(Some("000"), Some("000")), TsqDecision::Success);
    }

    #[test]
    fn still_processing_retries() {
        assert_eq!(classify(Some("000"), Some("990")), TsqDecision::RetryLater);
    }

    #[test]
    fn gateway_has_it_receiver_does_not_fails() {
        assert_eq!(classify(Some("000"), Some("381")), TsqDecision::Fail);
    }

    #[test]
    fn mismatched_values_go_manual() {
        assert_eq!(classify(Some("381"), None), TsqDecision::Manual);
    }

    #[test]
    fn validation_error_fails() {
        assert_eq!(classify(Some("999"), None), TsqDecision::Fail);
    }

    #[test]
    fn gateway_exception_retries() {
        assert_eq!(classify(Some("990"), None), TsqDecision::RetryLater);
    }

    #[test]
    fn unknown_pair_is_treated_as_retry_later() {
        assert_eq!(classify(Some("777"), Some("123")), TsqDecision::RetryLater);
        assert_eq!(classify(None, None), TsqDecision::RetryLater);
    }
}
