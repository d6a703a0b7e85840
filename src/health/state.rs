//! Health state and aggregation.
//!
//! # States
//! - OK: every check passes
//! - WARNING: no results yet, or a check is failing but has not been
//!   failing for longer than the critical timeout
//! - CRITICAL: a check has been failing for longer than the critical timeout
//!
//! # State Transitions
//! ```text
//! OK → WARNING: a check fails
//! WARNING → CRITICAL: the failing check stays failed past critical_timeout
//! WARNING/CRITICAL → OK: every check passes again
//! ```
//!
//! # Design Decisions
//! - A check's failure clock starts at its first failure after a success
//! - State changes logged by the checker, not here

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use serde::Serialize;

/// Aggregate or per-check health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Warning,
    Critical,
}

impl Status {
    /// HTTP status reported by the health endpoint.
    pub fn http_status(self) -> StatusCode {
        match self {
            Status::Ok => StatusCode::OK,
            Status::Warning => StatusCode::TOO_MANY_REQUESTS,
            Status::Critical => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Latest result of one named check.
#[derive(Debug, Clone)]
pub struct CheckState {
    pub status: Status,
    pub message: String,
    pub last_checked: SystemTime,
    pub last_success: Option<SystemTime>,
    pub last_failure: Option<SystemTime>,
    /// When the current run of failures began.
    failing_since: Option<Instant>,
}

impl CheckState {
    /// Fold a new result into the previous state (if any).
    pub fn record(previous: Option<&CheckState>, result: Result<(), String>, now: Instant) -> Self {
        let at = SystemTime::now();
        let last_success = previous.and_then(|p| p.last_success);
        let last_failure = previous.and_then(|p| p.last_failure);

        match result {
            Ok(()) => Self {
                status: Status::Ok,
                message: "OK".to_string(),
                last_checked: at,
                last_success: Some(at),
                last_failure,
                failing_since: None,
            },
            Err(message) => Self {
                status: Status::Critical,
                message,
                last_checked: at,
                last_success,
                last_failure: Some(at),
                failing_since: previous.and_then(|p| p.failing_since).or(Some(now)),
            },
        }
    }

    /// How long this check has been failing, if it is.
    pub fn failing_for(&self, now: Instant) -> Option<Duration> {
        self.failing_since.map(|since| now.saturating_duration_since(since))
    }
}

/// Combine per-check states into the service status.
///
/// `None` entries are checks that have not reported yet.
pub fn aggregate<'a, I>(states: I, critical_timeout: Duration, now: Instant) -> Status
where
    I: IntoIterator<Item = Option<&'a CheckState>>,
{
    let mut overall = None;
    for state in states {
        let status = match state {
            None => Status::Warning,
            Some(state) => match state.failing_for(now) {
                None => Status::Ok,
                Some(failing) if failing > critical_timeout => Status::Critical,
                Some(_) => Status::Warning,
            },
        };
        overall = Some(overall.map_or(status, |o: Status| o.max(status)));
    }
    overall.unwrap_or(Status::Warning)
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRITICAL: Duration = Duration::from_secs(90);

    #[test]
    fn test_no_checks_is_warning() {
        assert_eq!(aggregate(Vec::new(), CRITICAL, Instant::now()), Status::Warning);
        assert_eq!(aggregate(vec![None], CRITICAL, Instant::now()), Status::Warning);
    }

    #[test]
    fn test_all_ok() {
        let now = Instant::now();
        let state = CheckState::record(None, Ok(()), now);
        assert_eq!(aggregate(vec![Some(&state)], CRITICAL, now), Status::Ok);
        assert!(state.last_success.is_some());
    }

    #[test]
    fn test_recent_failure_is_warning_then_critical() {
        let start = Instant::now();
        let state = CheckState::record(None, Err("refused".into()), start);
        assert_eq!(aggregate(vec![Some(&state)], CRITICAL, start), Status::Warning);

        let later = start + Duration::from_secs(91);
        let state = CheckState::record(Some(&state), Err("refused".into()), later);
        assert_eq!(aggregate(vec![Some(&state)], CRITICAL, later), Status::Critical);
    }

    #[test]
    fn test_success_resets_failure_clock() {
        let start = Instant::now();
        let failed = CheckState::record(None, Err("down".into()), start);
        let recovered = CheckState::record(Some(&failed), Ok(()), start + Duration::from_secs(100));
        assert!(recovered.failing_for(start + Duration::from_secs(200)).is_none());
        assert!(recovered.last_failure.is_some());

        let again = CheckState::record(Some(&recovered), Err("down".into()), start + Duration::from_secs(200));
        assert_eq!(
            again.failing_for(start + Duration::from_secs(210)),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_worst_status_wins() {
        let now = Instant::now();
        let ok = CheckState::record(None, Ok(()), now);
        let failing = CheckState::record(None, Err("x".into()), now);
        assert_eq!(aggregate(vec![Some(&ok), Some(&failing)], CRITICAL, now), Status::Warning);
        assert_eq!(aggregate(vec![Some(&ok), None], CRITICAL, now), Status::Warning);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Status::Ok.http_status(), StatusCode::OK);
        assert_eq!(Status::Warning.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(Status::Critical.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
