// Pure timing metrics: per-attempt error, severity and the session score.

use serde::Serialize;

use crate::error::ScoringError;

/// Upper bound (exclusive) of |percent error| rated Good
pub const GOOD_LIMIT: f64 = 0.05;
/// Upper bound (exclusive) of |percent error| rated Warning
pub const WARNING_LIMIT: f64 = 0.15;
/// Fear mode penalizes at this |percent error| regardless of display severity
pub const FEAR_THRESHOLD: f64 = 0.10;
/// Mean |percent error| that maps to an acuity of zero
pub const FULL_SCALE_ERROR: f64 = 0.50;

/// One sealed trial
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attempt {
    pub start_ms: u64,
    pub tap_ms: u64,
    pub elapsed_secs: f64,
    pub signed_error: f64,
    pub abs_error: f64,
    pub percent_error: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum Direction {
    Early,
    Late,
    #[strum(serialize = "On time")]
    OnTime,
}

impl Attempt {
    pub fn direction(&self) -> Direction {
        if self.signed_error > 0.0 {
            Direction::Late
        } else if self.signed_error < 0.0 {
            Direction::Early
        } else {
            Direction::OnTime
        }
    }

    pub fn severity(&self) -> Severity {
        classify_severity(self.percent_error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum Severity {
    Good,
    Warning,
    Severe,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionScore {
    /// seconds
    pub mean_abs_error: f64,
    /// seconds; negative when the user tends to tap early
    pub mean_signed_error: f64,
    pub score: u8,
}

pub fn compute_attempt_metrics(
    start_ms: u64,
    tap_ms: u64,
    target_secs: f64,
) -> Result<Attempt, ScoringError> {
    if tap_ms < start_ms || !(target_secs > 0.0) {
        return Err(ScoringError::InvalidTiming {
            start_ms,
            tap_ms,
            target_secs,
        });
    }

    let elapsed_secs = (tap_ms - start_ms) as f64 / 1000.0;
    let signed_error = elapsed_secs - target_secs;

    Ok(Attempt {
        start_ms,
        tap_ms,
        elapsed_secs,
        signed_error,
        abs_error: signed_error.abs(),
        percent_error: signed_error / target_secs,
    })
}

/// Bands are closed on the low side: exactly 0.05 is Warning, exactly 0.15 is Severe.
pub fn classify_severity(percent_error: f64) -> Severity {
    let magnitude = percent_error.abs();
    if magnitude < GOOD_LIMIT {
        Severity::Good
    } else if magnitude < WARNING_LIMIT {
        Severity::Warning
    } else {
        Severity::Severe
    }
}

pub fn triggers_fear_penalty(attempt: &Attempt) -> bool {
    attempt.severity() == Severity::Severe || attempt.percent_error.abs() >= FEAR_THRESHOLD
}

pub fn compute_session_score(attempts: &[Attempt]) -> Result<SessionScore, ScoringError> {
    let mean_abs_error = mean(attempts.iter().map(|a| a.abs_error))
        .ok_or(ScoringError::EmptyAttemptSet)?;
    let mean_signed_error =
        mean(attempts.iter().map(|a| a.signed_error)).ok_or(ScoringError::EmptyAttemptSet)?;
    let mean_abs_percent = mean(attempts.iter().map(|a| a.percent_error.abs()))
        .ok_or(ScoringError::EmptyAttemptSet)?;

    let acuity = (1.0 - mean_abs_percent / FULL_SCALE_ERROR).clamp(0.0, 1.0);

    Ok(SessionScore {
        mean_abs_error,
        mean_signed_error,
        score: (100.0 * acuity).round() as u8,
    })
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const EPS: f64 = 1e-9;

    fn attempt(elapsed_secs: u64, target: f64) -> Attempt {
        compute_attempt_metrics(1_000, 1_000 + elapsed_secs * 1000, target).unwrap()
    }

    #[test]
    fn test_attempt_metrics() {
        let a = compute_attempt_metrics(10_000, 322_500, 300.0).unwrap();
        assert!((a.elapsed_secs - 312.5).abs() < EPS);
        assert!((a.signed_error - 12.5).abs() < EPS);
        assert!((a.abs_error - 12.5).abs() < EPS);
        assert!((a.percent_error - 12.5 / 300.0).abs() < EPS);
        assert_eq!(a.direction(), Direction::Late);
    }

    #[test]
    fn test_attempt_metrics_early() {
        let a = attempt(270, 300.0);
        assert!((a.signed_error + 30.0).abs() < EPS);
        assert!((a.abs_error - 30.0).abs() < EPS);
        assert!((a.percent_error + 0.10).abs() < EPS);
        assert_eq!(a.direction(), Direction::Early);
    }

    #[test]
    fn test_attempt_metrics_rejects_bad_timing() {
        assert_matches!(
            compute_attempt_metrics(500, 499, 10.0),
            Err(ScoringError::InvalidTiming { .. })
        );
        assert_matches!(
            compute_attempt_metrics(0, 10, 0.0),
            Err(ScoringError::InvalidTiming { .. })
        );
        assert_matches!(
            compute_attempt_metrics(0, 10, f64::NAN),
            Err(ScoringError::InvalidTiming { .. })
        );
    }

    #[test]
    fn test_zero_elapsed_is_valid() {
        let a = compute_attempt_metrics(42, 42, 10.0).unwrap();
        assert_eq!(a.elapsed_secs, 0.0);
        assert!((a.percent_error + 1.0).abs() < EPS);
    }

    #[test]
    fn test_classify_severity_boundaries() {
        assert_eq!(classify_severity(0.04), Severity::Good);
        assert_eq!(classify_severity(0.05), Severity::Warning);
        assert_eq!(classify_severity(0.149), Severity::Warning);
        assert_eq!(classify_severity(0.15), Severity::Severe);
        assert_eq!(classify_severity(-0.04), Severity::Good);
        assert_eq!(classify_severity(-0.2), Severity::Severe);
    }

    #[test]
    fn test_perfect_single_attempt() {
        let a = attempt(300, 300.0);
        assert_eq!(a.signed_error, 0.0);
        assert_eq!(a.direction(), Direction::OnTime);
        let score = compute_session_score(&[a]).unwrap();
        assert_eq!(score.score, 100);
        assert_eq!(score.mean_abs_error, 0.0);
    }

    #[test]
    fn test_symmetric_attempts_score_80() {
        let attempts = [attempt(330, 300.0), attempt(270, 300.0)];
        assert!((attempts[0].abs_error - 30.0).abs() < EPS);
        assert!((attempts[1].abs_error - 30.0).abs() < EPS);
        assert!((attempts[0].percent_error - 0.10).abs() < EPS);
        assert!((attempts[1].percent_error + 0.10).abs() < EPS);

        let score = compute_session_score(&attempts).unwrap();
        assert!((score.mean_abs_error - 30.0).abs() < EPS);
        assert!(score.mean_signed_error.abs() < EPS);
        assert_eq!(score.score, 80);
    }

    #[test]
    fn test_huge_overshoot_clamps_to_zero() {
        let a = attempt(150, 60.0);
        assert!((a.percent_error - 1.5).abs() < EPS);
        assert_eq!(compute_session_score(&[a]).unwrap().score, 0);
    }

    #[test]
    fn test_empty_attempts_fail() {
        assert_matches!(
            compute_session_score(&[]),
            Err(ScoringError::EmptyAttemptSet)
        );
    }

    #[test]
    fn test_fear_threshold_is_stricter_than_severity() {
        let over = attempt(111, 100.0);
        assert!(triggers_fear_penalty(&over));
        assert_eq!(over.severity(), Severity::Warning);

        let mild = attempt(105, 100.0);
        assert_eq!(mild.severity(), Severity::Warning);
        assert!(!triggers_fear_penalty(&mild));

        let exact = attempt(90, 100.0);
        assert!(triggers_fear_penalty(&exact));
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean([10., 20., 30., 15., 22.].into_iter()), Some(19.4));
        assert_eq!(mean(std::iter::empty()), None);
    }
}
