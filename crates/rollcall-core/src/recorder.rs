//! Attendance recorder contract and the late-arrival rule.
//!
//! Status is derived here, not by the matcher, so every front-end that
//! records attendance labels arrivals the same way.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Late => "Late",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "Present" => Some(AttendanceStatus::Present),
            "Late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful `record` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded {
        status: AttendanceStatus,
        late_minutes: i64,
    },
    /// A row already exists for this student today. Benign.
    AlreadyMarked,
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("no registered student for label {0:?}")]
    Unregistered(String),
    #[error("storage write failed: {0}")]
    Storage(String),
}

/// What to do when a matched label has no student registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnregisteredPolicy {
    /// Create a minimal student from the label, then record.
    #[default]
    Register,
    /// Refuse to record.
    Reject,
}

impl FromStr for UnregisteredPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "register" => Ok(UnregisteredPolicy::Register),
            "reject" => Ok(UnregisteredPolicy::Reject),
            other => Err(format!("unknown unregistered policy: {other} (expected `register` or `reject`)")),
        }
    }
}

/// Persists first-seen-today attendance for a matched label.
pub trait Recorder: Send {
    fn record(
        &mut self,
        label: &str,
        at: NaiveDateTime,
        confidence: Option<f32>,
    ) -> Result<RecordOutcome, RecordError>;
}

/// Shift start plus grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatePolicy {
    pub shift_start: NaiveTime,
    pub late_threshold_minutes: i64,
}

impl Default for LatePolicy {
    fn default() -> Self {
        Self {
            shift_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            late_threshold_minutes: 15,
        }
    }
}

impl LatePolicy {
    /// Status and minutes late for an arrival at `time`.
    ///
    /// Late only when the arrival is more than the threshold past shift
    /// start; minutes late are reported only for late arrivals.
    pub fn evaluate(&self, time: NaiveTime) -> (AttendanceStatus, i64) {
        let elapsed = (time - self.shift_start).num_minutes().max(0);
        if elapsed > self.late_threshold_minutes {
            (AttendanceStatus::Late, elapsed)
        } else {
            (AttendanceStatus::Present, 0)
        }
    }
}

/// Map a gallery label to its student id: lower-cased, spaces to `_`.
pub fn student_id_for(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_late_after_threshold() {
        let policy = LatePolicy::default();
        assert_eq!(policy.evaluate(at(9, 20)), (AttendanceStatus::Late, 20));
    }

    #[test]
    fn test_present_within_grace() {
        let policy = LatePolicy::default();
        assert_eq!(policy.evaluate(at(9, 5)), (AttendanceStatus::Present, 0));
        assert_eq!(policy.evaluate(at(9, 15)), (AttendanceStatus::Present, 0));
    }

    #[test]
    fn test_early_arrival_is_present() {
        let policy = LatePolicy::default();
        assert_eq!(policy.evaluate(at(8, 30)), (AttendanceStatus::Present, 0));
    }

    #[test]
    fn test_partial_minutes_floor() {
        let policy = LatePolicy::default();
        let t = NaiveTime::from_hms_opt(9, 16, 59).unwrap();
        assert_eq!(policy.evaluate(t), (AttendanceStatus::Late, 16));
    }

    #[test]
    fn test_custom_shift() {
        let policy = LatePolicy {
            shift_start: at(13, 0),
            late_threshold_minutes: 5,
        };
        assert_eq!(policy.evaluate(at(13, 6)), (AttendanceStatus::Late, 6));
        assert_eq!(policy.evaluate(at(9, 0)), (AttendanceStatus::Present, 0));
    }

    #[test]
    fn test_student_id_for() {
        assert_eq!(student_id_for("Ada Lovelace"), "ada_lovelace");
        assert_eq!(student_id_for(" grace "), "grace");
    }

    #[test]
    fn test_status_db_str() {
        assert_eq!(AttendanceStatus::from_db_str("Late"), Some(AttendanceStatus::Late));
        assert_eq!(AttendanceStatus::from_db_str("late"), None);
        assert_eq!(AttendanceStatus::Present.to_string(), "Present");
    }

    #[test]
    fn test_unregistered_policy_from_str() {
        assert_eq!("reject".parse::<UnregisteredPolicy>().unwrap(), UnregisteredPolicy::Reject);
        assert!("ignore".parse::<UnregisteredPolicy>().is_err());
    }
}
