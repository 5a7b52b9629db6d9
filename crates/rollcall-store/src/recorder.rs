//! [`Recorder`] backed by the attendance database.

use crate::error::StoreError;
use crate::models::AttendanceMark;
use crate::store::AttendanceStore;
use chrono::NaiveDateTime;
use rollcall_core::{LatePolicy, RecordError, RecordOutcome, Recorder, UnregisteredPolicy};

pub struct SqliteRecorder {
    store: AttendanceStore,
    session_id: Option<String>,
    policy: LatePolicy,
    unregistered: UnregisteredPolicy,
}

impl SqliteRecorder {
    pub fn new(store: AttendanceStore, policy: LatePolicy, unregistered: UnregisteredPolicy) -> Self {
        Self {
            store,
            session_id: None,
            policy,
            unregistered,
        }
    }

    /// Tag every row written from now on with `session_id`.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn store(&self) -> &AttendanceStore {
        &self.store
    }

    pub fn into_store(self) -> AttendanceStore {
        self.store
    }
}

impl Recorder for SqliteRecorder {
    fn record(
        &mut self,
        label: &str,
        at: NaiveDateTime,
        confidence: Option<f32>,
    ) -> Result<RecordOutcome, RecordError> {
        let mark = AttendanceMark {
            label,
            at,
            confidence,
            session_id: self.session_id.as_deref(),
        };
        self.store
            .mark_attendance(&mark, &self.policy, self.unregistered)
            .map_err(|e| match e {
                StoreError::Unregistered(_) => RecordError::Unregistered(label.to_string()),
                other => RecordError::Storage(other.to_string()),
            })
    }
}
