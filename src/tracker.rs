//! # Session Tracker
//!
//! One tracker per cycle slot. Two states: idle, or running with an open
//! session that accumulates voltage samples until it is stopped.
//!
//! The controller opens and closes sessions from the foreground, while
//! `accumulate` may be called from the polling side. All state sits behind a
//! single short-held mutex, so a sample either lands before the stop
//! boundary or is dropped with the idle tracker; it is never half-applied.

use crate::energy::{EnergyModel, VoltageAccumulator};
use crate::error::ControlError;
use crate::session::{CycleId, Session};
use chrono::{NaiveDateTime, SubsecRound, TimeDelta};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// An open session as seen from outside the tracker
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    pub cycle: CycleId,
    pub student: String,
    pub start: NaiveDateTime,
    pub voltage: VoltageAccumulator,
}

#[derive(Debug)]
enum TrackerState {
    Idle,
    Running(ActiveSession),
}

pub struct SessionTracker {
    cycle: CycleId,
    model: Arc<dyn EnergyModel>,
    state: Mutex<TrackerState>,
}

impl SessionTracker {
    pub fn new(cycle: CycleId, model: Arc<dyn EnergyModel>) -> Self {
        Self {
            cycle,
            model,
            state: Mutex::new(TrackerState::Idle),
        }
    }

    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // State is plain data; a panic elsewhere cannot leave it half-written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock(), TrackerState::Running(_))
    }

    /// Student currently riding, if any
    pub fn student(&self) -> Option<String> {
        match &*self.lock() {
            TrackerState::Running(open) => Some(open.student.clone()),
            TrackerState::Idle => None,
        }
    }

    pub fn snapshot(&self) -> Option<ActiveSession> {
        match &*self.lock() {
            TrackerState::Running(open) => Some(open.clone()),
            TrackerState::Idle => None,
        }
    }

    /// Idle -> Running. Fails without touching state if already running.
    pub fn start_at(&self, student: &str, now: NaiveDateTime) -> Result<(), ControlError> {
        let mut state = self.lock();
        if let TrackerState::Running(_) = *state {
            return Err(ControlError::CycleBusy(self.cycle));
        }

        *state = TrackerState::Running(ActiveSession {
            cycle: self.cycle,
            student: student.to_string(),
            start: now,
            voltage: VoltageAccumulator::default(),
        });
        Ok(())
    }

    /// Fold one reading into the open session; ignored while idle
    pub fn accumulate(&self, voltage: f64) {
        if let TrackerState::Running(open) = &mut *self.lock() {
            open.voltage.add(voltage);
        }
    }

    /// Energy so far, without closing the session
    pub fn live_estimate_at(&self, now: NaiveDateTime) -> Option<f64> {
        match &*self.lock() {
            TrackerState::Running(open) => {
                Some(self.model.estimate(&open.voltage, elapsed(open.start, now)))
            }
            TrackerState::Idle => None,
        }
    }

    /// Running -> Idle.
    ///
    /// The closed session is handed to `persist` while the tracker is still
    /// locked. The tracker only resets when `persist` succeeds, so a failed
    /// write leaves the session running and nothing is lost.
    /// Returns `Ok(None)` when the tracker was already idle.
    pub fn stop_at<F, E>(&self, now: NaiveDateTime, persist: F) -> Result<Option<Session>, E>
    where
        F: FnOnce(&Session) -> Result<(), E>,
    {
        let mut state = self.lock();
        let open = match &*state {
            TrackerState::Running(open) => open,
            TrackerState::Idle => return Ok(None),
        };

        let now = now.max(open.start);
        let start = open.start.trunc_subsecs(0);
        // Rounded up so a closed session always ends after it started
        let end = round_up_to_second(now).max(start + TimeDelta::seconds(1));
        let session = Session {
            student: open.student.clone(),
            cycle: self.cycle,
            start,
            end,
            duration_secs: (end - start).num_seconds(),
            energy_kwh: self.model.estimate(&open.voltage, elapsed(open.start, now)),
        };

        persist(&session)?;
        *state = TrackerState::Idle;
        Ok(Some(session))
    }
}

fn round_up_to_second(t: NaiveDateTime) -> NaiveDateTime {
    let whole = t.trunc_subsecs(0);
    if whole < t {
        whole + TimeDelta::seconds(1)
    } else {
        whole
    }
}

fn elapsed(start: NaiveDateTime, now: NaiveDateTime) -> Duration {
    (now - start).to_std().unwrap_or_default()
}
