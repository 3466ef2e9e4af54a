//! # Application Controller
//!
//! Owns one `SessionTracker` per cycle, routes device readings to them and
//! runs the operator's start/stop/reset actions against the session log.
//!
//! ## Threading
//! Sessions only open and close through `&mut self`, i.e. from the
//! foreground. Readings go through `ReadingRouter`, which is `Clone + Send`
//! and only ever touches tracker accumulators.
//!
//! ## Rejections
//! Every check happens before any state changes, so a rejected action
//! leaves trackers, roster and the log exactly as they were.

use crate::access::AccessPolicy;
use crate::energy::EnergyModel;
use crate::error::ControlError;
use crate::reading::ReadingBatch;
use crate::session::{CycleId, Session};
use crate::store::SessionStore;
use crate::tracker::SessionTracker;
use chrono::NaiveDateTime;
use std::sync::Arc;

/// One line of the live session table
#[derive(Debug, Clone, PartialEq)]
pub struct LiveRow {
    pub cycle: CycleId,
    pub student: String,
    pub start: NaiveDateTime,
    /// `None` while the session is still running
    pub end: Option<NaiveDateTime>,
    pub duration_secs: i64,
    pub energy_kwh: f64,
}

impl LiveRow {
    pub fn is_running(&self) -> bool {
        self.end.is_none()
    }
}

/// Delivers reading batches to the matching trackers
#[derive(Clone)]
pub struct ReadingRouter {
    trackers: Vec<Arc<SessionTracker>>,
}

impl ReadingRouter {
    /// Returns how many readings reached a running tracker
    pub fn apply(&self, batch: &ReadingBatch) -> usize {
        let mut applied = 0;
        for (cycle, voltage) in batch.by_cycle() {
            let Some(tracker) = cycle.index().and_then(|i| self.trackers.get(i)) else {
                log::debug!("Reading for {} has no tracker", cycle);
                continue;
            };
            if tracker.is_running() {
                tracker.accumulate(voltage);
                applied += 1;
            }
        }
        applied
    }
}

pub struct Controller {
    router: ReadingRouter,
    store: Box<dyn SessionStore>,
    policy: Box<dyn AccessPolicy>,
    roster: Vec<String>,
    /// Sessions closed since startup or the last reset
    completed: Vec<Session>,
}

impl Controller {
    pub fn new(
        cycle_count: usize,
        model: Arc<dyn EnergyModel>,
        store: Box<dyn SessionStore>,
        policy: Box<dyn AccessPolicy>,
    ) -> Self {
        let trackers = (1..=cycle_count)
            .map(|n| Arc::new(SessionTracker::new(CycleId::new(n), model.clone())))
            .collect();
        let roster = store.list_roster();
        log::info!("Loaded {} students, {} cycles, {} energy model", roster.len(), cycle_count, model.name());

        Self {
            router: ReadingRouter { trackers },
            store,
            policy,
            roster,
            completed: Vec::new(),
        }
    }

    pub fn cycles(&self) -> impl Iterator<Item = CycleId> + '_ {
        self.router.trackers.iter().map(|t| t.cycle())
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn router(&self) -> ReadingRouter {
        self.router.clone()
    }

    /// Re-read the roster from storage
    pub fn refresh_roster(&mut self) {
        self.roster = self.store.list_roster();
    }

    fn tracker(&self, cycle: CycleId) -> Result<Arc<SessionTracker>, ControlError> {
        cycle
            .index()
            .and_then(|i| self.router.trackers.get(i))
            .cloned()
            .ok_or(ControlError::UnknownCycle(cycle))
    }

    pub fn start_session_at(
        &mut self,
        cycle: CycleId,
        student: &str,
        now: NaiveDateTime,
    ) -> Result<(), ControlError> {
        let student = student.trim();
        if student.is_empty() {
            return Err(ControlError::NoStudent);
        }

        let tracker = self.tracker(cycle)?;
        if tracker.is_running() {
            return Err(ControlError::CycleBusy(cycle));
        }
        if let Some(other) = self
            .router
            .trackers
            .iter()
            .find(|t| t.student().as_deref() == Some(student))
        {
            return Err(ControlError::StudentBusy {
                student: student.to_string(),
                cycle: other.cycle(),
            });
        }

        tracker.start_at(student, now)?;
        log::info!("{} started on {}", student, cycle);
        Ok(())
    }

    pub fn start_session(&mut self, cycle: CycleId, student: &str) -> Result<(), ControlError> {
        self.start_session_at(cycle, student, chrono::Local::now().naive_local())
    }

    /// Close and persist the session on `cycle`; `Ok(None)` if it was idle
    pub fn stop_session_at(
        &mut self,
        cycle: CycleId,
        now: NaiveDateTime,
    ) -> Result<Option<Session>, ControlError> {
        let tracker = self.tracker(cycle)?;
        let closed = tracker.stop_at(now, |session| self.store.append(session))?;

        if let Some(session) = &closed {
            log::info!(
                "{} finished on {}: {}s, {:.3} kWh",
                session.student,
                session.cycle,
                session.duration_secs,
                session.energy_kwh
            );
            self.completed.push(session.clone());
        }
        Ok(closed)
    }

    pub fn stop_session(&mut self, cycle: CycleId) -> Result<Option<Session>, ControlError> {
        self.stop_session_at(cycle, chrono::Local::now().naive_local())
    }

    /// Stop every running session, then clear the completed list.
    ///
    /// Every cycle is attempted. If any write fails, that session stays
    /// running, the completed list is kept and the first error is returned.
    pub fn reset_all_at(&mut self, now: NaiveDateTime) -> Result<usize, ControlError> {
        let cycles: Vec<CycleId> = self.cycles().collect();
        let mut stopped = 0;
        let mut first_error = None;

        for cycle in cycles {
            match self.stop_session_at(cycle, now) {
                Ok(Some(_)) => stopped += 1,
                Ok(None) => {}
                Err(e) => {
                    log::error!("Reset could not close {}: {}", cycle, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                self.completed.clear();
                Ok(stopped)
            }
        }
    }

    pub fn reset_all(&mut self) -> Result<usize, ControlError> {
        self.reset_all_at(chrono::Local::now().naive_local())
    }

    pub fn active_count(&self) -> usize {
        self.router.trackers.iter().filter(|t| t.is_running()).count()
    }

    /// Completed sessions first, then every running one
    pub fn live_rows_at(&self, now: NaiveDateTime) -> Vec<LiveRow> {
        let finished = self.completed.iter().map(|s| LiveRow {
            cycle: s.cycle,
            student: s.student.clone(),
            start: s.start,
            end: Some(s.end),
            duration_secs: s.duration_secs,
            energy_kwh: s.energy_kwh,
        });

        let running = self.router.trackers.iter().filter_map(|tracker| {
            let open = tracker.snapshot()?;
            Some(LiveRow {
                cycle: open.cycle,
                student: open.student,
                start: open.start,
                end: None,
                duration_secs: (now - open.start).num_seconds().max(0),
                energy_kwh: tracker.live_estimate_at(now).unwrap_or(0.0),
            })
        });

        finished.chain(running).collect()
    }

    pub fn status_line(&self) -> String {
        format!("Active: {}; Logged: {}", self.active_count(), self.completed.len())
    }

    /// Unlock roster management
    pub fn admin(&mut self, credential: &str) -> Result<RosterAdmin<'_>, ControlError> {
        self.authorize(credential)?;
        Ok(RosterAdmin { controller: self })
    }

    pub fn authorize(&self, credential: &str) -> Result<(), ControlError> {
        if self.policy.authorize(credential) {
            Ok(())
        } else {
            log::warn!("Rejected management credential");
            Err(ControlError::AccessDenied)
        }
    }
}

/// Roster edits, available only after `Controller::admin` succeeds
pub struct RosterAdmin<'a> {
    controller: &'a mut Controller,
}

impl RosterAdmin<'_> {
    pub fn add_student(&mut self, name: &str) -> Result<(), ControlError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControlError::NoStudent);
        }
        if self.controller.roster.iter().any(|n| n == name) {
            return Err(ControlError::DuplicateStudent(name.to_string()));
        }

        let mut updated = self.controller.roster.clone();
        updated.push(name.to_string());
        self.commit(updated)?;
        log::info!("Added {} to the roster", name);
        Ok(())
    }

    pub fn remove_student(&mut self, name: &str) -> Result<(), ControlError> {
        let name = name.trim();
        let Some(position) = self.controller.roster.iter().position(|n| n == name) else {
            return Err(ControlError::UnknownStudent(name.to_string()));
        };

        let mut updated = self.controller.roster.clone();
        updated.remove(position);
        self.commit(updated)?;
        log::info!("Removed {} from the roster", name);
        Ok(())
    }

    /// Persist first so a failed write leaves the in-memory roster alone
    fn commit(&mut self, roster: Vec<String>) -> Result<(), ControlError> {
        self.controller.store.save_roster(&roster)?;
        self.controller.roster = roster;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::SharedPassword;
    use crate::energy::ScaledSum;
    use crate::reading::ChannelReading;
    use crate::store::{open_store, FlatSessionLog, LogLayout, RosterFile};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn at(secs: i64) -> NaiveDateTime {
        chrono::DateTime::from_timestamp(1_714_644_000 + secs, 0)
            .unwrap()
            .naive_utc()
    }

    fn controller_with(store: Box<dyn SessionStore>) -> Controller {
        Controller::new(
            8,
            Arc::new(ScaledSum { divisor: 1000.0 }),
            store,
            Box::new(SharedPassword::new("secret")),
        )
    }

    fn controller(dir: &Path) -> Controller {
        controller_with(open_store(LogLayout::Flat, dir))
    }

    fn readings(pairs: &[(&str, f64)]) -> ReadingBatch {
        ReadingBatch {
            channels: pairs
                .iter()
                .map(|(channel, voltage)| ChannelReading {
                    channel: channel.to_string(),
                    voltage: *voltage,
                })
                .collect(),
        }
    }

    fn c(n: usize) -> CycleId {
        CycleId::new(n)
    }

    #[test]
    fn test_session_lifecycle() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());

        ctl.start_session_at(c(2), "Ada", at(0)).unwrap();
        assert_eq!(ctl.router().apply(&readings(&[("C1", 9.0), ("C2", 600.0), ("C2", 400.0)])), 2);

        let session = ctl.stop_session_at(c(2), at(90)).unwrap().unwrap();
        assert_eq!(session.energy_kwh, 1.0);
        assert_eq!(session.duration_secs, 90);
        assert_eq!(ctl.store().load_all(), vec![session]);
        assert_eq!(ctl.status_line(), "Active: 0; Logged: 1");
    }

    #[test]
    fn test_busy_cycle_is_rejected() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());

        ctl.start_session_at(c(1), "Ada", at(0)).unwrap();
        let err = ctl.start_session_at(c(1), "Grace", at(5)).unwrap_err();
        assert!(matches!(err, ControlError::CycleBusy(cycle) if cycle == c(1)));

        let rows = ctl.live_rows_at(at(10));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student, "Ada");
        assert_eq!(rows[0].start, at(0));
    }

    #[test]
    fn test_student_on_two_cycles_is_rejected() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());

        ctl.start_session_at(c(1), "Ada", at(0)).unwrap();
        let err = ctl.start_session_at(c(3), "Ada", at(5)).unwrap_err();
        assert!(matches!(err, ControlError::StudentBusy { cycle, .. } if cycle == c(1)));
        assert_eq!(ctl.active_count(), 1);
        assert_eq!(ctl.live_rows_at(at(6))[0].cycle, c(1));
    }

    #[test]
    fn test_invalid_start_requests() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());

        assert!(matches!(ctl.start_session_at(c(1), "  ", at(0)), Err(ControlError::NoStudent)));
        assert!(matches!(ctl.start_session_at(c(9), "Ada", at(0)), Err(ControlError::UnknownCycle(_))));
        assert!(matches!(ctl.stop_session_at(c(0), at(0)), Err(ControlError::UnknownCycle(_))));
        assert_eq!(ctl.active_count(), 0);
    }

    #[test]
    fn test_stop_idle_cycle_is_noop() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());
        assert_eq!(ctl.stop_session_at(c(4), at(0)).unwrap(), None);
        assert!(ctl.store().load_all().is_empty());
    }

    #[test]
    fn test_failed_append_keeps_session_running() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("sessions.csv");
        fs::create_dir(&log_path).unwrap();
        let store = FlatSessionLog::new(&log_path, RosterFile::new(dir.path().join("students.csv")));
        let mut ctl = controller_with(Box::new(store));

        ctl.start_session_at(c(1), "Ada", at(0)).unwrap();
        ctl.router().apply(&readings(&[("C1", 250.0)]));

        assert!(matches!(ctl.stop_session_at(c(1), at(30)), Err(ControlError::Store(_))));
        assert_eq!(ctl.active_count(), 1);
        assert_eq!(ctl.live_rows_at(at(31))[0].energy_kwh, 0.25);
        assert_eq!(ctl.status_line(), "Active: 1; Logged: 0");
    }

    #[test]
    fn test_reset_all_persists_and_clears() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());

        ctl.start_session_at(c(1), "Ada", at(0)).unwrap();
        ctl.stop_session_at(c(1), at(10)).unwrap();
        ctl.start_session_at(c(1), "Ada", at(20)).unwrap();
        ctl.start_session_at(c(5), "Grace", at(20)).unwrap();
        assert_eq!(ctl.live_rows_at(at(25)).len(), 3);

        assert_eq!(ctl.reset_all_at(at(40)).unwrap(), 2);
        assert!(ctl.live_rows_at(at(41)).is_empty());
        assert_eq!(ctl.store().load_all().len(), 3);
        assert_eq!(ctl.status_line(), "Active: 0; Logged: 0");
    }

    #[test]
    fn test_live_rows() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());

        ctl.start_session_at(c(1), "Ada", at(0)).unwrap();
        ctl.stop_session_at(c(1), at(60)).unwrap();
        ctl.start_session_at(c(3), "Grace", at(100)).unwrap();
        ctl.router().apply(&readings(&[("C3", 1500.0)]));

        let rows = ctl.live_rows_at(at(130));
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].is_running());
        assert_eq!(rows[0].duration_secs, 60);
        assert!(rows[1].is_running());
        assert_eq!(rows[1].duration_secs, 30);
        assert_eq!(rows[1].energy_kwh, 1.5);
    }

    #[test]
    fn test_router_from_background_thread() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());
        ctl.start_session_at(c(8), "Ada", at(0)).unwrap();

        let router = ctl.router();
        std::thread::spawn(move || {
            for _ in 0..10 {
                router.apply(&readings(&[("C8", 100.0), ("C99", 5.0)]));
            }
        })
        .join()
        .unwrap();

        let session = ctl.stop_session_at(c(8), at(10)).unwrap().unwrap();
        assert_eq!(session.energy_kwh, 1.0);
    }

    #[test]
    fn test_roster_admin_requires_password() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());

        assert!(matches!(ctl.admin("guess"), Err(ControlError::AccessDenied)));

        let mut admin = ctl.admin("secret").unwrap();
        admin.add_student("Ada").unwrap();
        admin.add_student(" Grace ").unwrap();
        assert!(matches!(admin.add_student("Ada"), Err(ControlError::DuplicateStudent(_))));
        assert!(matches!(admin.add_student(""), Err(ControlError::NoStudent)));
        admin.remove_student("Ada").unwrap();
        assert!(matches!(admin.remove_student("Linus"), Err(ControlError::UnknownStudent(_))));

        assert_eq!(ctl.roster(), ["Grace".to_string()]);

        // Persisted, so a fresh controller sees it
        let reopened = controller(dir.path());
        assert_eq!(reopened.roster(), ["Grace".to_string()]);
    }

    #[test]
    fn test_refresh_roster() {
        let dir = tempdir().unwrap();
        let mut ctl = controller(dir.path());
        assert!(ctl.roster().is_empty());

        RosterFile::new(dir.path().join("students.csv"))
            .save(&["Ada".to_string()])
            .unwrap();
        ctl.refresh_roster();
        assert_eq!(ctl.roster(), ["Ada".to_string()]);
    }
}
