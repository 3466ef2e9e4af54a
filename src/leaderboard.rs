//! # Leaderboard
//!
//! Aggregates the persisted session log into standings, or lists one
//! student's sessions. Computed on demand from the store; nothing cached.

use crate::session::{CycleId, Session};
use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashMap};

/// One leaderboard row
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub student: String,
    pub total_energy_kwh: f64,
    pub session_count: usize,
}

/// One row of a student's session history
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRow {
    pub cycle: CycleId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_secs: i64,
    pub energy_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardQuery {
    AllStudents,
    Student(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoardView {
    Standings(Vec<Standing>),
    Detail { student: String, rows: Vec<DetailRow> },
}

/// Totals per student, highest energy first.
///
/// Every roster student appears, even with no sessions. Students found only
/// in the log follow the roster in first-seen order. Ties keep that order.
pub fn standings(sessions: &[Session], roster: &[String]) -> Vec<Standing> {
    let mut order: Vec<&str> = Vec::with_capacity(roster.len());
    let mut totals: HashMap<&str, (f64, usize)> = HashMap::new();

    for name in roster {
        if totals.insert(name.as_str(), (0.0, 0)).is_none() {
            order.push(name.as_str());
        }
    }

    for session in sessions {
        let entry = totals.entry(session.student.as_str()).or_insert_with(|| {
            order.push(session.student.as_str());
            (0.0, 0)
        });
        entry.0 += session.energy_kwh;
        entry.1 += 1;
    }

    let mut rows: Vec<Standing> = order
        .into_iter()
        .map(|name| {
            let (total, count) = totals[name];
            Standing {
                student: name.to_string(),
                total_energy_kwh: total,
                session_count: count,
            }
        })
        .collect();

    // sort_by is stable, so equal totals keep roster order
    rows.sort_by(|a, b| b.total_energy_kwh.total_cmp(&a.total_energy_kwh));
    rows
}

/// One student's sessions in log order
pub fn session_detail(sessions: &[Session], student: &str) -> Vec<DetailRow> {
    sessions
        .iter()
        .filter(|s| s.student == student)
        .map(|s| DetailRow {
            cycle: s.cycle,
            start: s.start,
            end: s.end,
            duration_secs: s.elapsed_secs(),
            energy_kwh: s.energy_kwh,
        })
        .collect()
}

/// Names with at least one logged session, sorted, for the student filter
pub fn students_with_history(sessions: &[Session]) -> Vec<String> {
    sessions
        .iter()
        .map(|s| s.student.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Build the requested view from one load of the log
pub fn query(sessions: &[Session], roster: &[String], query: &BoardQuery) -> BoardView {
    match query {
        BoardQuery::AllStudents => BoardView::Standings(standings(sessions, roster)),
        BoardQuery::Student(student) => BoardView::Detail {
            student: student.clone(),
            rows: session_detail(sessions, student),
        },
    }
}
