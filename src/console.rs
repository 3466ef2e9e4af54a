//! # Operator Console
//!
//! Line commands typed at the station PC and the text tables printed back.
//! Parsing is separate from execution so it can be tested without a
//! controller.

use crate::controller::LiveRow;
use crate::leaderboard::{BoardQuery, BoardView};
use crate::session::CycleId;
use std::fmt::Write as _;
use std::str::FromStr;

pub const HELP: &str = "\
Commands:
  start <cycle> <student>        begin a session (cycle: 3, C3 or \"Cycle 3\")
  stop <cycle>                   end and log a session
  reset                          stop every session and clear the table
  status                         live session table
  board [student]                leaderboard, or one student's sessions
  students                       list the roster
  refresh                        reload the roster from disk
  admin <password> add <name>    add a student
  admin <password> remove <name> remove a student
  admin <password> device <url>  change the device endpoint
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum AdminAction {
    AddStudent(String),
    RemoveStudent(String),
    SetDevice(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start { cycle: CycleId, student: String },
    Stop(CycleId),
    Reset,
    Status,
    Board(BoardQuery),
    Students,
    Refresh,
    Admin { password: String, action: AdminAction },
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = split_word(line);

        match verb.to_ascii_lowercase().as_str() {
            "start" => {
                let (cycle, student) = split_cycle(rest)?;
                if student.is_empty() {
                    return Err("Select a student".to_string());
                }
                Ok(Command::Start { cycle, student: student.to_string() })
            }
            "stop" => {
                let (cycle, extra) = split_cycle(rest)?;
                if !extra.is_empty() {
                    return Err(format!("Unexpected text after cycle: {:?}", extra));
                }
                Ok(Command::Stop(cycle))
            }
            "reset" => Ok(Command::Reset),
            "status" => Ok(Command::Status),
            "board" | "leaderboard" => Ok(Command::Board(if rest.is_empty() {
                BoardQuery::AllStudents
            } else {
                BoardQuery::Student(rest.to_string())
            })),
            "students" => Ok(Command::Students),
            "refresh" => Ok(Command::Refresh),
            "admin" => parse_admin(rest),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            "" => Err("Empty command".to_string()),
            other => Err(format!("Unknown command {:?}; type help", other)),
        }
    }
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

/// Cycle first, either one token ("3", "C3") or two ("Cycle 3")
fn split_cycle(s: &str) -> Result<(CycleId, &str), String> {
    let (first, rest) = split_word(s);
    if first.eq_ignore_ascii_case("cycle") {
        let (number, rest) = split_word(rest);
        return Ok((number.parse()?, rest));
    }
    if first.is_empty() {
        return Err("Select a bicycle".to_string());
    }
    Ok((first.parse()?, rest))
}

fn parse_admin(s: &str) -> Result<Command, String> {
    let (password, rest) = split_word(s);
    let (action, argument) = split_word(rest);
    if password.is_empty() || argument.is_empty() {
        return Err("Usage: admin <password> add|remove|device <value>".to_string());
    }

    let action = match action {
        "add" => AdminAction::AddStudent(argument.to_string()),
        "remove" => AdminAction::RemoveStudent(argument.to_string()),
        "device" => AdminAction::SetDevice(argument.to_string()),
        other => return Err(format!("Unknown admin action {:?}", other)),
    };
    Ok(Command::Admin { password: password.to_string(), action })
}

const CLOCK: &str = "%H:%M:%S";

pub fn render_live(rows: &[LiveRow], status: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<9} {:<20} {:>8} {:>8} {:>9} {:>9}",
        "Cycle", "Student", "Start", "End", "Duration", "kWh"
    );
    for row in rows {
        let end = row
            .end
            .map(|end| end.format(CLOCK).to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<9} {:<20} {:>8} {:>8} {:>8}s {:>9.3}{}",
            row.cycle.to_string(),
            row.student,
            row.start.format(CLOCK).to_string(),
            end,
            row.duration_secs,
            row.energy_kwh,
            if row.is_running() { "  *" } else { "" }
        );
    }
    out.push_str(status);
    out
}

pub fn render_board(view: &BoardView) -> String {
    let mut out = String::new();
    match view {
        BoardView::Standings(standings) => {
            let _ = writeln!(out, "{:<4} {:<20} {:>18} {:>9}", "#", "Student", "Total Energy (kWh)", "Sessions");
            for (rank, row) in standings.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{:<4} {:<20} {:>18.3} {:>9}",
                    rank + 1,
                    row.student,
                    row.total_energy_kwh,
                    row.session_count
                );
            }
            if standings.is_empty() {
                out.push_str("No sessions logged yet\n");
            }
        }
        BoardView::Detail { student, rows } => {
            let _ = writeln!(out, "{}", student);
            let _ = writeln!(
                out,
                "{:<9} {:>8} {:>8} {:>12} {:>12}",
                "Cycle", "Start", "End", "Duration (s)", "Energy (kWh)"
            );
            for row in rows {
                let _ = writeln!(
                    out,
                    "{:<9} {:>8} {:>8} {:>12} {:>12.3}",
                    row.cycle.to_string(),
                    row.start.format(CLOCK).to_string(),
                    row.end.format(CLOCK).to_string(),
                    row.duration_secs,
                    row.energy_kwh
                );
            }
            if rows.is_empty() {
                out.push_str("No sessions for this student\n");
            }
        }
    }
    out
}
