//! Session-scoped state shared by every component.
//!
//! A [Session] is created once per connected client and handed (by clone) to each component
//! that reads or writes it. All mutation happens in short critical sections that are never
//! held across an `.await`, so a reader observes either the previous or the next snapshot of a
//! roster, never a partially built one.
//!
//! Calling [Session::end] tears the session down: results of operations still in flight are
//! discarded when they complete instead of being applied.

use crate::{
    types::{Account, Candidate, ElectionState, Voter},
    Error,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Message reported when the wallet exposes no authorized account.
pub const NO_ACCOUNT: &str = "No Account Found";

/// What a [Family::Read] report was produced by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    /// The ledger binding (contract address and interface).
    Config,
    Candidates,
    Voters,
    Election,
}

/// Operation family that produced a [Report].
///
/// Reads carry their [Source]: a successful refresh of one source never clears a report
/// raised by another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    Connection,
    Read(Source),
    Write,
    Upload,
}

/// How the UI should present a [Report].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Informational (not an error banner).
    Info,
    Error,
}

/// The single, most recent error visible to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub family: Family,
    pub severity: Severity,
    pub message: String,
}

impl Report {
    pub fn is_informational(&self) -> bool {
        self.severity == Severity::Info
    }
}

/// An immutable roster snapshot.
#[derive(Clone, Debug)]
struct Snapshot<T> {
    entries: Arc<Vec<T>>,
    fetch_failed: bool,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Vec::new()),
            fetch_failed: false,
        }
    }
}

#[derive(Default)]
struct State {
    ended: bool,
    account: Option<Account>,
    candidates: Snapshot<Candidate>,
    voters: Snapshot<Voter>,
    election: ElectionState,
    report: Option<Report>,
}

/// Handle to the state of one client session.
#[derive(Clone, Default)]
pub struct Session {
    state: Arc<Mutex<State>>,

    /// Set while a winner declaration is in flight (or after it succeeded).
    latch: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` if the session has not ended.
    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> Option<R> {
        let mut state = self.state.lock().unwrap();
        if state.ended {
            return None;
        }
        Some(f(&mut state))
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let state = self.state.lock().unwrap();
        f(&state)
    }

    /// Discard the session. Later updates are ignored.
    pub fn end(&self) {
        self.state.lock().unwrap().ended = true;
    }

    pub fn is_live(&self) -> bool {
        self.read(|state| !state.ended)
    }

    pub fn account(&self) -> Option<Account> {
        self.read(|state| state.account.clone())
    }

    /// Record the connected account. Returns false if the session has ended.
    pub fn set_account(&self, account: Account) -> bool {
        self.update(|state| state.account = Some(account)).is_some()
    }

    pub fn candidates(&self) -> Arc<Vec<Candidate>> {
        self.read(|state| state.candidates.entries.clone())
    }

    pub fn voters(&self) -> Arc<Vec<Voter>> {
        self.read(|state| state.voters.entries.clone())
    }

    /// Returns true if the last candidate refresh could not reach the contract.
    pub fn candidates_fetch_failed(&self) -> bool {
        self.read(|state| state.candidates.fetch_failed)
    }

    /// Returns true if the last voter refresh could not reach the contract.
    pub fn voters_fetch_failed(&self) -> bool {
        self.read(|state| state.voters.fetch_failed)
    }

    /// Atomically replace the candidate snapshot. Returns false if the session has ended.
    pub fn replace_candidates(&self, entries: Vec<Candidate>, fetch_failed: bool) -> bool {
        self.update(|state| {
            state.candidates = Snapshot {
                entries: Arc::new(entries),
                fetch_failed,
            }
        })
        .is_some()
    }

    /// Atomically replace the voter snapshot. Returns false if the session has ended.
    pub fn replace_voters(&self, entries: Vec<Voter>, fetch_failed: bool) -> bool {
        self.update(|state| {
            state.voters = Snapshot {
                entries: Arc::new(entries),
                fetch_failed,
            }
        })
        .is_some()
    }

    pub fn election(&self) -> ElectionState {
        self.read(|state| state.election.clone())
    }

    /// Merge a ledger reading of the election state (see [ElectionState::merge]).
    pub fn merge_election(&self, next: ElectionState) -> Option<ElectionState> {
        self.update(|state| {
            state.election.merge(next);
            state.election.clone()
        })
    }

    /// The current report, if any.
    pub fn report(&self) -> Option<Report> {
        self.read(|state| state.report.clone())
    }

    /// Overwrite the current report with `error`.
    pub fn fail(&self, family: Family, error: &Error) {
        self.update(|state| {
            state.report = Some(Report {
                family,
                severity: Severity::Error,
                message: error.to_string(),
            })
        });
    }

    /// Overwrite the current report with an informational message.
    pub fn notice(&self, family: Family, message: &str) {
        self.update(|state| {
            state.report = Some(Report {
                family,
                severity: Severity::Info,
                message: message.to_string(),
            })
        });
    }

    /// Clear the current report if it was produced by `family`.
    pub fn clear(&self, family: Family) {
        self.update(|state| {
            if state
                .report
                .as_ref()
                .is_some_and(|report| report.family == family)
            {
                state.report = None;
            }
        });
    }

    /// Clear the current report regardless of its family.
    pub fn clear_all(&self) {
        self.update(|state| state.report = None);
    }

    /// Acquire the declare latch. Returns false if it is already held.
    pub fn try_latch(&self) -> bool {
        self.latch
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release_latch(&self) {
        self.latch.store(false, Ordering::Release);
    }

    pub fn latched(&self) -> bool {
        self.latch.load(Ordering::Acquire)
    }
}
