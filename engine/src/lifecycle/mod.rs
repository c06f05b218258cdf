//! Voting window, countdown and winner declaration.
//!
//! # Phases
//!
//! ```txt
//! Open --(now >= voting end time)--> Closed --(winner declared)--> Declared
//! ```
//!
//! The phase is derived from the session's [ElectionState] and the runtime clock whenever it is
//! queried. An unset end time (`0`) keeps the election [Phase::Open].
//!
//! # Declaration
//!
//! Moving from [Phase::Closed] to [Phase::Declared] takes a `declareWinner` transaction. Two
//! triggers can start it: the countdown armed with [Controller::arm] firing at the end time, or
//! an explicit [Controller::declare]. Both acquire the session's declare latch synchronously
//! before the transaction is created, so at most one declaration is submitted per session no
//! matter how the triggers interleave.
//!
//! On success the result is read back from the ledger (never assumed locally) and the latch
//! stays held. On failure the error is recorded and the latch released, unless the ledger
//! reports that a winner was already declared: then the election state is refreshed instead.

mod metrics;

use crate::{
    gateway::{Gateway, Transport},
    session::{Family, Session, Source},
    types::ElectionState,
    Error,
};
use commonware_runtime::{Clock, Metrics as RuntimeMetrics, Spawner};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, UNIX_EPOCH},
};
use tracing::{debug, info, warn};

/// Stage of the election.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Votes are accepted.
    Open,
    /// Voting ended but no winner is declared yet.
    Closed,
    Declared,
}

impl Phase {
    /// Phase of `state` at unix time `now` (seconds).
    pub fn at(state: &ElectionState, now: u64) -> Self {
        if state.winner_declared {
            return Self::Declared;
        }
        if state.voting_end_time == 0 || now < state.voting_end_time {
            return Self::Open;
        }
        Self::Closed
    }
}

/// Returns true if a revert reason says the winner is already declared.
fn already_declared(err: &Error) -> bool {
    let Error::Reverted(reason) = err else {
        return false;
    };
    reason.to_ascii_lowercase().contains("already declared")
}

/// What started a declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trigger {
    Countdown,
    Explicit,
}

/// Drives the election lifecycle of a [Session].
#[derive(Clone)]
pub struct Controller<E: Clock + Spawner + RuntimeMetrics, T: Transport> {
    context: E,
    gateway: Gateway<T>,
    session: Session,

    /// End time the countdown is armed for (0 when unarmed).
    armed: Arc<AtomicU64>,
    metrics: Arc<metrics::Metrics>,
}

impl<E: Clock + Spawner + RuntimeMetrics, T: Transport> Controller<E, T> {
    pub fn new(context: E, gateway: Gateway<T>, session: Session) -> Self {
        let metrics = metrics::Metrics::init(context.clone());
        Self {
            context,
            gateway,
            session,
            armed: Arc::new(AtomicU64::new(0)),
            metrics: Arc::new(metrics),
        }
    }

    /// Current unix time in seconds.
    pub fn now(&self) -> u64 {
        self.context
            .current()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
    }

    pub fn phase(&self) -> Phase {
        Phase::at(&self.session.election(), self.now())
    }

    /// Time left in the voting window (`None` if no window is set or a winner is declared).
    pub fn remaining(&self) -> Option<Duration> {
        let election = self.session.election();
        if election.voting_end_time == 0 || election.winner_declared {
            return None;
        }
        let end = UNIX_EPOCH + Duration::from_secs(election.voting_end_time);
        Some(
            end.duration_since(self.context.current())
                .unwrap_or_default(),
        )
    }

    /// Read the election state from the ledger and merge it into the session.
    pub async fn refresh(&self) -> Result<ElectionState, Error> {
        let next = match self.gateway.election().await {
            Ok(next) => next,
            Err(err) => {
                warn!(?err, "failed to read election state");
                self.session.fail(Family::Read(Source::Election), &err);
                return Err(err);
            }
        };
        let Some(merged) = self.session.merge_election(next.clone()) else {
            return Ok(next);
        };
        self.session.clear(Family::Read(Source::Election));
        debug!(
            end = merged.voting_end_time,
            declared = merged.winner_declared,
            "refreshed election"
        );
        Ok(merged)
    }

    /// Declare the winner on behalf of the connected account.
    ///
    /// Does nothing (returning `false`) unless the session is live, the election is
    /// [Phase::Closed] and no other declaration is in flight.
    pub async fn declare(&self) -> Result<bool, Error> {
        if !self.session.is_live() {
            debug!("ignoring declare: session ended");
            return Ok(false);
        }
        let phase = self.phase();
        if phase != Phase::Closed {
            debug!(?phase, "ignoring declare outside of closed phase");
            return Ok(false);
        }
        self.fire(Trigger::Explicit).await
    }

    /// Arm the single-shot countdown for the current end time.
    ///
    /// Returns false if no end time is set, a winner is already declared, or a countdown is
    /// already armed for this end time.
    pub fn arm(&self) -> bool {
        let election = self.session.election();
        let end = election.voting_end_time;
        if end == 0 || election.winner_declared {
            return false;
        }
        if self.armed.swap(end, Ordering::AcqRel) == end {
            return false;
        }
        self.metrics.countdowns.inc();
        debug!(end, "armed countdown");
        let controller = self.clone();
        self.context
            .with_label("countdown")
            .spawn(move |context| async move {
                context
                    .sleep_until(UNIX_EPOCH + Duration::from_secs(end))
                    .await;
                controller.expired(end).await;
            });
        true
    }

    /// Deliver the expiry of the countdown armed for `end`.
    async fn expired(&self, end: u64) {
        if !self.session.is_live() {
            return;
        }
        let election = self.session.election();
        if election.voting_end_time != end {
            debug!(end, current = election.voting_end_time, "ignoring stale countdown");
            return;
        }
        if self.phase() != Phase::Closed {
            return;
        }
        info!(end, "voting window expired");
        if let Err(err) = self.fire(Trigger::Countdown).await {
            debug!(?err, "declaration on expiry failed");
        }
    }

    async fn fire(&self, trigger: Trigger) -> Result<bool, Error> {
        let Some(account) = self.session.account() else {
            if trigger == Trigger::Countdown {
                debug!("no account to declare with");
                return Ok(false);
            }
            let err = Error::WalletUnavailable;
            self.session.fail(Family::Write, &err);
            return Err(err);
        };
        if !self.session.try_latch() {
            self.metrics.suppressed.inc();
            debug!(?trigger, "declaration already in flight");
            return Ok(false);
        }
        self.metrics.declarations.inc();
        info!(?trigger, account = %account.short(), "declaring winner");
        match self.gateway.declare_winner(&account).await {
            Ok(confirmation) => {
                info!(block = confirmation.block, "winner declared");
                self.session.clear(Family::Write);
                if let Err(err) = self.refresh().await {
                    warn!(?err, "failed to read declared winner");
                }
                Ok(true)
            }
            Err(err) if already_declared(&err) => {
                info!("winner was already declared");
                self.refresh().await?;
                Ok(false)
            }
            Err(err) => {
                warn!(?err, "declaration failed");
                self.session.fail(Family::Write, &err);
                self.session.release_latch();
                Err(err)
            }
        }
    }
}
