//! Derive what the connected account may do from the voter roster.
//!
//! Eligibility is never stored: it is recomputed from the current account and roster snapshot
//! on every query, so it cannot drift from them.

use crate::types::{Account, Address, Candidate, Voter};

/// Voting state of the connected account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Eligibility {
    /// No account is connected.
    Disconnected,
    /// The account is not an allowed voter.
    NotAuthorized,
    /// The account's vote has been recorded.
    AlreadyVoted,
    CanVote,
}

impl Eligibility {
    /// Derive the state of `account` against `voters`.
    ///
    /// Precedence: no account, no matching voter, already voted, allowed. A matching voter that
    /// has not voted and is not allowed is [Eligibility::NotAuthorized].
    pub fn derive(account: Option<&Account>, voters: &[Voter]) -> Self {
        let Some(account) = account else {
            return Self::Disconnected;
        };
        let Some(voter) = voters.iter().find(|voter| voter.address == *account) else {
            return Self::NotAuthorized;
        };
        if voter.voted {
            return Self::AlreadyVoted;
        }
        if voter.allowed {
            return Self::CanVote;
        }
        Self::NotAuthorized
    }

    pub fn can_vote(&self) -> bool {
        *self == Self::CanVote
    }
}

/// Resolve the candidate `account` may vote for right now.
///
/// Returns `None` unless `account` is [Eligibility::CanVote] and `requested` is on the
/// current candidate roster.
pub fn authorize<'a>(
    account: Option<&Account>,
    voters: &[Voter],
    candidates: &'a [Candidate],
    requested: &Address,
) -> Option<&'a Candidate> {
    if !Eligibility::derive(account, voters).can_vote() {
        return None;
    }
    candidates
        .iter()
        .find(|candidate| candidate.address == *requested)
}
