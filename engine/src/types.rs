//! Records mirrored from the ledger.

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// An opaque ledger identifier (contract, wallet, candidate or voter).
///
/// Addresses are compared, hashed and ordered without regard to ASCII case, so a
/// checksummed address and its lowercase form are the same [Address].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

/// The address of the connected wallet.
pub type Account = Address;

impl Address {
    /// Wrap a raw identifier, trimming surrounding whitespace.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.len() == raw.len() {
            return Self(raw);
        }
        Self(trimmed.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the address is `0x` followed by 40 hex digits.
    pub fn is_well_formed(&self) -> bool {
        let Some(digits) = self
            .0
            .strip_prefix("0x")
            .or_else(|| self.0.strip_prefix("0X"))
        else {
            return false;
        };
        digits.len() == 40 && digits.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Returns true if the address is the all-zero address (an unset slot on the ledger).
    pub fn is_zero(&self) -> bool {
        self.is_well_formed() && self.0[2..].bytes().all(|b| b == b'0')
    }

    /// Abbreviated form for logs (`0x5FbDB2...180aa3`).
    pub fn short(&self) -> String {
        let chars = self.0.chars().count();
        if chars <= 14 {
            return self.0.clone();
        }
        let head: String = self.0.chars().take(8).collect();
        let tail: String = self.0.chars().skip(chars - 6).collect();
        format!("{head}...{tail}")
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.0.bytes().map(|b| b.to_ascii_lowercase());
        let right = other.0.bytes().map(|b| b.to_ascii_lowercase());
        left.cmp(right)
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// A record identified by its ledger address.
pub trait Keyed {
    fn address(&self) -> &Address;
}

/// A registered candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub age: String,
    pub name: String,
    /// Sequence number assigned by the ledger (not stable across redeploys).
    pub candidate_id: u64,
    pub image_url: String,
    pub vote_count: u64,
    pub metadata_url: String,
    pub address: Address,
}

impl Keyed for Candidate {
    fn address(&self) -> &Address {
        &self.address
    }
}

/// An authorized voter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Voter {
    pub voter_id: u64,
    pub name: String,
    pub image_url: String,
    pub address: Address,
    pub allowed: bool,
    pub voted: bool,
}

impl Keyed for Voter {
    fn address(&self) -> &Address {
        &self.address
    }
}

/// Election window and result as last read from the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElectionState {
    /// Unix seconds at which voting closes (0 when unset).
    pub voting_end_time: u64,
    pub winner_declared: bool,
    pub winner_name: String,
}

impl ElectionState {
    /// Fold a newer ledger reading into this state.
    ///
    /// A declared winner is never undone and a set end time is never unset.
    pub fn merge(&mut self, next: ElectionState) {
        if next.voting_end_time != 0 {
            self.voting_end_time = next.voting_end_time;
        }
        if self.winner_declared && !next.winner_declared {
            return;
        }
        self.winner_declared = next.winner_declared;
        self.winner_name = next.winner_name;
    }
}

/// Administrator input for registering a candidate.
#[derive(Clone, Debug)]
pub struct CandidateForm {
    pub address: Address,
    pub name: String,
    pub age: String,
    pub image_url: String,
}

/// Administrator input for authorizing a voter.
#[derive(Clone, Debug)]
pub struct VoterForm {
    pub address: Address,
    pub name: String,
    pub position: String,
    pub image_url: String,
}

/// Receipt of a confirmed ledger transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub hash: String,
    pub block: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_address_case_insensitive() {
        let lower = Address::from("0xabcdef0000000000000000000000000000000001");
        let mixed = Address::from("0xABCdef0000000000000000000000000000000001");
        assert_eq!(lower, mixed);
        assert_eq!(lower.cmp(&mixed), Ordering::Equal);

        let mut set = HashSet::new();
        set.insert(lower);
        assert!(!set.insert(mixed));
    }

    #[test]
    fn test_address_shape() {
        assert!(Address::from("0x5FbDB2315678afecb367f032d93F642f64180aa3").is_well_formed());
        assert!(!Address::from("0x5FbDB2315678afecb367f032d93F642f64180aa").is_well_formed());
        assert!(!Address::from("5FbDB2315678afecb367f032d93F642f64180aa3").is_well_formed());
        assert!(!Address::from("0xZZbDB2315678afecb367f032d93F642f64180aa3").is_well_formed());
        assert!(Address::from("0x0000000000000000000000000000000000000000").is_zero());
        assert_eq!(Address::from("  0xab  ").as_str(), "0xab");
        assert_eq!(
            Address::from("0x5FbDB2315678afecb367f032d93F642f64180aa3").short(),
            "0x5FbDB2...180aa3"
        );
    }

    #[test]
    fn test_address_short_non_ascii() {
        // Multi-byte characters straddle the byte offsets of the abbreviation
        let address = Address::from("0xé€ü日本語アドレスの末尾ですよ");
        assert_eq!(address.short(), "0xé€ü日本語...の末尾ですよ");
        assert!(!address.is_well_formed());

        let address = Address::from("0x€€€€€€€€€€€€");
        assert_eq!(address.short(), "0x€€€€€€€€€€€€");
    }

    #[test]
    fn test_election_merge_is_monotonic() {
        let mut state = ElectionState::default();
        state.merge(ElectionState {
            voting_end_time: 100,
            winner_declared: true,
            winner_name: "Ada".into(),
        });
        state.merge(ElectionState::default());
        assert_eq!(state.voting_end_time, 100);
        assert!(state.winner_declared);
        assert_eq!(state.winner_name, "Ada");
    }
}
