//! Turn loosely-typed ledger replies into strictly-typed records.
//!
//! Depending on the client stack, the same contract reply may arrive as a positional tuple
//! (`["42", "Ada", ...]`) or as an object with named fields, and integers may arrive as JSON
//! numbers, decimal strings or `0x`-prefixed hex strings. All guessing about reply shapes
//! lives here; nothing else in the crate inspects raw replies.

use crate::types::{Address, Candidate, ElectionState, Voter};
use serde_json::Value;
use tracing::debug;

/// Positions of [Candidate] fields in a tuple reply.
mod candidate_index {
    pub const AGE: usize = 0;
    pub const NAME: usize = 1;
    pub const ID: usize = 2;
    pub const IMAGE: usize = 3;
    pub const VOTE_COUNT: usize = 4;
    pub const METADATA: usize = 5;
    pub const ADDRESS: usize = 6;
}

/// Positions of [Voter] fields in a tuple reply.
mod voter_index {
    pub const ID: usize = 0;
    pub const NAME: usize = 1;
    pub const IMAGE: usize = 2;
    pub const ADDRESS: usize = 3;
    pub const ALLOWED: usize = 5;
    pub const VOTED: usize = 6;
}

/// Look up a field by tuple position or by any of its known names.
fn field<'a>(raw: &'a Value, index: usize, names: &[&str]) -> Option<&'a Value> {
    let found = match raw {
        Value::Array(items) => items.get(index),
        Value::Object(map) => names.iter().find_map(|name| map.get(*name)),
        _ => None,
    };
    found.filter(|value| !value.is_null())
}

/// Parse an unsigned integer, treating anything negative or unparseable as 0.
pub fn uint(raw: Option<&Value>) -> u64 {
    let Some(raw) = raw else {
        return 0;
    };
    let parsed = match raw {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) if !hex.is_empty() => u64::from_str_radix(hex, 16).ok(),
                Some(_) => Some(0),
                None => s.parse::<u64>().ok(),
            }
        }
        Value::Bool(b) => Some(*b as u64),
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        debug!(?raw, "unparseable integer: using 0");
        0
    })
}

/// Render a scalar as text (numbers in decimal, null as empty).
pub fn text(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Interpret a boolean-like flag (`true`, `1`, `"1"`, `"true"`, ...).
pub fn flag(raw: Option<&Value>) -> bool {
    match raw {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f > 0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false") || s == "0x0")
        }
        _ => false,
    }
}

/// Extract an address, rejecting non-strings, empty and all-zero values.
pub fn address(raw: Option<&Value>) -> Option<Address> {
    let address = Address::new(raw?.as_str()?);
    if address.is_empty() || address.is_zero() {
        return None;
    }
    Some(address)
}

/// Normalize an address listing.
///
/// Returns `None` if the reply is not a list at all (the contract at the configured
/// address does not speak this interface). Null and empty entries are skipped.
pub fn addresses(raw: &Value) -> Option<Vec<Address>> {
    let Value::Array(items) = raw else {
        return None;
    };
    Some(
        items
            .iter()
            .filter(|item| !item.is_null())
            .filter_map(|item| address(Some(item)))
            .collect(),
    )
}

/// Normalize a candidate reply. Returns `None` for null replies and replies without an address.
pub fn candidate(raw: &Value) -> Option<Candidate> {
    use candidate_index::*;
    if !matches!(raw, Value::Array(_) | Value::Object(_)) {
        return None;
    }
    let address = address(field(raw, ADDRESS, &["_address", "address", "candidateAddress"]))?;
    Some(Candidate {
        age: text(field(raw, AGE, &["age"])),
        name: text(field(raw, NAME, &["name"])),
        candidate_id: uint(field(raw, ID, &["candidateId", "candidate_id"])),
        image_url: text(field(raw, IMAGE, &["image", "imageUrl"])),
        vote_count: uint(field(raw, VOTE_COUNT, &["voteCount", "vote_count"])),
        metadata_url: text(field(raw, METADATA, &["ipfs", "metadataUrl"])),
        address,
    })
}

/// Normalize a voter reply. Returns `None` for null replies and replies without an address.
pub fn voter(raw: &Value) -> Option<Voter> {
    use voter_index::*;
    if !matches!(raw, Value::Array(_) | Value::Object(_)) {
        return None;
    }
    let address = address(field(
        raw,
        ADDRESS,
        &["voterAddress", "voter_address", "_address", "address"],
    ))?;
    Some(Voter {
        voter_id: uint(field(raw, ID, &["voterId", "voter_voterId"])),
        name: text(field(raw, NAME, &["name", "voter_name"])),
        image_url: text(field(raw, IMAGE, &["image", "voter_image"])),
        address,
        allowed: flag(field(raw, ALLOWED, &["allowed", "voter_allowed"])),
        voted: flag(field(raw, VOTED, &["voted", "voter_voted"])),
    })
}

/// Assemble the election state from its three scalar replies.
pub fn election(end: &Value, declared: &Value, winner: &Value) -> ElectionState {
    ElectionState {
        voting_end_time: uint(Some(end)),
        winner_declared: flag(Some(declared)),
        winner_name: text(Some(winner)).trim().to_string(),
    }
}
