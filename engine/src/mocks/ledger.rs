//! An in-memory election contract.

use super::{
    ALREADY_DECLARED, ALREADY_REGISTERED, ALREADY_VOTED, NO_RIGHT, ONLY_ORGANIZER,
    UNKNOWN_CANDIDATE, VOTING_ENDED, VOTING_OPEN,
};
use crate::{
    gateway::{methods, normalize, Fault, Receipt, Status, Transport},
    types::{Account, Address},
};
use commonware_runtime::Clock;
use serde_json::{json, Value};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::{Duration, UNIX_EPOCH},
};

struct CandidateEntry {
    age: String,
    name: String,
    candidate_id: u64,
    image: String,
    vote_count: u64,
    ipfs: String,
}

struct VoterEntry {
    voter_id: u64,
    name: String,
    image: String,
    ipfs: String,
    allowed: u64,
    voted: bool,
}

struct Transaction {
    from: Account,
    method: String,
    args: Vec<Value>,
}

#[derive(Default)]
struct Faults {
    /// Every call behaves as if no contract were deployed.
    wrong_contract: bool,
    /// Detail lookups for these addresses fail.
    failing: HashSet<Address>,
    /// View methods answered as if the contract did not implement them.
    broken: HashSet<String>,
    /// Listings repeat every entry.
    duplicate_listings: bool,
    /// Listings contain a null entry.
    null_listings: bool,
    /// The signer declines every transaction.
    reject_signing: bool,
}

#[derive(Default)]
struct State {
    candidate_order: Vec<Address>,
    candidates: HashMap<Address, CandidateEntry>,
    voter_order: Vec<Address>,
    voters: HashMap<Address, VoterEntry>,
    voting_end_time: u64,
    winner_declared: bool,
    winner_name: String,

    pending: HashMap<String, Transaction>,
    nonce: u64,
    block: u64,

    faults: Faults,
    calls: usize,
    submitted: HashMap<String, usize>,
}

/// An in-memory election contract implementing [Transport].
///
/// Every call and confirmation takes `latency` of (runtime) time, so concurrent operations
/// interleave the way they would against a remote node.
#[derive(Clone)]
pub struct Ledger<E: Clock> {
    context: E,
    contract: Address,
    organizer: Account,
    latency: Duration,
    state: Arc<Mutex<State>>,
}

impl<E: Clock> Ledger<E> {
    /// Deploy a contract at `contract`, owned by `organizer`.
    pub fn new(context: E, contract: Address, organizer: Account) -> Self {
        Self {
            context,
            contract,
            organizer,
            latency: Duration::from_millis(50),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Set the simulated round-trip latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn now(&self) -> u64 {
        self.context
            .current()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
    }

    pub fn set_voting_end_time(&self, end: u64) {
        self.state.lock().unwrap().voting_end_time = end;
    }

    /// Behave as if no (or another) contract were deployed at the configured address.
    pub fn set_wrong_contract(&self, enabled: bool) {
        self.state.lock().unwrap().faults.wrong_contract = enabled;
    }

    /// Answer `method` as if the deployed contract did not implement it.
    pub fn break_method(&self, method: &str, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        if enabled {
            state.faults.broken.insert(method.to_string());
        } else {
            state.faults.broken.remove(method);
        }
    }

    /// Fail detail lookups for `address`.
    pub fn fail_lookup(&self, address: Address) {
        self.state.lock().unwrap().faults.failing.insert(address);
    }

    pub fn duplicate_listings(&self, enabled: bool) {
        self.state.lock().unwrap().faults.duplicate_listings = enabled;
    }

    pub fn null_listings(&self, enabled: bool) {
        self.state.lock().unwrap().faults.null_listings = enabled;
    }

    pub fn reject_signing(&self, enabled: bool) {
        self.state.lock().unwrap().faults.reject_signing = enabled;
    }

    /// Mark `winner` as declared without going through a transaction (someone else declared).
    pub fn force_declare(&self, winner: &str) {
        let mut state = self.state.lock().unwrap();
        state.winner_declared = true;
        state.winner_name = winner.to_string();
    }

    /// Number of view calls served.
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// Number of transactions submitted for `method`.
    pub fn submitted(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .submitted
            .get(method)
            .copied()
            .unwrap_or_default()
    }

    /// Current vote count of `candidate` (`None` if not registered).
    pub fn vote_count(&self, candidate: &Address) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .candidates
            .get(candidate)
            .map(|entry| entry.vote_count)
    }

    fn listing(order: &[Address], faults: &Faults) -> Value {
        let mut listed: Vec<Value> = order.iter().map(|address| json!(address)).collect();
        if faults.duplicate_listings {
            listed.extend(order.iter().map(|address| json!(address.as_str().to_lowercase())));
        }
        if faults.null_listings {
            listed.insert(0, Value::Null);
        }
        Value::Array(listed)
    }

    fn view(&self, method: &str, args: &[Value]) -> Result<Value, Fault> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if state.faults.wrong_contract || state.faults.broken.contains(method) {
            return Err(Fault::other(format!(
                "function selector was not recognized: {method}"
            )));
        }
        let subject = || normalize::address(args.first()).unwrap_or_default();
        match method {
            methods::GET_CANDIDATES => Ok(Self::listing(&state.candidate_order, &state.faults)),
            methods::GET_VOTERS => Ok(Self::listing(&state.voter_order, &state.faults)),
            methods::GET_CANDIDATE_DATA => {
                let address = subject();
                if state.faults.failing.contains(&address) {
                    return Err(Fault::other(format!("lookup of {address} timed out")));
                }
                // Unknown addresses read as a zeroed struct
                let Some(entry) = state.candidates.get(&address) else {
                    return Ok(json!(["", "", "0", "", "0", "", format!("0x{:040x}", 0)]));
                };
                Ok(json!([
                    entry.age,
                    entry.name,
                    entry.candidate_id.to_string(),
                    entry.image,
                    entry.vote_count.to_string(),
                    entry.ipfs,
                    address,
                ]))
            }
            methods::GET_VOTER_DATA => {
                let address = subject();
                if state.faults.failing.contains(&address) {
                    return Err(Fault::other(format!("lookup of {address} timed out")));
                }
                let Some(entry) = state.voters.get(&address) else {
                    return Ok(json!({
                        "voterId": "0",
                        "name": "",
                        "image": "",
                        "voterAddress": format!("0x{:040x}", 0),
                        "ipfs": "",
                        "allowed": 0,
                        "voted": false,
                    }));
                };
                Ok(json!({
                    "voterId": entry.voter_id.to_string(),
                    "name": entry.name,
                    "image": entry.image,
                    "voterAddress": address,
                    "ipfs": entry.ipfs,
                    "allowed": entry.allowed,
                    "voted": entry.voted,
                }))
            }
            methods::VOTING_END_TIME => Ok(json!(state.voting_end_time.to_string())),
            methods::WINNER_DECLARED => Ok(json!(state.winner_declared)),
            methods::WINNER_NAME => Ok(json!(state.winner_name)),
            _ => Err(Fault::bad_data(format!(
                "function selector was not recognized: {method}"
            ))),
        }
    }

    fn execute(&self, tx: Transaction) -> Result<(), String> {
        let now = self.now();
        let mut state = self.state.lock().unwrap();
        let text = |index: usize| normalize::text(tx.args.get(index));
        let subject = normalize::address(tx.args.first()).unwrap_or_default();
        match tx.method.as_str() {
            methods::SET_CANDIDATE => {
                if tx.from != self.organizer {
                    return Err(ONLY_ORGANIZER.into());
                }
                if state.candidates.contains_key(&subject) {
                    return Err(ALREADY_REGISTERED.into());
                }
                let entry = CandidateEntry {
                    age: text(1),
                    name: text(2),
                    candidate_id: state.candidate_order.len() as u64,
                    image: text(3),
                    vote_count: 0,
                    ipfs: text(4),
                };
                state.candidate_order.push(subject.clone());
                state.candidates.insert(subject, entry);
            }
            methods::VOTER_RIGHT => {
                if tx.from != self.organizer {
                    return Err(ONLY_ORGANIZER.into());
                }
                if state.voters.contains_key(&subject) {
                    return Err(ALREADY_REGISTERED.into());
                }
                let entry = VoterEntry {
                    voter_id: state.voter_order.len() as u64,
                    name: text(1),
                    image: text(2),
                    ipfs: text(3),
                    allowed: 1,
                    voted: false,
                };
                state.voter_order.push(subject.clone());
                state.voters.insert(subject, entry);
            }
            methods::VOTE => {
                if state.voting_end_time != 0 && now >= state.voting_end_time {
                    return Err(VOTING_ENDED.into());
                }
                match state.voters.get(&tx.from) {
                    None => return Err(NO_RIGHT.into()),
                    Some(voter) if voter.voted => return Err(ALREADY_VOTED.into()),
                    Some(voter) if voter.allowed == 0 => return Err(NO_RIGHT.into()),
                    Some(_) => {}
                }
                let Some(candidate) = state.candidates.get_mut(&subject) else {
                    return Err(UNKNOWN_CANDIDATE.into());
                };
                candidate.vote_count += 1;
                if let Some(voter) = state.voters.get_mut(&tx.from) {
                    voter.voted = true;
                }
            }
            methods::DECLARE_WINNER => {
                if state.winner_declared {
                    return Err(ALREADY_DECLARED.into());
                }
                if state.voting_end_time == 0 || now < state.voting_end_time {
                    return Err(VOTING_OPEN.into());
                }
                // Ties go to the earliest registered candidate
                let mut winner: Option<&CandidateEntry> = None;
                for address in &state.candidate_order {
                    let entry = &state.candidates[address];
                    if winner.is_none_or(|best| entry.vote_count > best.vote_count) {
                        winner = Some(entry);
                    }
                }
                let name = winner
                    .filter(|entry| entry.vote_count > 0)
                    .map(|entry| entry.name.clone())
                    .unwrap_or_default();
                state.winner_declared = true;
                state.winner_name = name;
            }
            other => return Err(format!("unknown method {other}")),
        }
        Ok(())
    }
}

impl<E: Clock> Transport for Ledger<E> {
    async fn call(
        &self,
        contract: &Address,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, Fault> {
        self.context.sleep(self.latency).await;
        if *contract != self.contract {
            return Err(Fault::bad_data(format!(
                "could not decode result data (value=\"0x\", method=\"{method}\")"
            )));
        }
        self.view(method, &args)
    }

    async fn send(
        &self,
        from: &Account,
        contract: &Address,
        method: &str,
        args: Vec<Value>,
    ) -> Result<String, Fault> {
        let mut state = self.state.lock().unwrap();
        if state.faults.reject_signing {
            return Err(Fault::rejected());
        }
        if *contract != self.contract || state.faults.wrong_contract {
            return Err(Fault {
                kind: Some("CALL_EXCEPTION".into()),
                message: "missing revert data".into(),
                data: Some("0x".into()),
                ..Fault::default()
            });
        }
        state.nonce += 1;
        let hash = format!("0x{:064x}", state.nonce);
        *state.submitted.entry(method.to_string()).or_default() += 1;
        state.pending.insert(
            hash.clone(),
            Transaction {
                from: from.clone(),
                method: method.to_string(),
                args,
            },
        );
        Ok(hash)
    }

    async fn confirm(&self, hash: &str) -> Result<Receipt, Fault> {
        self.context.sleep(self.latency).await;
        let tx = self.state.lock().unwrap().pending.remove(hash);
        let Some(tx) = tx else {
            return Err(Fault::other(format!("unknown transaction {hash}")));
        };
        let status = match self.execute(tx) {
            Ok(()) => Status::Success,
            Err(reason) => Status::Reverted(Some(reason)),
        };
        let mut state = self.state.lock().unwrap();
        state.block += 1;
        Ok(Receipt {
            hash: hash.to_string(),
            block: state.block,
            status,
        })
    }
}
