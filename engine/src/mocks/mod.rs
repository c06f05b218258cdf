//! In-memory stand-ins for the ledger, the wallet and the upload service.
//!
//! Used by the tests in this crate and by the simulator. Each mock supports fault
//! injection for the failure modes the engine must survive.

mod endpoint;
pub use endpoint::Endpoint;
mod ledger;
pub use ledger::Ledger;
mod wallet;
pub use wallet::Wallet;

use crate::{
    config::Config,
    gateway::methods,
    types::{Address, CandidateForm, VoterForm},
};
use serde_json::json;

/// Address the mock contract is deployed at.
pub const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

/// Account that deployed the mock contract.
pub const ORGANIZER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// Gateway prefix of URLs returned by the mock upload endpoint.
pub const GATEWAY: &str = "https://gateway.pinata.cloud/ipfs/";

pub const ONLY_ORGANIZER: &str = "Only organizer can perform this action";
pub const ALREADY_REGISTERED: &str = "Address already registered";
pub const NO_RIGHT: &str = "You have no right to vote";
pub const ALREADY_VOTED: &str = "You have already voted";
pub const UNKNOWN_CANDIDATE: &str = "Candidate does not exist";
pub const VOTING_ENDED: &str = "Voting has ended";
pub const VOTING_OPEN: &str = "Voting has not ended yet";
pub const ALREADY_DECLARED: &str = "Winner already declared";

/// Deterministic address for participant `index` (never the zero address).
pub fn address(index: u64) -> Address {
    Address::new(format!("0x{:040x}", 0x1000 + index))
}

/// Interface descriptor (bare ABI) of the mock contract.
pub fn interface() -> String {
    let function = |name: &str, inputs: &[&str], mutability: &str| {
        json!({
            "type": "function",
            "name": name,
            "inputs": inputs
                .iter()
                .map(|kind| json!({"name": "", "type": kind}))
                .collect::<Vec<_>>(),
            "stateMutability": mutability,
        })
    };
    json!([
        function(methods::GET_CANDIDATES, &[], "view"),
        function(methods::GET_CANDIDATE_DATA, &["address"], "view"),
        function(methods::GET_VOTERS, &[], "view"),
        function(methods::GET_VOTER_DATA, &["address"], "view"),
        function(methods::VOTING_END_TIME, &[], "view"),
        function(methods::WINNER_DECLARED, &[], "view"),
        function(methods::WINNER_NAME, &[], "view"),
        function(
            methods::SET_CANDIDATE,
            &["address", "string", "string", "string", "string"],
            "nonpayable"
        ),
        function(
            methods::VOTER_RIGHT,
            &["address", "string", "string", "string"],
            "nonpayable"
        ),
        function(methods::VOTE, &["address", "uint256"], "nonpayable"),
        function(methods::DECLARE_WINNER, &[], "nonpayable"),
        {"type": "event", "name": "Voted", "inputs": []},
    ])
    .to_string()
}

/// Configuration bound to the mock contract.
pub fn config() -> Config {
    Config {
        contract: Some(CONTRACT.to_string()),
        interface: Some(interface()),
        upload: None,
    }
}

/// Registration form for candidate `index`.
pub fn candidate_form(index: u64, name: &str) -> CandidateForm {
    CandidateForm {
        address: address(index),
        name: name.to_string(),
        age: (30 + index).to_string(),
        image_url: format!("{GATEWAY}candidate-{index}"),
    }
}

/// Authorization form for voter `index`.
pub fn voter_form(index: u64, name: &str) -> VoterForm {
    VoterForm {
        address: address(index),
        name: name.to_string(),
        position: "member".to_string(),
        image_url: format!("{GATEWAY}voter-{index}"),
    }
}
