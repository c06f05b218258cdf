//! Keep a local view of an election ledger in sync and gate one-time actions on it.
//!
//! # Overview
//!
//! The election itself lives on a remote contract (the ledger): an administrator registers
//! candidates and voters, authorized voters cast one vote each, and a winner is declared once
//! voting closes. The ledger is authoritative but slow, fallible and eventually consistent.
//! This crate keeps a [Session] that mirrors it and decides, from that mirror, what the
//! connected account may do next.
//!
//! The [Engine] composes the following components, each usable on its own:
//!
//! - [gateway::Gateway]: typed reads and confirmed writes against the contract, with failure
//!   classification and normalization of loosely-typed replies.
//! - [roster::Cache]: candidate and voter snapshots, refreshed atomically.
//! - [eligibility::Eligibility]: the connected account's voting state.
//! - [lifecycle::Controller]: voting window, countdown and at-most-once winner declaration.
//! - [connection::Manager]: wallet discovery and authorization.
//! - [upload::Coordinator]: pass-through to the content-addressed upload service.
//!
//! Every failure ends up in the session's single error slot (see [session::Report]) as
//! a human-readable message; none of them panic the engine.
//!
//! # Example
//!
//! ```rust
//! use ballot_engine::{mocks, Address, Engine, Phase};
//! use commonware_runtime::{deterministic, Runner};
//!
//! let executor = deterministic::Runner::default();
//! executor.start(|context| async move {
//!     let organizer = Address::from(mocks::ORGANIZER);
//!     let ledger = mocks::Ledger::new(
//!         context.clone(),
//!         Address::from(mocks::CONTRACT),
//!         organizer.clone(),
//!     );
//!     let wallet = mocks::Wallet::authorized(vec![organizer.to_string()]);
//!     let engine = Engine::new(
//!         context,
//!         &mocks::config(),
//!         ledger,
//!         wallet,
//!         mocks::Endpoint::default(),
//!     );
//!
//!     engine.initialize().await.unwrap();
//!     assert_eq!(engine.account(), Some(organizer));
//!     assert!(engine.candidates().is_empty());
//!     assert_eq!(engine.phase(), Phase::Open);
//! });
//! ```

pub mod config;
pub mod connection;
mod engine;
pub mod eligibility;
pub mod gateway;
pub mod lifecycle;
pub mod mocks;
pub mod roster;
pub mod session;
mod types;
pub mod upload;

pub use config::{Config, ConfigError};
pub use eligibility::Eligibility;
pub use engine::Engine;
pub use lifecycle::Phase;
pub use session::Session;
pub use upload::{Endpoint, HttpEndpoint};
pub use types::{
    Account, Address, Candidate, CandidateForm, Confirmation, ElectionState, Keyed, Voter,
    VoterForm,
};

use thiserror::Error;

/// Errors that can occur when interacting with the ledger, the wallet or the upload service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("no wallet available: install or enable a wallet")]
    WalletUnavailable,
    #[error("contract not deployed or wrong contract: {0}")]
    NotDeployedOrWrongContract(String),
    #[error("request rejected by user")]
    UserRejected,
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("unknown error: {0}")]
    Unknown(String),
}
