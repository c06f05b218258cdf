//! Typed access to the election contract.
//!
//! # Overview
//!
//! The [Gateway] wraps a [Transport] (the JSON-RPC client, wallet signer or an in-memory
//! [crate::mocks::Ledger]) and exposes the contract's entry points as typed operations:
//!
//! - [Gateway::read] calls a view method and returns its raw reply.
//! - [Gateway::write] submits a transaction and suspends until the ledger confirms or rejects
//!   it. It never returns on submission alone.
//!
//! Both check the configured [Binding] first and fail with [ConfigError] (never retried) if the
//! contract address or interface is missing or malformed, or if the method is not part of the
//! interface.
//!
//! # Failure Classification
//!
//! Transport failures arrive as a loosely structured [Fault] and are classified into:
//!
//! - [Error::NotDeployedOrWrongContract]: empty or undecodable reply, unknown selector, or a call
//!   exception without revert data.
//! - [Error::UserRejected]: the signer declined (EIP-1193 code 4001 or `ACTION_REJECTED`).
//! - [Error::Reverted]: the contract rejected the call, with its reason verbatim.
//! - [Error::WalletUnavailable]: the transport has no signer for writes.
//! - [Error::Unknown]: everything else.
//!
//! The gateway holds no cache: every call goes to the ledger.

mod metrics;
pub mod normalize;

use crate::{
    config::{Binding, Config, ConfigError},
    types::{
        Account, Address, Candidate, CandidateForm, Confirmation, ElectionState, Voter, VoterForm,
    },
    Error,
};
use commonware_runtime::Metrics as RuntimeMetrics;
use futures::try_join;
use serde_json::{json, Value};
use std::{future::Future, sync::Arc};
use tracing::{debug, warn};

/// Contract entry points.
pub mod methods {
    pub const GET_CANDIDATES: &str = "getCandidate";
    pub const GET_CANDIDATE_DATA: &str = "getCandidateData";
    pub const GET_VOTERS: &str = "getVoterList";
    pub const GET_VOTER_DATA: &str = "getVoterData";
    pub const VOTING_END_TIME: &str = "votingEndTime";
    pub const WINNER_DECLARED: &str = "winnerDeclared";
    pub const WINNER_NAME: &str = "winnerName";
    pub const SET_CANDIDATE: &str = "setCandidate";
    pub const VOTER_RIGHT: &str = "voterRight";
    pub const VOTE: &str = "vote";
    pub const DECLARE_WINNER: &str = "declareWinner";
}

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

/// Failure reported by a [Transport], before classification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fault {
    /// Numeric provider code, if any.
    pub code: Option<i64>,
    /// Symbolic client code (e.g. `CALL_EXCEPTION`, `BAD_DATA`), if any.
    pub kind: Option<String>,
    pub message: String,
    /// Decoded revert reason, if any.
    pub reason: Option<String>,
    /// Raw revert data, if any.
    pub data: Option<String>,
}

impl Fault {
    fn with_kind(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            message: message.into(),
            ..Self::default()
        }
    }

    /// The signer declined the request.
    pub fn rejected() -> Self {
        Self {
            code: Some(USER_REJECTED_CODE),
            ..Self::with_kind("ACTION_REJECTED", "user rejected action")
        }
    }

    /// The reply could not be decoded.
    pub fn bad_data(message: impl Into<String>) -> Self {
        Self::with_kind("BAD_DATA", message)
    }

    /// The contract rejected the call with `reason`.
    pub fn revert(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            reason: Some(reason.clone()),
            ..Self::with_kind("CALL_EXCEPTION", format!("execution reverted: {reason}"))
        }
    }

    /// The transport cannot sign.
    pub fn no_signer() -> Self {
        Self::with_kind(
            "UNSUPPORTED_OPERATION",
            "contract runner does not support sending transactions",
        )
    }

    /// Any other failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Outcome recorded in a transaction receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    Reverted(Option<String>),
}

/// A transaction receipt as returned by the [Transport].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub hash: String,
    pub block: u64,
    pub status: Status,
}

/// Connection to the ledger.
pub trait Transport: Clone + Send + Sync + 'static {
    /// Call a view method on `contract`.
    fn call(
        &self,
        contract: &Address,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value, Fault>> + Send;

    /// Sign and submit a transaction from `from`, returning its hash.
    fn send(
        &self,
        from: &Account,
        contract: &Address,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<String, Fault>> + Send;

    /// Wait until the transaction `hash` is included and return its receipt.
    fn confirm(&self, hash: &str) -> impl Future<Output = Result<Receipt, Fault>> + Send;
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let haystack = haystack.to_ascii_lowercase();
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify a transport failure.
pub fn classify(fault: Fault) -> Error {
    let kind = fault.kind.as_deref().unwrap_or_default();
    if fault.code == Some(USER_REJECTED_CODE)
        || kind == "ACTION_REJECTED"
        || contains_any(&fault.message, &["user rejected", "user denied"])
    {
        return Error::UserRejected;
    }
    if kind == "UNSUPPORTED_OPERATION" {
        return Error::WalletUnavailable;
    }
    if kind == "BAD_DATA"
        || contains_any(
            &fault.message,
            &[
                "could not decode result data",
                "function selector was not recognized",
                "returned no data",
            ],
        )
    {
        return Error::NotDeployedOrWrongContract(fault.message);
    }
    if let Some(reason) = fault.reason {
        return Error::Reverted(reason);
    }
    if kind == "CALL_EXCEPTION" {
        let no_data = fault.data.as_deref().is_none_or(|data| data == "0x");
        if no_data && contains_any(&fault.message, &["missing revert data"]) {
            return Error::NotDeployedOrWrongContract(fault.message);
        }
        return Error::Reverted(fault.message);
    }
    Error::Unknown(fault.message)
}

/// Returns true if a reply carries no data at all.
fn is_empty(reply: &Value) -> bool {
    match reply {
        Value::Null => true,
        Value::String(s) => s == "0x",
        _ => false,
    }
}

/// Typed access to the election contract.
#[derive(Clone)]
pub struct Gateway<T: Transport> {
    transport: T,
    binding: Result<Arc<Binding>, ConfigError>,
    metrics: Arc<metrics::Metrics>,
}

impl<T: Transport> Gateway<T> {
    /// Create a new gateway.
    ///
    /// An invalid configuration does not fail here: it is reported by every call instead.
    pub fn new(context: impl RuntimeMetrics, transport: T, config: &Config) -> Self {
        let binding = config.binding().map(Arc::new);
        if let Err(err) = &binding {
            warn!(?err, "ledger binding is invalid");
        }
        Self {
            transport,
            binding,
            metrics: Arc::new(metrics::Metrics::init(context)),
        }
    }

    fn binding(&self, method: &str, arity: usize) -> Result<&Binding, Error> {
        let binding = self
            .binding
            .as_deref()
            .map_err(|err| Error::Config(err.clone()))?;
        binding.interface.check(method, arity)?;
        Ok(binding)
    }

    /// Ensure the configured binding is usable.
    pub fn validate(&self) -> Result<(), Error> {
        self.binding
            .as_ref()
            .map(|_| ())
            .map_err(|err| Error::Config(err.clone()))
    }

    /// Call a view method and return its raw reply.
    pub async fn read(&self, method: &str, args: Vec<Value>) -> Result<Value, Error> {
        let binding = self.binding(method, args.len())?;
        self.metrics.reads.inc();
        let reply = match self.transport.call(&binding.contract, method, args).await {
            Ok(reply) => reply,
            Err(fault) => {
                self.metrics.read_failures.inc();
                let err = classify(fault);
                debug!(method, ?err, "read failed");
                return Err(err);
            }
        };
        if is_empty(&reply) {
            self.metrics.read_failures.inc();
            return Err(Error::NotDeployedOrWrongContract(format!(
                "empty reply from {method}"
            )));
        }
        Ok(reply)
    }

    /// Submit a transaction and wait for the ledger to confirm it.
    pub async fn write(
        &self,
        from: &Account,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Confirmation, Error> {
        let binding = self.binding(method, args.len())?;
        self.metrics.writes.inc();
        let result = self.submit(binding, from, method, args).await;
        if let Err(err) = &result {
            self.metrics.write_failures.inc();
            debug!(method, ?err, "write failed");
        }
        result
    }

    async fn submit(
        &self,
        binding: &Binding,
        from: &Account,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Confirmation, Error> {
        let hash = self
            .transport
            .send(from, &binding.contract, method, args)
            .await
            .map_err(classify)?;
        debug!(method, %hash, "submitted");
        let receipt = self.transport.confirm(&hash).await.map_err(classify)?;
        match receipt.status {
            Status::Success => {
                debug!(method, %hash, block = receipt.block, "confirmed");
                Ok(Confirmation {
                    hash: receipt.hash,
                    block: receipt.block,
                })
            }
            Status::Reverted(reason) => Err(Error::Reverted(
                reason.unwrap_or_else(|| "transaction failed".to_string()),
            )),
        }
    }

    async fn listing(&self, method: &str) -> Result<Vec<Address>, Error> {
        let reply = self.read(method, Vec::new()).await?;
        normalize::addresses(&reply).ok_or_else(|| {
            Error::NotDeployedOrWrongContract(format!("malformed reply from {method}"))
        })
    }

    /// Addresses of all registered candidates, in ledger order.
    pub async fn candidate_addresses(&self) -> Result<Vec<Address>, Error> {
        self.listing(methods::GET_CANDIDATES).await
    }

    /// Addresses of all authorized voters, in ledger order.
    pub async fn voter_addresses(&self) -> Result<Vec<Address>, Error> {
        self.listing(methods::GET_VOTERS).await
    }

    /// Details of one candidate (`None` if the reply does not describe one).
    pub async fn candidate(&self, address: &Address) -> Result<Option<Candidate>, Error> {
        let reply = self
            .read(methods::GET_CANDIDATE_DATA, vec![json!(address)])
            .await?;
        Ok(normalize::candidate(&reply))
    }

    /// Details of one voter (`None` if the reply does not describe one).
    pub async fn voter(&self, address: &Address) -> Result<Option<Voter>, Error> {
        let reply = self
            .read(methods::GET_VOTER_DATA, vec![json!(address)])
            .await?;
        Ok(normalize::voter(&reply))
    }

    /// Voting window and result.
    pub async fn election(&self) -> Result<ElectionState, Error> {
        let (end, declared, winner) = try_join!(
            self.read(methods::VOTING_END_TIME, Vec::new()),
            self.read(methods::WINNER_DECLARED, Vec::new()),
            self.read(methods::WINNER_NAME, Vec::new()),
        )?;
        Ok(normalize::election(&end, &declared, &winner))
    }

    /// Cast `from`'s vote for `candidate`.
    pub async fn vote(
        &self,
        from: &Account,
        candidate: &Candidate,
    ) -> Result<Confirmation, Error> {
        self.write(
            from,
            methods::VOTE,
            vec![json!(candidate.address), json!(candidate.candidate_id)],
        )
        .await
    }

    /// Register a candidate whose metadata document lives at `metadata_url`.
    pub async fn register_candidate(
        &self,
        from: &Account,
        form: &CandidateForm,
        metadata_url: &str,
    ) -> Result<Confirmation, Error> {
        self.write(
            from,
            methods::SET_CANDIDATE,
            vec![
                json!(form.address),
                json!(form.age),
                json!(form.name),
                json!(form.image_url),
                json!(metadata_url),
            ],
        )
        .await
    }

    /// Grant a voter the right to vote.
    pub async fn authorize_voter(
        &self,
        from: &Account,
        form: &VoterForm,
        metadata_url: &str,
    ) -> Result<Confirmation, Error> {
        self.write(
            from,
            methods::VOTER_RIGHT,
            vec![
                json!(form.address),
                json!(form.name),
                json!(form.image_url),
                json!(metadata_url),
            ],
        )
        .await
    }

    /// Ask the ledger to compute and record the winner.
    pub async fn declare_winner(&self, from: &Account) -> Result<Confirmation, Error> {
        self.write(from, methods::DECLARE_WINNER, Vec::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};

    #[test]
    fn test_classify() {
        assert_eq!(classify(Fault::rejected()), Error::UserRejected);
        assert_eq!(
            classify(Fault::other("MetaMask Tx Signature: User denied transaction signature.")),
            Error::UserRejected
        );
        assert_eq!(classify(Fault::no_signer()), Error::WalletUnavailable);
        assert!(matches!(
            classify(Fault::bad_data("could not decode result data (value=\"0x\")")),
            Error::NotDeployedOrWrongContract(_)
        ));
        assert!(matches!(
            classify(Fault::other("function selector was not recognized")),
            Error::NotDeployedOrWrongContract(_)
        ));
        assert_eq!(
            classify(Fault::revert("You have already voted")),
            Error::Reverted("You have already voted".into())
        );
        let missing = Fault {
            kind: Some("CALL_EXCEPTION".into()),
            message: "missing revert data".into(),
            data: Some("0x".into()),
            ..Fault::default()
        };
        assert!(matches!(
            classify(missing),
            Error::NotDeployedOrWrongContract(_)
        ));
        assert_eq!(
            classify(Fault::other("socket hang up")),
            Error::Unknown("socket hang up".into())
        );
    }

    #[test_traced]
    fn test_unconfigured_fails_fast() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let ledger = mocks::Ledger::new(
                context.clone(),
                Address::from(mocks::CONTRACT),
                Address::from(mocks::ORGANIZER),
            );
            let mut config = mocks::config();
            config.interface = None;
            let gateway = Gateway::new(context.with_label("gateway"), ledger.clone(), &config);

            let result = gateway.candidate_addresses().await;
            assert_eq!(result, Err(Error::Config(ConfigError::MissingInterface)));
            assert_eq!(ledger.calls(), 0);
        });
    }

    #[test_traced]
    fn test_unknown_method_fails_fast() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let ledger = mocks::Ledger::new(
                context.clone(),
                Address::from(mocks::CONTRACT),
                Address::from(mocks::ORGANIZER),
            );
            let gateway =
                Gateway::new(context.with_label("gateway"), ledger.clone(), &mocks::config());

            let result = gateway.read("totalSupply", Vec::new()).await;
            assert_eq!(
                result,
                Err(Error::Config(ConfigError::UnknownMethod("totalSupply".into())))
            );
            let result = gateway.read(methods::GET_CANDIDATE_DATA, Vec::new()).await;
            assert!(matches!(result, Err(Error::Config(ConfigError::Arity { .. }))));
            assert_eq!(ledger.calls(), 0);
        });
    }

    #[test_traced]
    fn test_wrong_contract() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let ledger = mocks::Ledger::new(
                context.clone(),
                Address::from(mocks::CONTRACT),
                Address::from(mocks::ORGANIZER),
            );
            let mut config = mocks::config();
            config.contract = Some("0x9999999999999999999999999999999999999999".into());
            let gateway = Gateway::new(context.with_label("gateway"), ledger, &config);

            let result = gateway.voter_addresses().await;
            assert!(matches!(result, Err(Error::NotDeployedOrWrongContract(_))));
        });
    }

    #[test_traced]
    fn test_write_waits_for_confirmation() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let organizer = Address::from(mocks::ORGANIZER);
            let ledger = mocks::Ledger::new(
                context.clone(),
                Address::from(mocks::CONTRACT),
                organizer.clone(),
            );
            let gateway =
                Gateway::new(context.with_label("gateway"), ledger.clone(), &mocks::config());
            let form = mocks::candidate_form(1, "Ada");

            let confirmation = gateway
                .register_candidate(&organizer, &form, "https://meta/1")
                .await
                .unwrap();
            assert_eq!(confirmation.block, 1);

            // Confirmed writes are visible to the next read
            let listed = gateway.candidate_addresses().await.unwrap();
            assert_eq!(listed, vec![form.address.clone()]);
            let candidate = gateway.candidate(&form.address).await.unwrap().unwrap();
            assert_eq!(candidate.name, "Ada");
            assert_eq!(candidate.metadata_url, "https://meta/1");

            // Reverts carry the ledger's reason
            let stranger = Address::from("0x7000000000000000000000000000000000000007");
            let result = gateway.register_candidate(&stranger, &form, "").await;
            assert_eq!(result, Err(Error::Reverted(mocks::ONLY_ORGANIZER.into())));
        });
    }

    #[test_traced]
    fn test_signing_rejected() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let organizer = Address::from(mocks::ORGANIZER);
            let ledger = mocks::Ledger::new(
                context.clone(),
                Address::from(mocks::CONTRACT),
                organizer.clone(),
            );
            ledger.reject_signing(true);
            let gateway =
                Gateway::new(context.with_label("gateway"), ledger.clone(), &mocks::config());

            let result = gateway.declare_winner(&organizer).await;
            assert_eq!(result, Err(Error::UserRejected));
            assert_eq!(ledger.submitted(methods::DECLARE_WINNER), 0);
        });
    }
}
