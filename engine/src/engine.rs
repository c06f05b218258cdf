use crate::{
    config::Config,
    connection::{Manager, Wallet},
    eligibility::{self, Eligibility},
    gateway::{Gateway, Transport},
    lifecycle::{Controller, Phase},
    roster::Cache,
    session::{Family, Report, Session, Source},
    types::{
        Account, Address, Candidate, CandidateForm, Confirmation, ElectionState, Voter, VoterForm,
    },
    upload::{Coordinator, Endpoint},
    Error,
};
use commonware_runtime::{Clock, Metrics as RuntimeMetrics, Spawner};
use futures::join;
use serde_json::json;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info};

/// Client-side view of one election, bound to one session.
///
/// Cloning an [Engine] yields another handle to the same session.
#[derive(Clone)]
pub struct Engine<
    E: Clock + Spawner + RuntimeMetrics,
    T: Transport,
    W: Wallet,
    U: Endpoint,
> {
    session: Session,
    gateway: Gateway<T>,
    roster: Cache<T>,
    lifecycle: Controller<E, T>,
    connection: Manager<W>,
    upload: Coordinator<U>,
}

impl<E, T, W, U> Engine<E, T, W, U>
where
    E: Clock + Spawner + RuntimeMetrics,
    T: Transport,
    W: Wallet,
    U: Endpoint,
{
    /// Create an engine with a fresh session.
    ///
    /// An invalid `config` does not fail here: every ledger operation reports it instead.
    pub fn new(context: E, config: &Config, transport: T, wallet: W, endpoint: U) -> Self {
        let session = Session::new();
        let gateway = Gateway::new(context.with_label("gateway"), transport, config);
        let roster = Cache::new(
            context.with_label("roster"),
            gateway.clone(),
            session.clone(),
        );
        let lifecycle = Controller::new(
            context.with_label("lifecycle"),
            gateway.clone(),
            session.clone(),
        );
        Self {
            connection: Manager::new(wallet, session.clone()),
            upload: Coordinator::new(endpoint, session.clone()),
            session,
            gateway,
            roster,
            lifecycle,
        }
    }

    /// Look for an authorized account and, if one is found, load the election.
    ///
    /// An unusable ledger binding is reported (and returned) before the wallet or the ledger
    /// is contacted.
    pub async fn initialize(&self) -> Result<(), Error> {
        if let Err(err) = self.gateway.validate() {
            self.session.fail(Family::Read(Source::Config), &err);
            return Err(err);
        }
        if self.connection.check().await?.is_none() {
            return Ok(());
        }
        self.sync().await
    }

    /// Ask the wallet for an account and reload the election in place.
    pub async fn connect(&self) -> Result<Option<Account>, Error> {
        let account = self.connection.connect().await?;
        if account.is_some() {
            self.sync().await?;
        }
        Ok(account)
    }

    /// Refresh rosters and election state, then arm the countdown.
    ///
    /// All three refreshes run to completion; the first failure is returned (every failure is
    /// also recorded in the session).
    pub async fn sync(&self) -> Result<(), Error> {
        let (candidates, voters, election) = join!(
            self.roster.refresh_candidates(),
            self.roster.refresh_voters(),
            self.lifecycle.refresh(),
        );
        self.lifecycle.arm();
        candidates.and(voters).and(election.map(|_| ()))
    }

    fn require_account(&self) -> Result<Account, Error> {
        self.session.account().ok_or_else(|| {
            let err = Error::WalletUnavailable;
            self.session.fail(Family::Write, &err);
            err
        })
    }

    async fn confirmed<F>(&self, write: F) -> Result<Confirmation, Error>
    where
        F: Future<Output = Result<Confirmation, Error>>,
    {
        match write.await {
            Ok(confirmation) => {
                self.session.clear(Family::Write);
                Ok(confirmation)
            }
            Err(err) => {
                self.session.fail(Family::Write, &err);
                Err(err)
            }
        }
    }

    /// Vote for the candidate at `candidate`.
    ///
    /// Returns `Ok(None)` without touching the ledger unless the session is live, the connected
    /// account can vote and `candidate` is on the current roster. After confirmation both
    /// rosters are reloaded; the voter's `voted` flag is never changed locally.
    pub async fn vote(&self, candidate: &Address) -> Result<Option<Confirmation>, Error> {
        if !self.session.is_live() {
            debug!("ignoring vote: session ended");
            return Ok(None);
        }
        let Some(account) = self.session.account() else {
            debug!("ignoring vote: no account");
            return Ok(None);
        };
        let voters = self.session.voters();
        let candidates = self.session.candidates();
        let Some(chosen) = eligibility::authorize(Some(&account), &voters, &candidates, candidate)
        else {
            debug!(candidate = %candidate.short(), "ignoring vote: not eligible");
            return Ok(None);
        };
        let confirmation = self
            .confirmed(self.gateway.vote(&account, chosen))
            .await?;
        info!(candidate = %candidate.short(), block = confirmation.block, "vote confirmed");
        let (candidates, voters) = join!(
            self.roster.refresh_candidates(),
            self.roster.refresh_voters()
        );
        if let Err(err) = candidates.and(voters) {
            debug!(?err, "refresh after vote failed");
        }
        Ok(Some(confirmation))
    }

    /// Upload the candidate's metadata document and register the candidate.
    ///
    /// Returns `Ok(None)` without uploading or submitting anything once the session has ended.
    pub async fn register_candidate(
        &self,
        form: &CandidateForm,
    ) -> Result<Option<Confirmation>, Error> {
        if !self.session.is_live() {
            debug!("ignoring registration: session ended");
            return Ok(None);
        }
        let account = self.require_account()?;
        let document = json!({
            "name": form.name,
            "address": form.address,
            "age": form.age,
            "image": form.image_url,
        });
        let metadata = self
            .upload
            .upload_json(&document, &format!("{}.json", form.address))
            .await?;
        let confirmation = self
            .confirmed(self.gateway.register_candidate(&account, form, &metadata))
            .await?;
        info!(candidate = %form.address.short(), name = %form.name, "candidate registered");
        if let Err(err) = self.roster.refresh_candidates().await {
            debug!(?err, "refresh after registration failed");
        }
        Ok(Some(confirmation))
    }

    /// Upload the voter's metadata document and grant the voter the right to vote.
    ///
    /// Returns `Ok(None)` without uploading or submitting anything once the session has ended.
    pub async fn authorize_voter(&self, form: &VoterForm) -> Result<Option<Confirmation>, Error> {
        if !self.session.is_live() {
            debug!("ignoring authorization: session ended");
            return Ok(None);
        }
        let account = self.require_account()?;
        let document = json!({
            "name": form.name,
            "address": form.address,
            "position": form.position,
            "image": form.image_url,
        });
        let metadata = self
            .upload
            .upload_json(&document, &format!("{}.json", form.address))
            .await?;
        let confirmation = self
            .confirmed(self.gateway.authorize_voter(&account, form, &metadata))
            .await?;
        info!(voter = %form.address.short(), name = %form.name, "voter authorized");
        if let Err(err) = self.roster.refresh_voters().await {
            debug!(?err, "refresh after authorization failed");
        }
        Ok(Some(confirmation))
    }

    /// Declare the winner (only while the election is [Phase::Closed]).
    pub async fn declare(&self) -> Result<bool, Error> {
        self.lifecycle.declare().await
    }

    /// Upload a file and return its URL.
    pub async fn upload(&self, bytes: &[u8], filename: &str) -> Result<String, Error> {
        self.upload.upload(bytes, filename).await
    }

    /// End the session. Operations still in flight complete but their results are discarded.
    pub fn end(&self) {
        info!("session ended");
        self.session.end();
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn account(&self) -> Option<Account> {
        self.session.account()
    }

    pub fn candidates(&self) -> Arc<Vec<Candidate>> {
        self.session.candidates()
    }

    pub fn voters(&self) -> Arc<Vec<Voter>> {
        self.session.voters()
    }

    pub fn candidate_count(&self) -> usize {
        self.session.candidates().len()
    }

    pub fn voter_count(&self) -> usize {
        self.session.voters().len()
    }

    /// Number of voters who have voted.
    pub fn voted_count(&self) -> usize {
        self.session.voters().iter().filter(|voter| voter.voted).count()
    }

    pub fn candidates_fetch_failed(&self) -> bool {
        self.session.candidates_fetch_failed()
    }

    pub fn voters_fetch_failed(&self) -> bool {
        self.session.voters_fetch_failed()
    }

    pub fn election(&self) -> ElectionState {
        self.session.election()
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Time left to vote, if a window is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.lifecycle.remaining()
    }

    pub fn eligibility(&self) -> Eligibility {
        Eligibility::derive(self.session.account().as_ref(), &self.session.voters())
    }

    /// The error (or notice) currently shown to the user.
    pub fn report(&self) -> Option<Report> {
        self.session.report()
    }
}
