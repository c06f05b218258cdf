//! Candidate and voter rosters mirrored from the ledger.
//!
//! # Refresh
//!
//! A refresh lists the roster's addresses, looks every address up concurrently and swaps the
//! resulting snapshot into the [Session] in one step. Refreshes are idempotent and may overlap:
//! the last one to complete wins, and readers never observe a partially built roster.
//!
//! Failures are handled per scope:
//!
//! - A listing that shows the contract is missing or wrong ([Error::NotDeployedOrWrongContract])
//!   empties the roster and raises its `fetch_failed` flag, so the UI can tell "no entries"
//!   from "cannot reach the ledger".
//! - Any other listing failure keeps the previous snapshot.
//! - A failed or malformed detail lookup drops that record only.
//!
//! Listing failures are recorded in the session under [Family::Read] with the roster as
//! [Source]; a successful refresh clears only the report of its own roster.
//!
//! # Deduplication
//!
//! No two entries of a snapshot share an address. When the ledger lists an address twice, the
//! entry keeps the position of its first occurrence and the value of its last.

mod metrics;

use crate::{
    gateway::{Gateway, Transport},
    session::{Family, Session, Source},
    types::{Address, Keyed},
    Error,
};
use commonware_runtime::Metrics as RuntimeMetrics;
use futures::future::join_all;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

/// Collapse repeated addresses, keeping first position and last value.
pub fn dedup<R: Keyed>(records: Vec<R>) -> Vec<R> {
    let mut positions: HashMap<Address, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<R> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(record.address()) {
            Some(&position) => unique[position] = record,
            None => {
                positions.insert(record.address().clone(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

/// Keeps the rosters of a [Session] in sync with the ledger.
#[derive(Clone)]
pub struct Cache<T: Transport> {
    gateway: Gateway<T>,
    session: Session,
    metrics: Arc<metrics::Metrics>,
}

impl<T: Transport> Cache<T> {
    pub fn new(context: impl RuntimeMetrics, gateway: Gateway<T>, session: Session) -> Self {
        Self {
            gateway,
            session,
            metrics: Arc::new(metrics::Metrics::init(context)),
        }
    }

    /// Rebuild the candidate roster.
    pub async fn refresh_candidates(&self) -> Result<(), Error> {
        self.metrics.refreshes.inc();
        let addresses = match self.gateway.candidate_addresses().await {
            Ok(addresses) => addresses,
            Err(err) => return Err(self.listing_failed(Source::Candidates, err)),
        };
        let lookups = join_all(addresses.iter().map(|address| self.gateway.candidate(address)));
        let records = self.absorb(Source::Candidates, &addresses, lookups.await);
        let size = records.len();
        if !self.session.replace_candidates(records, false) {
            debug!("session ended: discarding candidates");
            return Ok(());
        }
        self.session.clear(Family::Read(Source::Candidates));
        debug!(listed = addresses.len(), size, "refreshed candidates");
        Ok(())
    }

    /// Rebuild the voter roster.
    pub async fn refresh_voters(&self) -> Result<(), Error> {
        self.metrics.refreshes.inc();
        let addresses = match self.gateway.voter_addresses().await {
            Ok(addresses) => addresses,
            Err(err) => return Err(self.listing_failed(Source::Voters, err)),
        };
        let lookups = join_all(addresses.iter().map(|address| self.gateway.voter(address)));
        let records = self.absorb(Source::Voters, &addresses, lookups.await);
        let size = records.len();
        if !self.session.replace_voters(records, false) {
            debug!("session ended: discarding voters");
            return Ok(());
        }
        self.session.clear(Family::Read(Source::Voters));
        debug!(listed = addresses.len(), size, "refreshed voters");
        Ok(())
    }

    /// Keep the records whose lookup succeeded.
    fn absorb<R: Keyed>(
        &self,
        roster: Source,
        addresses: &[Address],
        lookups: Vec<Result<Option<R>, Error>>,
    ) -> Vec<R> {
        let mut records = Vec::with_capacity(lookups.len());
        for (address, lookup) in addresses.iter().zip(lookups) {
            match lookup {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    self.metrics.dropped.inc();
                    debug!(?roster, %address, "dropping malformed record");
                }
                Err(err) => {
                    self.metrics.dropped.inc();
                    warn!(?roster, %address, ?err, "dropping record");
                }
            }
        }
        dedup(records)
    }

    fn listing_failed(&self, roster: Source, err: Error) -> Error {
        self.metrics.refresh_failures.inc();
        warn!(?roster, ?err, "roster listing failed");
        if matches!(err, Error::NotDeployedOrWrongContract(_)) {
            match roster {
                Source::Candidates => self.session.replace_candidates(Vec::new(), true),
                Source::Voters => self.session.replace_voters(Vec::new(), true),
                Source::Config | Source::Election => false,
            };
        }
        self.session.fail(Family::Read(roster), &err);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, Address, Candidate};
    use commonware_macros::test_traced;
    use commonware_runtime::{
        deterministic::{self, Context},
        Runner, Spawner as _,
    };
    use std::time::Duration;

    struct Fixture {
        ledger: mocks::Ledger<Context>,
        gateway: Gateway<mocks::Ledger<Context>>,
        cache: Cache<mocks::Ledger<Context>>,
        session: Session,
        organizer: Address,
    }

    fn fixture(context: &Context) -> Fixture {
        let organizer = Address::from(mocks::ORGANIZER);
        let ledger = mocks::Ledger::new(
            context.clone(),
            Address::from(mocks::CONTRACT),
            organizer.clone(),
        );
        let session = Session::new();
        let gateway = Gateway::new(context.with_label("gateway"), ledger.clone(), &mocks::config());
        let cache = Cache::new(context.with_label("roster"), gateway.clone(), session.clone());
        Fixture {
            ledger,
            gateway,
            cache,
            session,
            organizer,
        }
    }

    async fn register(fixture: &Fixture, names: &[&str]) {
        for (index, name) in names.iter().enumerate() {
            let form = mocks::candidate_form(index as u64, name);
            fixture
                .gateway
                .register_candidate(&fixture.organizer, &form, "")
                .await
                .unwrap();
        }
    }

    fn names(candidates: &[Candidate]) -> Vec<&str> {
        candidates
            .iter()
            .map(|candidate| candidate.name.as_str())
            .collect()
    }

    #[test]
    fn test_dedup_keeps_first_position_last_value() {
        let record = |address: &str, name: &str| Candidate {
            age: "40".into(),
            name: name.into(),
            candidate_id: 0,
            image_url: String::new(),
            vote_count: 0,
            metadata_url: String::new(),
            address: Address::from(address),
        };
        let records = vec![
            record("0xAA", "first"),
            record("0xbb", "other"),
            record("0xaa", "second"),
        ];
        let unique = dedup(records);
        assert_eq!(names(&unique), vec!["second", "other"]);
    }

    #[test_traced]
    fn test_refresh_in_ledger_order() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let fixture = fixture(&context);
            register(&fixture, &["Ada", "Grace", "Edsger"]).await;

            fixture.cache.refresh_candidates().await.unwrap();
            let candidates = fixture.session.candidates();
            assert_eq!(names(&candidates), vec!["Ada", "Grace", "Edsger"]);
            assert_eq!(candidates[1].candidate_id, 1);
            assert!(!fixture.session.candidates_fetch_failed());
        });
    }

    #[test_traced]
    fn test_refresh_idempotent() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let fixture = fixture(&context);
            register(&fixture, &["Ada", "Grace"]).await;

            fixture.cache.refresh_candidates().await.unwrap();
            let first = fixture.session.candidates();
            fixture.cache.refresh_candidates().await.unwrap();
            let second = fixture.session.candidates();
            assert_eq!(first, second);
        });
    }

    #[test_traced]
    fn test_wrong_contract_empties_roster() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let fixture = fixture(&context);
            register(&fixture, &["Ada"]).await;
            fixture.cache.refresh_candidates().await.unwrap();
            assert_eq!(fixture.session.candidates().len(), 1);

            fixture.ledger.set_wrong_contract(true);
            let result = fixture.cache.refresh_candidates().await;
            assert!(matches!(result, Err(Error::NotDeployedOrWrongContract(_))));
            assert!(fixture.session.candidates().is_empty());
            assert!(fixture.session.candidates_fetch_failed());
            let report = fixture.session.report().unwrap();
            assert_eq!(report.family, Family::Read(Source::Candidates));
            assert!(report.message.contains("wrong contract"));

            // Recovery clears the flag and the report
            fixture.ledger.set_wrong_contract(false);
            fixture.cache.refresh_candidates().await.unwrap();
            assert_eq!(fixture.session.candidates().len(), 1);
            assert!(!fixture.session.candidates_fetch_failed());
            assert_eq!(fixture.session.report(), None);
        });
    }

    #[test_traced]
    fn test_duplicates_and_nulls_filtered() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let fixture = fixture(&context);
            register(&fixture, &["Ada", "Grace"]).await;
            for index in 0..2 {
                let form = mocks::voter_form(10 + index, "Voter");
                fixture
                    .gateway
                    .authorize_voter(&fixture.organizer, &form, "")
                    .await
                    .unwrap();
            }
            fixture.ledger.duplicate_listings(true);
            fixture.ledger.null_listings(true);

            fixture.cache.refresh_candidates().await.unwrap();
            fixture.cache.refresh_voters().await.unwrap();
            assert_eq!(names(&fixture.session.candidates()), vec!["Ada", "Grace"]);
            let voters = fixture.session.voters();
            assert_eq!(voters.len(), 2);
            assert_eq!(voters[0].address, mocks::address(10));
            assert_eq!(voters[1].address, mocks::address(11));
        });
    }

    #[test_traced]
    fn test_failed_lookup_drops_record() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let fixture = fixture(&context);
            register(&fixture, &["Ada", "Grace", "Edsger"]).await;
            fixture.ledger.fail_lookup(mocks::address(1));

            fixture.cache.refresh_candidates().await.unwrap();
            assert_eq!(names(&fixture.session.candidates()), vec!["Ada", "Edsger"]);
            assert!(!fixture.session.candidates_fetch_failed());
        });
    }

    #[test_traced]
    fn test_overlapping_refreshes() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let fixture = fixture(&context);
            register(&fixture, &["Ada", "Grace"]).await;

            // Started first, completed last
            let handles: Vec<_> = (0..3u64)
                .map(|index| {
                    let ledger = fixture
                        .ledger
                        .clone()
                        .with_latency(Duration::from_millis(30 * (3 - index)));
                    let gateway = Gateway::new(
                        context.with_label(&format!("gateway_{index}")),
                        ledger,
                        &mocks::config(),
                    );
                    let cache = Cache::new(
                        context.with_label(&format!("roster_{index}")),
                        gateway,
                        fixture.session.clone(),
                    );
                    context
                        .with_label(&format!("refresh_{index}"))
                        .spawn(move |_| async move { cache.refresh_candidates().await })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
            assert_eq!(names(&fixture.session.candidates()), vec!["Ada", "Grace"]);
            assert!(!fixture.session.candidates_fetch_failed());
        });
    }

    #[test_traced]
    fn test_results_discarded_after_end() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let fixture = fixture(&context);
            register(&fixture, &["Ada"]).await;

            fixture.session.end();
            fixture.cache.refresh_candidates().await.unwrap();
            assert!(fixture.session.candidates().is_empty());
        });
    }
}
