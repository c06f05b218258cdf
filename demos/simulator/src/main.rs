//! Run a scripted election against a simulated ledger.
//!
//! The simulator deploys an in-memory election contract, registers candidates and voters from
//! the organizer's session, lets every voter cast one vote from its own session and waits for
//! the voting window to close. The organizer's countdown then declares the winner.
//!
//! Everything runs on the deterministic runtime: the whole election (including a voting window
//! of hours) completes instantly and the same `--seed` always produces the same ballots.
//!
//! # Usage
//!
//! ```sh
//! cargo run --release --bin ballot-simulator -- --candidates 3 --voters 12 --window 3600
//! ```
//!
//! Pass `--config` to bind the engine through a configuration file instead of the built-in
//! binding (a contract address that does not match the simulated one shows how the engine
//! reports a wrong contract).

use ballot_engine::{mocks, Address, Config, Engine, HttpEndpoint};
use clap::{value_parser, Arg, Command};
use commonware_runtime::{
    deterministic::{self, Context},
    Clock, Metrics, Runner,
};
use rand::Rng;
use std::{
    path::PathBuf,
    time::{Duration, UNIX_EPOCH},
};
use tracing::{info, warn, Level};

type Ledger = mocks::Ledger<Context>;
type Session = Engine<Context, Ledger, mocks::Wallet, mocks::Endpoint>;

const NAMES: [&str; 8] = [
    "Ada", "Grace", "Edsger", "Barbara", "Donald", "Frances", "John", "Margaret",
];

/// Index of the first voter address.
const FIRST_VOTER: u64 = 100;

/// Returns the version of the crate.
fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

fn open(
    context: &Context,
    label: &str,
    config: &Config,
    ledger: &Ledger,
    endpoint: &mocks::Endpoint,
    account: &Address,
) -> Session {
    Engine::new(
        context.with_label(label),
        config,
        ledger.clone(),
        mocks::Wallet::authorized(vec![account.to_string()]),
        endpoint.clone(),
    )
}

fn main() {
    // Parse arguments
    let matches = Command::new("ballot-simulator")
        .about("run a scripted election against a simulated ledger")
        .version(crate_version())
        .arg(
            Arg::new("candidates")
                .long("candidates")
                .required(false)
                .default_value("3")
                .value_parser(value_parser!(u64).range(1..))
                .help("Number of candidates to register"),
        )
        .arg(
            Arg::new("voters")
                .long("voters")
                .required(false)
                .default_value("8")
                .value_parser(value_parser!(u64))
                .help("Number of voters to authorize"),
        )
        .arg(
            Arg::new("window")
                .long("window")
                .required(false)
                .default_value("600")
                .value_parser(value_parser!(u64).range(1..))
                .help("Length of the voting window in seconds"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .required(false)
                .default_value("0")
                .value_parser(value_parser!(u64))
                .help("Seed of the deterministic runtime (and of the ballots)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .required(false)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a YAML configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .required(false)
                .num_args(0)
                .help("Log every refresh and ledger call"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .required(false)
                .num_args(0)
                .help("Emit logs as JSON"),
        )
        .arg(
            Arg::new("metrics")
                .long("metrics")
                .required(false)
                .num_args(0)
                .help("Print all metrics once the election is over"),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    if matches.get_flag("json") {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(level)
            .init();
    } else {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    // Load configuration
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load(path).expect("failed to load configuration"),
        None => mocks::config(),
    };
    if config.upload.is_some() {
        match HttpEndpoint::from_config(&config) {
            Ok(_) => info!("upload endpoint configured (uploads stay simulated)"),
            Err(err) => warn!(?err, "upload endpoint unusable (uploads stay simulated)"),
        }
    }
    let candidates = *matches.get_one::<u64>("candidates").expect("default");
    let voters = *matches.get_one::<u64>("voters").expect("default");
    let window = *matches.get_one::<u64>("window").expect("default");
    let seed = *matches.get_one::<u64>("seed").expect("default");
    let print_metrics = matches.get_flag("metrics");
    info!(candidates, voters, window, seed, "starting simulation");

    // Run the election
    let executor = deterministic::Runner::new(deterministic::Config::new().with_seed(seed));
    executor.start(|mut context| async move {
        let organizer = Address::from(mocks::ORGANIZER);
        let ledger = mocks::Ledger::new(
            context.clone(),
            Address::from(mocks::CONTRACT),
            organizer.clone(),
        );
        let endpoint = mocks::Endpoint::default();

        // Register candidates and voters
        let admin = open(&context, "organizer", &config, &ledger, &endpoint, &organizer);
        if let Err(err) = admin.initialize().await {
            warn!(?err, "organizer could not load the election");
        }
        for index in 0..candidates {
            let name = NAMES[index as usize % NAMES.len()];
            let form = mocks::candidate_form(index, name);
            if let Err(err) = admin.register_candidate(&form).await {
                warn!(?err, name, "registration failed");
            }
        }
        for index in 0..voters {
            let form = mocks::voter_form(FIRST_VOTER + index, &format!("Voter {index}"));
            if let Err(err) = admin.authorize_voter(&form).await {
                warn!(?err, index, "authorization failed");
            }
        }

        // Open the voting window
        let now = context
            .current()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_secs();
        let end = now + window;
        ledger.set_voting_end_time(end);
        if let Err(err) = admin.sync().await {
            warn!(?err, "organizer could not refresh the election");
        }
        info!(
            end,
            phase = ?admin.phase(),
            candidates = admin.candidate_count(),
            voters = admin.voter_count(),
            "voting open"
        );

        // Cast ballots, one session per voter
        for index in 0..voters {
            let account = mocks::address(FIRST_VOTER + index);
            let label = format!("voter_{index}");
            let session = open(&context, &label, &config, &ledger, &endpoint, &account);
            if let Err(err) = session.initialize().await {
                warn!(?err, index, "voter could not load the election");
            }
            let choice = mocks::address(context.gen_range(0..candidates));
            match session.vote(&choice).await {
                Ok(Some(confirmation)) => info!(
                    voter = %account.short(),
                    candidate = %choice.short(),
                    block = confirmation.block,
                    "ballot cast"
                ),
                Ok(None) => warn!(
                    voter = %account.short(),
                    eligibility = ?session.eligibility(),
                    "ballot ignored"
                ),
                Err(err) => warn!(voter = %account.short(), ?err, "ballot failed"),
            }
            session.end();
        }

        // A stranger's ballot never reaches the ledger
        let stranger = mocks::address(FIRST_VOTER + voters);
        let session = open(&context, "stranger", &config, &ledger, &endpoint, &stranger);
        if session.initialize().await.is_ok() {
            let ignored = session.vote(&mocks::address(0)).await;
            info!(
                eligibility = ?session.eligibility(),
                ignored = matches!(ignored, Ok(None)),
                "stranger tried to vote"
            );
        }
        session.end();

        // Let the organizer's countdown close the election
        context
            .sleep_until(UNIX_EPOCH + Duration::from_secs(end) + Duration::from_secs(1))
            .await;
        if let Err(err) = admin.sync().await {
            warn!(?err, "organizer could not refresh the election");
        }
        for candidate in admin.candidates().iter() {
            info!(
                name = %candidate.name,
                address = %candidate.address.short(),
                votes = candidate.vote_count,
                "tally"
            );
        }
        let election = admin.election();
        info!(
            phase = ?admin.phase(),
            winner = %election.winner_name,
            voted = admin.voted_count(),
            voters = admin.voter_count(),
            "election over"
        );
        if let Some(report) = admin.report() {
            warn!(message = %report.message, family = ?report.family, "unresolved report");
        }
        if print_metrics {
            println!("{}", context.encode());
        }
    });
}
