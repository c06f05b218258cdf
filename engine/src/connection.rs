//! Discover and authorize the account the session acts as.
//!
//! The [Manager] asks a [Wallet] for its authorized accounts and records the first one in
//! the [Session]. An empty answer is not an error: it is reported as the informational
//! [NO_ACCOUNT] message so the UI can prompt the user to connect.

use crate::{
    session::{Family, Session, NO_ACCOUNT},
    types::Account,
    Error,
};
use std::future::Future;
use thiserror::Error as ThisError;
use tracing::{debug, info};

/// Errors reported by a [Wallet].
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("no wallet provider")]
    Unavailable,
    #[error("authorization request rejected")]
    Rejected,
    #[error("wallet error: {0}")]
    Other(String),
}

impl From<WalletError> for Error {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Unavailable => Error::WalletUnavailable,
            WalletError::Rejected => Error::UserRejected,
            WalletError::Other(message) => Error::Unknown(message),
        }
    }
}

/// Account provider (browser extension, hardware signer, ...).
pub trait Wallet: Clone + Send + Sync + 'static {
    /// Accounts already authorized for this client, without prompting.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Account>, WalletError>> + Send;

    /// Prompt the user to authorize accounts.
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Account>, WalletError>> + Send;
}

/// Tracks the connected account of a [Session].
#[derive(Clone)]
pub struct Manager<W: Wallet> {
    wallet: W,
    session: Session,
}

impl<W: Wallet> Manager<W> {
    pub fn new(wallet: W, session: Session) -> Self {
        Self { wallet, session }
    }

    /// Record the first usable account of `accounts`, if any.
    fn adopt(&self, accounts: Vec<Account>) -> Option<Account> {
        let Some(account) = accounts.into_iter().find(|account| !account.is_empty()) else {
            debug!("wallet exposes no account");
            self.session.notice(Family::Connection, NO_ACCOUNT);
            return None;
        };
        if !self.session.set_account(account.clone()) {
            return None;
        }
        Some(account)
    }

    /// Look for an already authorized account.
    pub async fn check(&self) -> Result<Option<Account>, Error> {
        let accounts = match self.wallet.accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                let err = Error::from(err);
                self.session.fail(Family::Connection, &err);
                return Err(err);
            }
        };
        let account = self.adopt(accounts);
        if let Some(account) = &account {
            self.session.clear(Family::Connection);
            info!(account = %account.short(), "account found");
        }
        Ok(account)
    }

    /// Ask the wallet to authorize an account.
    pub async fn connect(&self) -> Result<Option<Account>, Error> {
        let accounts = match self.wallet.request_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                let err = Error::from(err);
                self.session.fail(Family::Connection, &err);
                return Err(err);
            }
        };
        let account = self.adopt(accounts);
        if let Some(account) = &account {
            self.session.clear_all();
            info!(account = %account.short(), "connected");
        }
        Ok(account)
    }
}
