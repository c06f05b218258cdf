use crate::{
    connection::{Wallet as WalletTrait, WalletError},
    types::Account,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct State {
    installed: bool,
    authorized: Vec<Account>,
    /// Accounts granted by the next authorization request.
    grantable: Vec<Account>,
    reject: bool,
    requests: usize,
}

/// An in-memory wallet.
#[derive(Clone, Default)]
pub struct Wallet {
    state: Arc<Mutex<State>>,
}

impl Wallet {
    fn with(state: State) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A wallet that has already authorized `accounts`.
    pub fn authorized(accounts: Vec<String>) -> Self {
        let accounts: Vec<Account> = accounts.into_iter().map(Account::from).collect();
        Self::with(State {
            installed: true,
            authorized: accounts.clone(),
            grantable: accounts,
            ..State::default()
        })
    }

    /// A wallet that authorizes `accounts` only once asked to.
    pub fn locked(accounts: Vec<String>) -> Self {
        Self::with(State {
            installed: true,
            grantable: accounts.into_iter().map(Account::from).collect(),
            ..State::default()
        })
    }

    /// No wallet installed.
    pub fn missing() -> Self {
        Self::default()
    }

    /// Decline every authorization request.
    pub fn reject_requests(&self, enabled: bool) {
        self.state.lock().unwrap().reject = enabled;
    }

    /// Number of authorization requests received.
    pub fn requests(&self) -> usize {
        self.state.lock().unwrap().requests
    }
}

impl WalletTrait for Wallet {
    async fn accounts(&self) -> Result<Vec<Account>, WalletError> {
        let state = self.state.lock().unwrap();
        if !state.installed {
            return Err(WalletError::Unavailable);
        }
        Ok(state.authorized.clone())
    }

    async fn request_accounts(&self) -> Result<Vec<Account>, WalletError> {
        let mut state = self.state.lock().unwrap();
        if !state.installed {
            return Err(WalletError::Unavailable);
        }
        state.requests += 1;
        if state.reject {
            return Err(WalletError::Rejected);
        }
        state.authorized = state.grantable.clone();
        Ok(state.authorized.clone())
    }
}
