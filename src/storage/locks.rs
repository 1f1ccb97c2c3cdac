use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::AccountId;

/// Default bound on how long a writer waits for an account lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Timed out waiting for the lock on account {0}")]
pub struct LockTimedOut(pub AccountId);

/// Keyed mutual exclusion over account ids.
///
/// Serializes the read-check-write sequence of concurrent writers on the same
/// account. Waits are bounded by the configured timeout. Slots are created on
/// demand and pruned once no task holds or waits on them.
#[derive(Clone)]
pub struct AccountLocks {
    slots: Arc<DashMap<AccountId, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl AccountLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Lock a single account.
    pub async fn acquire(&self, account: AccountId) -> Result<AccountGuard, LockTimedOut> {
        self.acquire_all(&[account]).await
    }

    /// Lock several accounts at once.
    ///
    /// Ids are locked in ascending order so two writers touching the same pair
    /// of accounts cannot deadlock. Locks already taken are released if a later
    /// one times out.
    pub async fn acquire_all(&self, accounts: &[AccountId]) -> Result<AccountGuard, LockTimedOut> {
        let mut ids = accounts.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut guard = AccountGuard {
            held: Vec::with_capacity(ids.len()),
            slots: Arc::clone(&self.slots),
        };

        for account in ids {
            let slot = Arc::clone(self.slots.entry(account).or_default().value());
            let waited = tokio::time::timeout(self.timeout, slot.lock_owned()).await;
            match waited {
                Ok(held) => guard.held.push((account, held)),
                Err(_) => {
                    // The abandoned wait may have been the last thing keeping
                    // a released slot alive.
                    prune(&self.slots, account);
                    return Err(LockTimedOut(account));
                }
            }
        }

        Ok(guard)
    }

    /// Number of accounts currently locked or waited on.
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }
}

/// Holds one or more account locks until dropped.
pub struct AccountGuard {
    held: Vec<(AccountId, OwnedMutexGuard<()>)>,
    slots: Arc<DashMap<AccountId, Arc<Mutex<()>>>>,
}

impl AccountGuard {
    pub fn accounts(&self) -> Vec<AccountId> {
        self.held.iter().map(|(account, _)| *account).collect()
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        for (account, held) in self.held.drain(..) {
            drop(held);
            prune(&self.slots, account);
        }
    }
}

/// Drop the slot of `account` when only the map itself still references it.
fn prune(slots: &DashMap<AccountId, Arc<Mutex<()>>>, account: AccountId) {
    slots.remove_if(&account, |_, slot| Arc::strong_count(slot) == 1);
}
