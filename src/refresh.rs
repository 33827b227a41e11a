//! Single-flight coordination of token refreshes.
//!
//! When a request is rejected for authentication, the first such request becomes the *leader*:
//! it alone calls the refresh endpoint.  Every request rejected while that call is outstanding
//! becomes a *follower* and parks on a oneshot channel.  When the leader settles, the followers
//! are woken in the order they arrived, all with the same outcome.
//!
//! The state is guarded by a mutex that is never held across an await point.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::observability::{REFRESH_QUEUED, REFRESH_QUEUE_DEPTH};

/// A parked request waiting for the in-flight refresh to settle.
pub type RefreshWaiter = oneshot::Receiver<Result<()>>;

#[derive(Debug, Default)]
struct RefreshState {
    refreshing: bool,
    generation: u64,
    pending: VecDeque<oneshot::Sender<Result<()>>>,
}

/// What a rejected request should do next.
#[derive(Debug)]
pub enum Admission<'a> {
    /// No refresh is in flight; the caller must perform it and settle the guard.
    Leader(RefreshGuard<'a>),
    /// A refresh is in flight; await the receiver for its outcome.
    Follower(RefreshWaiter),
}

/// Refresh state for one client.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    /// Fresh state: not refreshing, nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether the caller leads a refresh or waits for the one in flight.
    pub fn admit(&self) -> Admission<'_> {
        let mut state = self.state.lock();
        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.pending.push_back(tx);
            REFRESH_QUEUED.click();
            REFRESH_QUEUE_DEPTH.add(state.pending.len() as f64);
            Admission::Follower(rx)
        } else {
            state.refreshing = true;
            state.generation += 1;
            Admission::Leader(RefreshGuard {
                coordinator: self,
                generation: state.generation,
                settled: false,
            })
        }
    }

    /// True while a refresh is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of requests parked behind the outstanding refresh.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Tear down: reject anything still parked and forget the in-flight flag.
    ///
    /// A leader that is still running when this is called becomes stale: settling it later
    /// wakes nobody and leaves any newer refresh untouched.
    pub fn reset(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.refreshing = false;
            std::mem::take(&mut state.pending)
        };
        Self::wake(
            pending,
            Err(Error::abort("session was reset while waiting for token refresh")),
        )
    }

    /// Clear the flag and hand `outcome` to every parked request, oldest first.
    ///
    /// `commit` runs under the lock before anyone is woken.  Nothing happens if a reset has
    /// superseded `generation`.
    fn drain(&self, generation: u64, outcome: Result<()>, commit: impl FnOnce()) -> Option<usize> {
        let pending = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return None;
            }
            commit();
            state.refreshing = false;
            std::mem::take(&mut state.pending)
        };
        Some(Self::wake(pending, outcome))
    }

    fn wake(pending: VecDeque<oneshot::Sender<Result<()>>>, outcome: Result<()>) -> usize {
        let count = pending.len();
        for tx in pending {
            // A follower that went away no longer needs the answer.
            let _ = tx.send(outcome.clone());
        }
        count
    }
}

/// Proof that the holder is the one request performing the refresh.
///
/// Settling the guard clears the in-flight flag and wakes every follower.  If the guard is
/// dropped unsettled (the leader's future was cancelled or panicked), the flag is still cleared
/// and followers are rejected with an abort error rather than left waiting forever.
#[derive(Debug)]
pub struct RefreshGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    generation: u64,
    settled: bool,
}

impl RefreshGuard<'_> {
    /// Publish the refresh outcome.
    ///
    /// Returns the number of followers woken, or `None` if a reset superseded this refresh.
    pub fn settle(self, outcome: &Result<()>) -> Option<usize> {
        self.settle_with(outcome, || {})
    }

    /// Like [`RefreshGuard::settle`], but first run `commit` (typically: store the new
    /// credential) unless a reset superseded this refresh.  `commit` runs before any follower
    /// is woken.
    pub fn settle_with(mut self, outcome: &Result<()>, commit: impl FnOnce()) -> Option<usize> {
        self.settled = true;
        self.coordinator
            .drain(self.generation, outcome.clone(), commit)
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.drain(
                self.generation,
                Err(Error::abort("token refresh was abandoned before it completed")),
                || {},
            );
        }
    }
}
