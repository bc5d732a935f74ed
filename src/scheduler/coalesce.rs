//! Coalescing of background jobs triggered from outside.
//!
//! A job key has at most one running task and one queued rerun. Further
//! submissions while a rerun is queued are dropped: the rerun will see
//! whatever they would have seen.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::SettlementResult;

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Nothing was running; a task was spawned.
    Started,
    /// A run is in progress; one more run will follow it.
    Queued,
    /// A rerun was already queued; this submission adds nothing.
    Coalesced,
}

impl Submission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Submission::Started => "started",
            Submission::Queued => "queued",
            Submission::Coalesced => "coalesced",
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    rerun: bool,
}

#[derive(Debug, Default, Clone)]
pub struct JobQueue {
    pending: Arc<DashMap<String, Pending>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make()` in the background under `key`. Outcomes only reach
    /// the logs.
    pub fn submit<T, F, Fut>(&self, key: impl Into<String>, job: &'static str, make: F) -> Submission
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = SettlementResult<T>> + Send + 'static,
    {
        let key = key.into();
        match self.pending.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().rerun {
                    tracing::debug!(job, %key, "Job already queued, coalescing");
                    return Submission::Coalesced;
                }
                slot.get_mut().rerun = true;
                return Submission::Queued;
            }
            Entry::Vacant(slot) => {
                slot.insert(Pending::default());
            }
        }

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            loop {
                if let Err(e) = make().await {
                    tracing::warn!(job, %key, error = %e, "Background job failed");
                }
                // Clearing and rerun checks share the shard lock with submit.
                let again = match pending.entry(key.clone()) {
                    Entry::Occupied(mut slot) if slot.get().rerun => {
                        slot.get_mut().rerun = false;
                        true
                    }
                    Entry::Occupied(slot) => {
                        slot.remove();
                        false
                    }
                    Entry::Vacant(_) => false,
                };
                if !again {
                    break;
                }
            }
        });
        Submission::Started
    }

    /// Keys with a running task.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}
