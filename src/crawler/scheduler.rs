//! Frontier of a crawl
//!
//! This module handles:
//! - The shared work queue all workers pull from
//! - The processed set: every URL key is dispatched at most once
//! - In-flight accounting, so workers know when the crawl is finished
//!
//! The processed-set check and the mark happen under the same lock as the
//! dequeue, so two workers can never both take the same key.

use crate::url::url_key;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A URL waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// The URL to fetch
    pub url: Url,

    /// Link hops from the seed (the seed is 0)
    pub depth: u32,
}

impl WorkItem {
    pub fn new(url: Url, depth: u32) -> Self {
        Self { url, depth }
    }
}

/// How an item entered the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Newly discovered, subject to the processed set
    Fresh,
    /// Put back after a 429 or 204, already marked processed
    Retry,
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<(WorkItem, Admission)>,
    processed: HashSet<String>,
    in_flight: usize,
}

/// Work queue shared by the workers of one crawl
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    changed: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a newly discovered item
    pub fn push(&self, item: WorkItem) {
        {
            let mut state = self.lock();
            if state.processed.contains(&url_key(&item.url)) {
                return;
            }
            state.queue.push_back((item, Admission::Fresh));
        }
        self.changed.notify_waiters();
    }

    /// Takes the next unprocessed item and marks it processed
    ///
    /// Waits while the queue is empty but other workers are still busy, since
    /// they may discover more work.
    ///
    /// # Returns
    ///
    /// * `Some(WorkItem)` - An item this worker now owns; report it with `finish`
    /// * `None` - The crawl is complete or was cancelled
    pub async fn next(&self, cancel: &CancellationToken) -> Option<WorkItem> {
        loop {
            // Registered before inspecting the queue so a concurrent
            // `finish` cannot slip between the check and the wait.
            let notified = self.changed.notified();

            {
                let mut state = self.lock();
                while let Some((item, admission)) = state.queue.pop_front() {
                    if admission == Admission::Fresh && !state.processed.insert(url_key(&item.url)) {
                        tracing::trace!("Skipping already processed {}", item.url);
                        continue;
                    }
                    state.in_flight += 1;
                    return Some(item);
                }

                if state.in_flight == 0 {
                    drop(state);
                    self.changed.notify_waiters();
                    return None;
                }
            }

            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Reports that a worker is done with its item
    ///
    /// # Arguments
    ///
    /// * `discovered` - New items found while processing
    /// * `requeue` - The item itself, when it has to be fetched again later
    pub fn finish(&self, discovered: Vec<WorkItem>, requeue: Option<WorkItem>) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);

            for item in discovered {
                if !state.processed.contains(&url_key(&item.url)) {
                    state.queue.push_back((item, Admission::Fresh));
                }
            }
            if let Some(item) = requeue {
                state.queue.push_back((item, Admission::Retry));
            }
        }
        self.changed.notify_waiters();
    }

    /// Marks a URL as processed without dispatching it
    ///
    /// # Returns
    ///
    /// `true` if the URL was not processed before
    pub fn mark_processed(&self, url: &Url) -> bool {
        self.lock().processed.insert(url_key(url))
    }

    /// Returns true if the URL has been dispatched
    pub fn is_processed(&self, url: &Url) -> bool {
        self.lock().processed.contains(&url_key(url))
    }

    /// Sorted snapshot of the processed keys
    pub fn processed(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.lock().processed.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of items waiting in the queue
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }
}
