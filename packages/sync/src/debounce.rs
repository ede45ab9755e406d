//! Commit debouncing
//!
//! [`Debouncer`] is a deadline table driven by the caller's clock: every
//! trigger replaces the key's deadline, `due` releases what has been quiet
//! long enough. [`DebounceDriver`] is the tokio flavour for hosts that run
//! a runtime: each key owns a sleeping task that is aborted when the key is
//! triggered again, and fired keys arrive on a channel.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct Debouncer<K: Ord + Clone> {
    quiet: Duration,
    deadlines: BTreeMap<K, Instant>,
}

impl<K: Ord + Clone> Debouncer<K> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadlines: BTreeMap::new(),
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Start or restart the quiet period for `key`
    pub fn schedule(&mut self, key: K, now: Instant) {
        self.deadlines.insert(key, now + self.quiet);
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    pub fn has_pending(&self) -> bool {
        !self.deadlines.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every key whose deadline has passed
    pub fn due(&mut self, now: Instant) -> Vec<K> {
        let fired: Vec<K> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &fired {
            self.deadlines.remove(key);
        }
        fired
    }

    /// Remove and return every pending key, due or not
    pub fn drain(&mut self) -> Vec<K> {
        std::mem::take(&mut self.deadlines).into_keys().collect()
    }
}

/// Timer tasks on the tokio runtime. Must be used from within a runtime.
pub struct DebounceDriver<K> {
    quiet: Duration,
    tasks: HashMap<K, JoinHandle<()>>,
    fired_tx: mpsc::UnboundedSender<K>,
}

impl<K> DebounceDriver<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Create a driver and the receiver on which fired keys arrive
    pub fn new(quiet: Duration) -> (Self, mpsc::UnboundedReceiver<K>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        (
            Self {
                quiet,
                tasks: HashMap::new(),
                fired_tx,
            },
            fired_rx,
        )
    }

    /// Start or restart the quiet period for `key`, superseding any
    /// pending timer
    pub fn trigger(&mut self, key: K) {
        self.cancel(&key);
        let quiet = self.quiet;
        let tx = self.fired_tx.clone();
        let fired = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = tx.send(fired);
        });
        self.tasks.insert(key, handle);
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        match self.tasks.remove(key) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    /// Forget a key once its fire has been handled
    pub fn acknowledge(&mut self, key: &K) {
        self.tasks.remove(key);
    }
}

impl<K> Drop for DebounceDriver<K> {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}
