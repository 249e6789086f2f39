//! Class snapshot subscriptions
//!
//! Listeners register a filter and receive a fresh snapshot after every
//! committed class mutation. Dropping the returned [`Subscription`] detaches
//! the listener.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use super::classes::ClassFilter;
use crate::error::Result;
use crate::models::ClassTemplate;

pub type ClassListener = Arc<dyn Fn(&[ClassTemplate]) + Send + Sync>;

#[derive(Default)]
struct FeedInner {
    next_id: u64,
    listeners: BTreeMap<u64, (ClassFilter, ClassListener)>,
}

#[derive(Default)]
pub(crate) struct ClassFeed {
    inner: Arc<Mutex<FeedInner>>,
}

impl ClassFeed {
    pub fn subscribe(&self, filter: ClassFilter, listener: ClassListener) -> Subscription {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = inner.next_id;
        inner.listeners.insert(id, (filter, listener));
        debug!(subscription = id, ?filter, "Class listener attached");

        Subscription {
            id,
            feed: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .len()
    }

    /// Deliver one snapshot per distinct filter to every listener
    pub fn publish<F>(&self, mut snapshot: F) -> Result<()>
    where
        F: FnMut(ClassFilter) -> Result<Vec<ClassTemplate>>,
    {
        // Listeners run outside the lock so they may unsubscribe themselves
        let listeners: Vec<(ClassFilter, ClassListener)> = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .listeners
            .values()
            .cloned()
            .collect();

        let mut cache: Vec<(ClassFilter, Vec<ClassTemplate>)> = Vec::new();
        for (filter, listener) in listeners {
            let position = match cache.iter().position(|(f, _)| *f == filter) {
                Some(position) => position,
                None => {
                    cache.push((filter, snapshot(filter)?));
                    cache.len() - 1
                }
            };
            listener(&cache[position].1);
        }
        Ok(())
    }
}

/// Handle for a registered class listener
pub struct Subscription {
    id: u64,
    feed: Weak<Mutex<FeedInner>>,
}

impl Subscription {
    /// Detach the listener now instead of at drop
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.upgrade() {
            feed.lock()
                .unwrap_or_else(|e| e.into_inner())
                .listeners
                .remove(&self.id);
            debug!(subscription = self.id, "Class listener detached");
        }
    }
}
