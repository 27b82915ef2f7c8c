use crate::callers::node::{CallerKey, CallerNode};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

enum Slot {
    Loading,
    Ready(Arc<Vec<CallerNode>>),
}

/// Outcome of [`CallerCache::claim`].
pub enum Claim<'a> {
    Ready(Arc<Vec<CallerNode>>),
    /// The caller must compute the entry and `complete` the guard.
    Owner(LoadGuard<'a>),
    /// Another expansion of this key did not finish within the wait bound.
    Busy,
}

#[derive(Default)]
struct Slots {
    map: HashMap<CallerKey, Slot>,
    /// Bumped by `clear`; guards from an older epoch no longer own their key.
    epoch: u64,
}

/// Children per `(file, line)`, shared by every tree position that points
/// there. Entries are shallow (grandchildren are looked up separately) and
/// swapped in whole under the lock, so readers never see a partial list.
pub struct CallerCache {
    slots: Mutex<Slots>,
    changed: Condvar,
    wait: Duration,
}

impl CallerCache {
    pub fn new(wait: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            changed: Condvar::new(),
            wait,
        }
    }

    /// Ready entry for `key`; never blocks on an in-flight load.
    pub fn get(&self, key: &CallerKey) -> Option<Arc<Vec<CallerNode>>> {
        match self.slots.lock().map.get(key) {
            Some(Slot::Ready(children)) => Some(Arc::clone(children)),
            _ => None,
        }
    }

    /// Ready entry, or ownership of the load, waiting (bounded) while
    /// another thread holds it.
    pub fn claim(&self, key: &CallerKey) -> Claim<'_> {
        let deadline = Instant::now() + self.wait;
        let mut slots = self.slots.lock();
        loop {
            match slots.map.get(key) {
                Some(Slot::Ready(children)) => return Claim::Ready(Arc::clone(children)),
                Some(Slot::Loading) => {
                    trace!(file = %key.0.display(), line = key.1, "waiting on in-flight expansion");
                    if self.changed.wait_until(&mut slots, deadline).timed_out() {
                        return Claim::Busy;
                    }
                }
                None => {
                    slots.map.insert(key.clone(), Slot::Loading);
                    return Claim::Owner(LoadGuard {
                        cache: self,
                        key: key.clone(),
                        epoch: slots.epoch,
                        done: false,
                    });
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .map
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Loads still in flight finish without storing.
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.map.clear();
        slots.epoch += 1;
        drop(slots);
        self.changed.notify_all();
    }
}

/// Exclusive right to fill one key. Dropping it without `complete` releases
/// the key so a later expansion can retry.
pub struct LoadGuard<'a> {
    cache: &'a CallerCache,
    key: CallerKey,
    epoch: u64,
    done: bool,
}

impl LoadGuard<'_> {
    /// Store `children` for the key. After a `clear` the result is handed
    /// back but not stored.
    pub fn complete(mut self, children: Vec<CallerNode>) -> Arc<Vec<CallerNode>> {
        let children = Arc::new(children.iter().map(CallerNode::shallow).collect::<Vec<_>>());
        let mut slots = self.cache.slots.lock();
        if slots.epoch == self.epoch {
            slots.map.insert(self.key.clone(), Slot::Ready(Arc::clone(&children)));
        } else {
            debug!(file = %self.key.0.display(), line = self.key.1, "cache cleared during load; result not stored");
        }
        drop(slots);
        self.done = true;
        self.cache.changed.notify_all();
        children
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut slots = self.cache.slots.lock();
        if slots.epoch == self.epoch && matches!(slots.map.get(&self.key), Some(Slot::Loading)) {
            slots.map.remove(&self.key);
        }
        drop(slots);
        self.cache.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;

    fn key(line: usize) -> CallerKey {
        (PathBuf::from("a.rs"), line)
    }

    #[test]
    fn abandoned_load_is_retryable() {
        let cache = CallerCache::new(Duration::from_millis(10));
        match cache.claim(&key(1)) {
            Claim::Owner(guard) => drop(guard),
            _ => panic!("expected ownership"),
        }
        assert!(matches!(cache.claim(&key(1)), Claim::Owner(_)));
    }

    #[test]
    fn waiter_receives_completed_entry() {
        let cache = CallerCache::new(Duration::from_secs(5));
        let Claim::Owner(guard) = cache.claim(&key(1)) else {
            panic!("expected ownership");
        };
        thread::scope(|s| {
            let waiter = s.spawn(|| match cache.claim(&key(1)) {
                Claim::Ready(children) => children.len(),
                _ => usize::MAX,
            });
            thread::sleep(Duration::from_millis(20));
            guard.complete(vec![CallerNode::root("b.rs", 3)]);
            assert_eq!(waiter.join().unwrap(), 1);
        });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn busy_after_wait_bound() {
        let cache = CallerCache::new(Duration::from_millis(10));
        let _guard = match cache.claim(&key(1)) {
            Claim::Owner(g) => g,
            _ => panic!("expected ownership"),
        };
        thread::scope(|s| {
            let busy = s.spawn(|| matches!(cache.claim(&key(1)), Claim::Busy));
            assert!(busy.join().unwrap());
        });
    }

    #[test]
    fn stored_children_are_shallow() {
        let cache = CallerCache::new(Duration::from_millis(10));
        let mut child = CallerNode::root("b.rs", 3);
        child.children = Some(vec![CallerNode::root("c.rs", 1)]);
        if let Claim::Owner(guard) = cache.claim(&key(1)) {
            guard.complete(vec![child]);
        }
        let stored = cache.get(&key(1)).unwrap();
        assert_eq!(stored[0].children, None);
    }

    #[test]
    fn load_spanning_a_clear_is_not_stored() {
        let cache = CallerCache::new(Duration::from_millis(10));
        let Claim::Owner(stale) = cache.claim(&key(1)) else {
            panic!("expected ownership");
        };
        cache.clear();

        let Claim::Owner(fresh) = cache.claim(&key(1)) else {
            panic!("expected ownership after clear");
        };
        let returned = stale.complete(vec![CallerNode::root("old.rs", 1)]);
        assert_eq!(returned.len(), 1);
        assert!(cache.get(&key(1)).is_none());

        fresh.complete(vec![CallerNode::root("new.rs", 2)]);
        let stored = cache.get(&key(1)).unwrap();
        assert_eq!(stored[0].file_path, PathBuf::from("new.rs"));
    }

    #[test]
    fn stale_guard_drop_keeps_new_owner() {
        let cache = CallerCache::new(Duration::from_millis(10));
        let Claim::Owner(stale) = cache.claim(&key(1)) else {
            panic!("expected ownership");
        };
        cache.clear();
        let Claim::Owner(_fresh) = cache.claim(&key(1)) else {
            panic!("expected ownership after clear");
        };
        drop(stale);
        assert!(matches!(cache.claim(&key(1)), Claim::Busy));
    }
}
