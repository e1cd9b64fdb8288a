//! Death notifications with owned subscription handles.
//!
//! A [`DeathSubscription`] removes itself from the [`DeathWatch`] when dropped,
//! so a hookpoint that loses its occupant or a keep that replaces its lord can
//! never leave a dangling listener behind.

use crate::types::{EntityId, KeepId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Who wants to hear about a death.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchTarget {
    Lord(KeepId),
    HookPointOccupant {
        keep: KeepId,
        component: u16,
        hookpoint: u8,
    },
}

impl WatchTarget {
    pub fn keep(&self) -> KeepId {
        match self {
            WatchTarget::Lord(keep) => *keep,
            WatchTarget::HookPointOccupant { keep, .. } => *keep,
        }
    }
}

type Listeners = HashMap<EntityId, Vec<(u64, WatchTarget)>>;

#[derive(Default)]
struct WatchInner {
    next_token: u64,
    listeners: Listeners,
}

#[derive(Clone, Default)]
pub struct DeathWatch {
    inner: Arc<Mutex<WatchInner>>,
}

impl DeathWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, entity: EntityId, target: WatchTarget) -> DeathSubscription {
        let mut inner = self.inner.lock();
        inner.next_token += 1;
        let token = inner.next_token;
        inner
            .listeners
            .entry(entity)
            .or_default()
            .push((token, target));
        DeathSubscription {
            watch: Arc::downgrade(&self.inner),
            entity,
            token,
            target,
        }
    }

    /// Snapshot of every target watching `entity`. The lock is released
    /// before return so callers may lock keeps freely.
    pub fn watchers(&self, entity: EntityId) -> Vec<WatchTarget> {
        self.inner
            .lock()
            .listeners
            .get(&entity)
            .map(|v| v.iter().map(|(_, t)| *t).collect())
            .unwrap_or_default()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.values().map(Vec::len).sum()
    }
}

/// Live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct DeathSubscription {
    watch: Weak<Mutex<WatchInner>>,
    entity: EntityId,
    token: u64,
    target: WatchTarget,
}

impl DeathSubscription {
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn target(&self) -> WatchTarget {
        self.target
    }
}

impl std::fmt::Debug for WatchInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchInner")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Drop for DeathSubscription {
    fn drop(&mut self) {
        let Some(inner) = self.watch.upgrade() else {
            return;
        };
        let mut inner = inner.lock();
        if let Some(list) = inner.listeners.get_mut(&self.entity) {
            list.retain(|(token, _)| *token != self.token);
            if list.is_empty() {
                inner.listeners.remove(&self.entity);
            }
        }
    }
}
