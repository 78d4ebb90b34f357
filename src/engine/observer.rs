//! Change observers and notification control.
//!
//! # Responsibilities
//! - Keep per-key lists of observers without owning them
//! - Dispatch `(key, old, new)` changes synchronously
//! - Queue changes while notifications are suppressed and flush them in key order
//!
//! # Design Decisions
//! - Observers are held as `Weak` handles; the engine never keeps one alive
//! - Identity is the allocation address, so re-adding the same `Rc` is a no-op
//! - The backlog coalesces per key: first old value, last new value
//! - Callback errors are returned to the caller, not swallowed

use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use crate::engine::error::{EngineError, ObserverError};
use crate::engine::value::Value;

/// Receives effective-value changes for the keys it is registered on.
///
/// `old` is `None` when the key was previously undefined, `new` is `None`
/// when the key has just become undefined.
///
/// Callbacks run inline, inside the engine call that caused the change. They
/// cannot reach the engine itself, which is mutably borrowed by that caller.
pub trait Observer {
    fn on_setting_changed(
        &self,
        key: &str,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&str, Option<&Value>, Option<&Value>) -> Result<(), ObserverError>,
{
    fn on_setting_changed(
        &self,
        key: &str,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<(), ObserverError> {
        self(key, old, new)
    }
}

/// One change of a key's effective value.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl Notification {
    pub fn new(key: impl Into<String>, old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            key: key.into(),
            old,
            new,
        }
    }

    /// False when old and new are the same value (or both absent).
    pub fn is_change(&self) -> bool {
        self.old != self.new
    }
}

fn identity<T: ?Sized>(ptr: *const T) -> *const () {
    ptr as *const ()
}

/// Non-owning key → observers association.
#[derive(Default)]
pub struct ObserverRegistry {
    by_key: HashMap<String, Vec<Weak<dyn Observer>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` for `key`. Registering twice has no extra effect.
    pub fn add<O: Observer + 'static>(&mut self, key: impl Into<String>, observer: &Rc<O>) {
        let id = identity(Rc::as_ptr(observer));
        let list = self.by_key.entry(key.into()).or_default();
        if list.iter().any(|w| identity(w.as_ptr()) == id) {
            return;
        }
        let handle: Weak<O> = Rc::downgrade(observer);
        list.push(handle);
    }

    /// Remove one observer. Returns whether it was registered.
    pub fn remove<O: Observer + 'static>(&mut self, key: &str, observer: &Rc<O>) -> bool {
        let id = identity(Rc::as_ptr(observer));
        let Some(list) = self.by_key.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|w| identity(w.as_ptr()) != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.by_key.remove(key);
        }
        removed
    }

    /// Remove every observer for `key`, returning how many were registered.
    pub fn remove_all(&mut self, key: &str) -> usize {
        self.by_key.remove(key).map(|list| list.len()).unwrap_or(0)
    }

    /// Number of live observers for `key`.
    pub fn count(&self, key: &str) -> usize {
        self.by_key
            .get(key)
            .map(|list| list.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Call every live observer of `notification.key`.
    ///
    /// Dropped observers are pruned. Stops at the first callback error.
    pub fn dispatch(&mut self, notification: &Notification) -> Result<usize, EngineError> {
        let Some(list) = self.by_key.get_mut(&notification.key) else {
            return Ok(0);
        };

        let before = list.len();
        list.retain(|w| w.strong_count() > 0);
        if list.len() != before {
            tracing::debug!(
                key = %notification.key,
                pruned = before - list.len(),
                "Dropped observers pruned"
            );
        }

        // Upgrade up front so callbacks dropping other observers cannot
        // disturb this round.
        let live: Vec<Rc<dyn Observer>> = list.iter().filter_map(Weak::upgrade).collect();
        if live.is_empty() {
            self.by_key.remove(&notification.key);
            return Ok(0);
        }

        for observer in &live {
            observer
                .on_setting_changed(
                    &notification.key,
                    notification.old.as_ref(),
                    notification.new.as_ref(),
                )
                .map_err(|source| EngineError::Observer {
                    key: notification.key.clone(),
                    source,
                })?;
        }
        Ok(live.len())
    }
}

#[derive(Debug)]
struct Pending {
    old: Option<Value>,
    new: Option<Value>,
}

/// Suppress / resume switch with a key-ordered backlog.
#[derive(Debug, Default)]
pub struct NotificationController {
    suppressed: bool,
    backlog: BTreeMap<String, Pending>,
}

impl NotificationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn suppress(&mut self) {
        self.suppressed = true;
    }

    /// Add a change to the backlog, merging with an earlier change of the same key.
    pub fn queue(&mut self, notification: Notification) {
        let Notification { key, old, new } = notification;
        match self.backlog.get_mut(&key) {
            Some(pending) => pending.new = new,
            None => {
                self.backlog.insert(key, Pending { old, new });
            }
        }
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Leave suppressed mode, draining the backlog in key order.
    ///
    /// Keys whose net change is nothing are dropped.
    pub fn resume(&mut self) -> Vec<Notification> {
        self.suppressed = false;
        std::mem::take(&mut self.backlog)
            .into_iter()
            .map(|(key, pending)| Notification::new(key, pending.old, pending.new))
            .filter(Notification::is_change)
            .collect()
    }
}
