//! Shared utilities for integration tests.

use std::cell::RefCell;

use confstack::{Notification, Observer, ObserverError, Value};

/// Observer that remembers every change it is told about.
#[derive(Default)]
pub struct RecordingObserver {
    seen: RefCell<Vec<Notification>>,
}

impl RecordingObserver {
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.borrow_mut())
    }

    #[allow(dead_code)]
    pub fn count(&self) -> usize {
        self.seen.borrow().len()
    }
}

impl Observer for RecordingObserver {
    fn on_setting_changed(
        &self,
        key: &str,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<(), ObserverError> {
        self.seen
            .borrow_mut()
            .push(Notification::new(key, old.cloned(), new.cloned()));
        Ok(())
    }
}

/// Shorthand for an expected notification.
#[allow(dead_code)]
pub fn change(key: &str, old: Option<Value>, new: Option<Value>) -> Notification {
    Notification::new(key, old, new)
}
