//! The connection registry: identity key → live connection.
//!
//! The server keeps two of these, one for world channels and one for chat
//! channels. Both are keyed by the same user-facing string (see
//! [`Identity::key`](crate::Identity::key)), so a router holding a user id
//! can reach either channel of that user.
//!
//! # Concurrency note
//!
//! Each registry is one `std::sync::Mutex` around a `HashMap`. No method
//! awaits while holding the lock, and lookups hand out `Arc` clones so
//! callers can do their network I/O after the lock is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::SessionError;

/// Concurrency-safe directory of connections of type `C`.
pub struct ConnectionRegistry<C> {
    entries: Mutex<HashMap<String, Arc<C>>>,
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<C> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding this lock leaves the map intact, so keep going.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<C>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up the connection registered under `key`.
    pub fn get(&self, key: &str) -> Option<Arc<C>> {
        self.lock().get(key).cloned()
    }

    /// Like [`get`](Self::get), but a miss is an error.
    ///
    /// # Errors
    /// [`SessionError::ConnectionNotFound`] if nothing is registered.
    pub fn require(&self, key: &str) -> Result<Arc<C>, SessionError> {
        self.get(key)
            .ok_or_else(|| SessionError::ConnectionNotFound(key.to_owned()))
    }

    /// Registers `conn` under `key`, returning whatever it replaced.
    pub fn set(&self, key: impl Into<String>, conn: Arc<C>) -> Option<Arc<C>> {
        self.lock().insert(key.into(), conn)
    }

    /// Removes and returns the entry under `key`.
    pub fn delete(&self, key: &str) -> Option<Arc<C>> {
        self.lock().remove(key)
    }

    /// Removes the entry only if it is `conn` itself.
    ///
    /// Returns `true` if something was removed. A connection that was
    /// superseded by a reconnect must not evict its successor.
    pub fn delete_if_current(&self, key: &str, conn: &C) -> bool {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(current) if std::ptr::eq(Arc::as_ptr(current), conn) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// `true` if `conn` is the object currently registered under `key`.
    pub fn is_current(&self, key: &str, conn: &C) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), conn))
    }

    /// A snapshot of every registered connection.
    pub fn get_all(&self) -> Vec<Arc<C>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
