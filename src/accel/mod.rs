pub mod accelerator;

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};

pub use accelerator::{Accelerator, Modifiers};

/// Same key combination claimed by two owners, or an accelerator path already
/// owned by someone else. The existing binding is never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shortcut {accelerator} is bound to both '{existing}' and '{requested}'")]
pub struct ShortcutConflict {
    pub accelerator: String,
    pub existing: String,
    pub requested: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "accel-listener-{}", self.0)
    }
}

/// Proof of a change subscription on one accelerator path.
///
/// Not `Clone`: the only way to release the subscription is to hand the
/// handle back to [`AccelMap::disconnect`].
#[derive(Debug, PartialEq, Eq)]
pub struct ListenerHandle {
    id: ListenerId,
    path: String,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Delivered to the owner of `listener` when the binding at `path` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelChanged {
    pub listener: ListenerId,
    pub path: String,
    pub accelerator: Option<Accelerator>,
}

struct AccelEntry {
    accelerator: Option<Accelerator>,
    owner: String,
}

/// Host accelerator table: accelerator path → key combination.
///
/// Owned by the host and passed explicitly to whoever registers bindings.
/// Listeners are plain subscriptions; change delivery returns the
/// notifications so the caller routes them on its own dispatch thread.
#[derive(Default)]
pub struct AccelMap {
    entries: HashMap<String, AccelEntry>,
    listeners: HashMap<ListenerId, String>,
    next_listener: u64,
}

impl fmt::Debug for AccelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccelMap")
            .field("entry_count", &self.entries.len())
            .field("listener_count", &self.listeners.len())
            .finish()
    }
}

impl AccelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `path` for `owner`. Fails when the path belongs to a different
    /// owner or when another path already uses the same key combination.
    ///
    /// An entry created by [`AccelMap::change_entry`] before anyone
    /// registered the path is owned by the path itself and is taken over.
    /// Registering the same owner twice shares the binding.
    pub fn register(
        &mut self,
        path: &str,
        accelerator: Accelerator,
        owner: &str,
    ) -> Result<Vec<AccelChanged>, ShortcutConflict> {
        if let Some(entry) = self.entries.get(path) {
            if entry.owner != owner && entry.owner != path {
                return Err(ShortcutConflict {
                    accelerator: accelerator.to_string(),
                    existing: entry.owner.clone(),
                    requested: owner.to_owned(),
                });
            }
        }
        self.apply(path, Some(accelerator), owner)
    }

    /// External change of an existing or new binding, e.g. the user editing
    /// the shortcut through the host. `None` clears the binding.
    pub fn change_entry(
        &mut self,
        path: &str,
        accelerator: Option<Accelerator>,
    ) -> Result<Vec<AccelChanged>, ShortcutConflict> {
        let owner = self
            .entries
            .get(path)
            .map(|e| e.owner.clone())
            .unwrap_or_else(|| path.to_owned());
        self.apply(path, accelerator, &owner)
    }

    pub fn remove_entry(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn lookup(&self, path: &str) -> Option<&Accelerator> {
        self.entries.get(path).and_then(|e| e.accelerator.as_ref())
    }

    /// Path currently bound to `accelerator`, if any.
    pub fn find_path(&self, accelerator: &Accelerator) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, e)| e.accelerator.as_ref() == Some(accelerator))
            .map(|(path, _)| path.as_str())
    }

    pub fn connect(&mut self, path: &str) -> ListenerHandle {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.insert(id, path.to_owned());
        trace!(%id, path, "accelerator listener connected");
        ListenerHandle {
            id,
            path: path.to_owned(),
        }
    }

    /// Returns false if the subscription was not registered in this map.
    pub fn disconnect(&mut self, handle: ListenerHandle) -> bool {
        let removed = self.listeners.remove(&handle.id).is_some();
        trace!(id = %handle.id, removed, "accelerator listener disconnected");
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Listeners still subscribed to `path`.
    pub fn listeners_on(&self, path: &str) -> usize {
        self.listeners.values().filter(|p| p.as_str() == path).count()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn apply(
        &mut self,
        path: &str,
        accelerator: Option<Accelerator>,
        owner: &str,
    ) -> Result<Vec<AccelChanged>, ShortcutConflict> {
        if let Some(accel) = &accelerator {
            let clash = self.entries.iter().find(|(other, e)| {
                other.as_str() != path && e.accelerator.as_ref() == Some(accel)
            });
            if let Some((_, existing)) = clash {
                return Err(ShortcutConflict {
                    accelerator: accel.to_string(),
                    existing: existing.owner.clone(),
                    requested: owner.to_owned(),
                });
            }
        }

        let previous = self.entries.insert(
            path.to_owned(),
            AccelEntry {
                accelerator: accelerator.clone(),
                owner: owner.to_owned(),
            },
        );
        if previous.is_some_and(|p| p.accelerator == accelerator) {
            return Ok(Vec::new());
        }

        debug!(
            path,
            accelerator = ?accelerator.as_ref().map(ToString::to_string),
            "accelerator changed"
        );

        let mut notifications: Vec<AccelChanged> = self
            .listeners
            .iter()
            .filter(|(_, p)| p.as_str() == path)
            .map(|(id, _)| AccelChanged {
                listener: *id,
                path: path.to_owned(),
                accelerator: accelerator.clone(),
            })
            .collect();
        notifications.sort_by_key(|n| n.listener);
        Ok(notifications)
    }
}
