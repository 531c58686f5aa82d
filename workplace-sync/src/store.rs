//! In-memory notification collection.
//!
//! Newest entries sit at the front. The unread count is always derived from
//! the entries, so it cannot drift from `count(is_read == false)`.

use workplace_core::types::{Notification, NotificationId};

/// What [`NotificationStore::prepend`] did with an incoming entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrependOutcome {
    /// The entry was new and now sits at the front.
    Inserted,
    /// An entry with the same id existed; it was replaced and moved to the front.
    Replaced,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationStore {
    entries: Vec<Notification>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full replace with a server result set (no merge).
    pub fn replace_all(&mut self, notifications: Vec<Notification>) {
        self.entries = notifications;
    }

    /// Put a pushed notification at the front.
    ///
    /// With `dedup` off an id that is already present produces a second entry.
    pub fn prepend(&mut self, notification: Notification, dedup: bool) -> PrependOutcome {
        let existing = dedup
            .then(|| self.position(&notification.id))
            .flatten();
        let outcome = match existing {
            Some(index) => {
                self.entries.remove(index);
                PrependOutcome::Replaced
            }
            None => PrependOutcome::Inserted,
        };
        self.entries.insert(0, notification);
        outcome
    }

    /// Flag every entry with `id` as read.
    ///
    /// Returns `None` when no entry matches, otherwise whether any entry
    /// flipped from unread to read.
    pub fn mark_read(&mut self, id: &NotificationId) -> Option<bool> {
        let mut found = false;
        let mut flipped = false;
        for entry in self.entries.iter_mut().filter(|n| &n.id == id) {
            found = true;
            if !entry.is_read {
                entry.is_read = true;
                flipped = true;
            }
        }
        found.then_some(flipped)
    }

    /// Remove the first entry with `id`.
    pub fn remove(&mut self, id: &NotificationId) -> Option<Notification> {
        let index = self.position(id)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.entries.iter().find(|n| &n.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.is_read).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, id: &NotificationId) -> Option<usize> {
        self.entries.iter().position(|n| &n.id == id)
    }
}
