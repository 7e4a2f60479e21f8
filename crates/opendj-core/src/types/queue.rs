//! The shared request queue.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::time::Duration;

use chrono::TimeDelta;
use parking_lot::Mutex;

use super::QueueEntry;
use crate::{Error, Result};

/// Ordered list of pending entries, safe to share between tasks.
///
/// Every operation holds the internal lock for its whole duration, so
/// concurrent callers always see the effects in a single total order. No
/// operation blocks on anything but that lock.
#[derive(Debug, Default)]
pub struct Queue {
    items: Mutex<Vec<QueueEntry>>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue seeded with `entries`, front first.
    pub fn with_entries(entries: Vec<QueueEntry>) -> Self {
        Self {
            items: Mutex::new(entries),
        }
    }

    /// Copy of the current contents in queue order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.items.lock().clone()
    }

    /// Get the number of pending entries.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Append an entry at the end of the queue.
    pub fn add(&self, entry: QueueEntry) {
        self.items.lock().push(entry);
    }

    /// Insert an entry at `index`, shifting later entries back.
    ///
    /// An index past the end behaves like [`Queue::add`].
    pub fn insert(&self, entry: QueueEntry, index: isize) -> Result<()> {
        let mut items = self.items.lock();
        let Ok(position) = usize::try_from(index) else {
            return Err(Error::OutOfRange {
                index,
                len: items.len(),
            });
        };

        let position = position.min(items.len());
        items.insert(position, entry);
        Ok(())
    }

    /// Remove and return the entry at `index`.
    pub fn remove_at(&self, index: isize) -> Result<QueueEntry> {
        let mut items = self.items.lock();
        let position = checked_index(index, items.len())?;
        Ok(items.remove(position))
    }

    /// Overwrite the entry at `index`, returning the previous one.
    pub fn replace_at(&self, entry: QueueEntry, index: isize) -> Result<QueueEntry> {
        let mut items = self.items.lock();
        let position = checked_index(index, items.len())?;
        Ok(std::mem::replace(&mut items[position], entry))
    }

    /// Replace only the dedication of the entry at `index`.
    pub fn set_dedication(&self, index: isize, dedication: Option<String>) -> Result<()> {
        let mut items = self.items.lock();
        let position = checked_index(index, items.len())?;
        items[position].dedication = dedication;
        Ok(())
    }

    /// Get a copy of the entry at `index`.
    pub fn entry_at(&self, index: isize) -> Result<QueueEntry> {
        let items = self.items.lock();
        let position = checked_index(index, items.len())?;
        Ok(items[position].clone())
    }

    /// Remove and return the first entry.
    pub fn pop_front(&self) -> Result<QueueEntry> {
        let mut items = self.items.lock();
        if items.is_empty() {
            return Err(Error::EmptyQueue);
        }
        Ok(items.remove(0))
    }

    /// Put an entry back at the head of the queue.
    pub fn push_front(&self, entry: QueueEntry) {
        self.items.lock().insert(0, entry);
    }

    /// Remove every pending entry.
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Indices of all entries submitted by `owner`, ascending.
    pub fn positions_of(&self, owner: &str) -> Vec<usize> {
        self.items
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_owned_by(owner))
            .map(|(index, _)| index)
            .collect()
    }

    /// Estimated time until each of `owner`'s entries starts playing.
    ///
    /// `current_remaining` is what is left of the entry on air; it can be
    /// zero or negative. Each entry ahead in the queue adds its duration.
    pub fn cumulative_wait_for(&self, owner: &str, current_remaining: TimeDelta) -> Vec<TimeDelta> {
        let items = self.items.lock();
        let mut wait = current_remaining;
        let mut waits = Vec::new();

        for entry in items.iter() {
            if entry.is_owned_by(owner) {
                waits.push(wait);
            }
            wait = wait
                .checked_add(&to_delta(entry.media.duration))
                .unwrap_or(TimeDelta::MAX);
        }
        waits
    }
}

impl From<Vec<QueueEntry>> for Queue {
    fn from(entries: Vec<QueueEntry>) -> Self {
        Self::with_entries(entries)
    }
}

/// Validate a caller supplied index against the current length.
fn checked_index(index: isize, len: usize) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&position| position < len)
        .ok_or(Error::OutOfRange { index, len })
}

/// Convert a media duration to a signed delta, saturating on overflow.
pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
