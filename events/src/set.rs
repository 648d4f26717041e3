use crate::{Event, EventId};
use std::collections::{HashSet, VecDeque};

/// Newest-first notification list with an id index for O(1) duplicate checks.
#[derive(Debug, Default, Clone)]
pub struct EventSet {
    /// Primary storage, index 0 is the newest event.
    events: VecDeque<Event>,

    /// Secondary index over `events` ids.
    ids: HashSet<EventId>,
}

impl EventSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event at the front. Returns `false` and leaves the set untouched
    /// when an event with the same id is already present.
    pub fn insert(&mut self, event: Event) -> bool {
        if !self.ids.insert(event.id.clone()) {
            return false;
        }
        self.events.push_front(event);
        true
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Ids newest first.
    pub fn ids(&self) -> Vec<EventId> {
        self.events.iter().map(|event| event.id.clone()).collect()
    }

    pub fn unread_count(&self) -> usize {
        self.events.iter().filter(|event| !event.is_read).count()
    }

    /// Mark one event as read. Returns `true` if it was unread before.
    pub fn mark_read(&mut self, id: &EventId) -> bool {
        match self.events.iter_mut().find(|event| &event.id == id) {
            Some(event) if !event.is_read => {
                event.is_read = true;
                true
            }
            _ => false,
        }
    }

    /// Mark every event as read and return how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for event in self.events.iter_mut().filter(|event| !event.is_read) {
            event.is_read = true;
            changed += 1;
        }
        changed
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.ids.clear();
    }
}
