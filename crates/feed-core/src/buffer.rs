//! Bounded newest-first event buffer

use std::collections::VecDeque;

use crate::event::Event;

/// Default number of events retained per client
pub const DEFAULT_CAPACITY: usize = 200;

/// Most recently received events, newest first
///
/// Insertion prepends; once capacity is exceeded the oldest events are
/// dropped. Retained events are never reordered.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: VecDeque<Event>,
    capacity: usize,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend an event, dropping the oldest ones beyond capacity
    pub fn push(&mut self, event: Event) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate newest first
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Snapshot of all events, newest first
    pub fn to_vec(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// Events whose type is one of `types`
    pub fn by_type<S: AsRef<str>>(&self, types: &[S]) -> Vec<Event> {
        self.events
            .iter()
            .filter(|event| types.iter().any(|t| t.as_ref() == event.event_type))
            .cloned()
            .collect()
    }

    /// Events visible to `tenant_id` (own tenant plus wildcard); all events when `None`
    pub fn for_tenant(&self, tenant_id: Option<&str>) -> Vec<Event> {
        match tenant_id {
            None => self.to_vec(),
            Some(tenant_id) => self
                .events
                .iter()
                .filter(|event| event.visible_to(tenant_id))
                .cloned()
                .collect(),
        }
    }
}
