//! Double-buffered event queues (`spec.md` §5): events written during update `N` are visible to
//! readers during updates `N` and `N+1`, then dropped on the next buffer swap. Grounded on the
//! teacher's `Resources` slot pattern (`resource.rs`) generalized to two generation-tagged
//! buffers per event type, following the double-buffer technique used by
//! `examples/other_examples/.../bevy_legion-src-schedule.rs.rs`'s frame-local bookkeeping.

use std::marker::PhantomData;

/// Controls whether [`Events::update`] (invoked once per `Update` cycle, typically by a
/// system the application schedules at the end of `Main`) drains old events automatically.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum ClearPolicy {
    #[default]
    Automatic,
    Manual,
}

struct EventInstance<E> {
    event: E,
    /// Monotonic id, used by [`EventReader`] to avoid re-reading events it has already seen.
    id: u64,
}

/// Double-buffered storage for one event type `E`.
pub struct Events<E> {
    clear_policy: ClearPolicy,
    buffers: [Vec<EventInstance<E>>; 2],
    /// Index of the buffer currently being written to; the other buffer holds the previous
    /// cycle's events and is still readable until the next [`Events::update`].
    active: usize,
    next_id: u64,
}

impl<E> Default for Events<E> {
    fn default() -> Self {
        Self {
            clear_policy: ClearPolicy::default(),
            buffers: [Vec::new(), Vec::new()],
            active: 0,
            next_id: 0,
        }
    }
}

impl<E> Events<E> {
    pub fn new(clear_policy: ClearPolicy) -> Self {
        Self {
            clear_policy,
            ..Default::default()
        }
    }

    pub fn send(&mut self, event: E) {
        let id = self.next_id;
        self.next_id += 1;
        self.buffers[self.active].push(EventInstance { event, id });
    }

    /// Advances the buffer pair every update regardless of policy, so events always age into and
    /// out of the reader-visible window on schedule; under [`ClearPolicy::Manual`] the draining
    /// buffer's contents survive the swap instead of being dropped, so events keep accumulating
    /// across updates until [`Events::clear`] is called explicitly.
    pub fn update(&mut self) {
        let draining = 1 - self.active;
        if self.clear_policy == ClearPolicy::Automatic {
            self.buffers[draining].clear();
        }
        self.active = draining;
    }

    /// Empties both buffers unconditionally. The escape hatch for [`ClearPolicy::Manual`] event
    /// types, which [`Events::update`] otherwise leaves untouched.
    pub fn clear(&mut self) {
        self.buffers[0].clear();
        self.buffers[1].clear();
    }

    pub fn clear_policy(&self) -> ClearPolicy {
        self.clear_policy
    }

    /// All events from both buffers still within their two-update visibility window, oldest
    /// first.
    fn iter_all(&self) -> impl Iterator<Item = &EventInstance<E>> {
        let inactive = 1 - self.active;
        self.buffers[inactive].iter().chain(self.buffers[self.active].iter())
    }

    pub fn is_empty(&self) -> bool {
        self.buffers[0].is_empty() && self.buffers[1].is_empty()
    }
}

/// Stateless cursor over an [`Events<E>`] buffer; state (`last_seen_id`) lives on the reader
/// instance itself, typically held as a per-system local resource, so two systems reading the
/// same event type do not race or interfere with each other's cursor.
pub struct EventReader<E> {
    last_seen_id: u64,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Default for EventReader<E> {
    fn default() -> Self {
        Self {
            last_seen_id: 0,
            _marker: PhantomData,
        }
    }
}

impl<E> EventReader<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every event not yet observed by this reader, oldest first, and advances the cursor.
    /// Events that already aged out of both buffers (cleared by [`Events::update`]) are simply
    /// absent from `events.iter_all()` and so are never returned, which is what gives events
    /// their two-update visibility window rather than any accounting done here.
    pub fn read<'a>(&mut self, events: &'a Events<E>) -> Vec<&'a E> {
        let mut last = self.last_seen_id;
        let out: Vec<&'a E> = events
            .iter_all()
            .filter(|e| e.id >= self.last_seen_id)
            .map(|e| {
                last = last.max(e.id + 1);
                &e.event
            })
            .collect();
        self.last_seen_id = last;
        out
    }
}

/// Write handle to an event type, analogous to [`crate::resource::Write`] but for events.
pub struct EventWriter<'a, E> {
    events: &'a mut Events<E>,
}

impl<'a, E> EventWriter<'a, E> {
    pub fn new(events: &'a mut Events<E>) -> Self {
        Self { events }
    }

    pub fn send(&mut self, event: E) {
        self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Clone)]
    struct Damage(u32);

    #[test]
    fn reader_sees_events_sent_this_update() {
        let mut events = Events::<Damage>::default();
        let mut reader = EventReader::new();
        events.send(Damage(5));
        assert_eq!(reader.read(&events), vec![&Damage(5)]);
    }

    #[test]
    fn reader_does_not_see_same_event_twice() {
        let mut events = Events::<Damage>::default();
        let mut reader = EventReader::new();
        events.send(Damage(5));
        let _ = reader.read(&events);
        assert!(reader.read(&events).is_empty());
    }

    #[test]
    fn event_visible_across_exactly_two_updates() {
        let mut events = Events::<Damage>::default();
        events.send(Damage(1));
        let mut reader = EventReader::new();

        // Cycle N: visible.
        assert_eq!(reader.read(&events).len(), 1);
        events.update();
        // Cycle N+1: still visible to a reader that hasn't consumed it yet.
        let mut late_reader = EventReader::new();
        assert_eq!(late_reader.read(&events).len(), 1);
        events.update();
        // Cycle N+2: dropped.
        let mut too_late_reader = EventReader::new();
        assert!(too_late_reader.read(&events).is_empty());
    }

    #[test]
    fn manual_clear_policy_accumulates_across_updates_until_cleared() {
        let mut events = Events::<Damage>::new(ClearPolicy::Manual);
        events.send(Damage(1));
        events.update();
        events.send(Damage(2));
        events.update();

        // Neither update swept anything away: both sends are still live, unlike the Automatic
        // case where the first would have aged out by now.
        let mut reader = EventReader::new();
        assert_eq!(reader.read(&events).len(), 2);
        assert!(!events.is_empty());

        events.clear();
        assert!(events.is_empty());
        let mut after_clear = EventReader::new();
        assert!(after_clear.read(&events).is_empty());
    }

    #[test]
    fn automatic_clear_policy_still_sweeps_on_update() {
        let mut events = Events::<Damage>::new(ClearPolicy::Automatic);
        events.send(Damage(1));
        events.update();
        events.update();
        assert!(events.is_empty());
    }
}
