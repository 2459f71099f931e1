//! Change notification for [`Midi`](super::Midi) containers
//!
//! Listeners run synchronously inside `add`/`remove`, in mutation order.
//! A listener only sees the event; it cannot reach the container that is
//! notifying it.

use crate::models::Midel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiChange<'a> {
    Added(&'a Midel),
    Removed(&'a Midel),
}

impl<'a> MidiChange<'a> {
    pub fn event(&self) -> &'a Midel {
        match *self {
            MidiChange::Added(event) | MidiChange::Removed(event) => event,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, MidiChange::Added(_))
    }
}

/// Handle returned by [`Midi::subscribe`](super::Midi::subscribe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

pub(crate) type Listener = Box<dyn FnMut(&MidiChange<'_>)>;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub fn subscribe(&mut self, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn notify(&mut self, change: &MidiChange<'_>) {
        for (_, listener) in self.entries.iter_mut() {
            listener(change);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
