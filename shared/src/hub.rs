//! Single-writer, many-reader state change notifications.
//!
//! A [`Hub`] sits next to a piece of shared state (the animation cursor, the virtual joystick)
//! and fans out change notifications per field. Readers `subscribe` to a field and later drain
//! their own mailbox on the simulation thread, so no locks and no borrowed callbacks are needed.
//!
//! Notes
//! - Publishing is only done on an actual change; the owner of the state decides that.
//! - Each subscriber must `unsubscribe` on teardown, otherwise its mailbox keeps growing.

use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug)]
struct Subscriber<F, V> {
    id: SubscriptionId,
    /// `None` listens to every field.
    field: Option<F>,
    pending: VecDeque<(F, V)>,
}

#[derive(Debug)]
pub struct Hub<F, V> {
    next_id: u64,
    subscribers: Vec<Subscriber<F, V>>,
}

impl<F, V> Default for Hub<F, V> {
    fn default() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }
}

impl<F: Copy + Eq, V: Clone> Hub<F, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, field: F) -> SubscriptionId {
        self.insert(Some(field))
    }

    pub fn subscribe_all(&mut self) -> SubscriptionId {
        self.insert(None)
    }

    fn insert(&mut self, field: Option<F>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            field,
            pending: VecDeque::new(),
        });
        id
    }

    /// Returns `false` if `id` was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn publish(&mut self, field: F, value: V) {
        for sub in &mut self.subscribers {
            if sub.field.is_none_or(|f| f == field) {
                sub.pending.push_back((field, value.clone()));
            }
        }
    }

    /// Take every pending change for `id`, oldest first.
    pub fn drain(&mut self, id: SubscriptionId) -> Vec<(F, V)> {
        self.subscribers
            .iter_mut()
            .find(|s| s.id == id)
            .map(|s| s.pending.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Field {
        A,
        B,
    }

    #[test]
    fn subscribers_only_see_their_field() {
        let mut hub: Hub<Field, i32> = Hub::new();
        let a = hub.subscribe(Field::A);
        let all = hub.subscribe_all();

        hub.publish(Field::A, 1);
        hub.publish(Field::B, 2);

        assert_eq!(hub.drain(a), vec![(Field::A, 1)]);
        assert_eq!(hub.drain(all), vec![(Field::A, 1), (Field::B, 2)]);
        // Drained once, gone.
        assert!(hub.drain(a).is_empty());
    }

    #[test]
    fn unsubscribe_drops_mailbox_exactly_once() {
        let mut hub: Hub<Field, i32> = Hub::new();
        let a = hub.subscribe(Field::A);
        assert_eq!(hub.subscriber_count(), 1);

        assert!(hub.unsubscribe(a));
        assert!(!hub.unsubscribe(a));
        assert_eq!(hub.subscriber_count(), 0);

        // Nothing queues for a removed subscriber.
        hub.publish(Field::A, 5);
        assert!(hub.drain(a).is_empty());
    }

    #[test]
    fn ids_are_not_reused() {
        let mut hub: Hub<Field, i32> = Hub::new();
        let a = hub.subscribe(Field::A);
        hub.unsubscribe(a);
        let b = hub.subscribe(Field::A);
        assert_ne!(a, b);
    }
}
