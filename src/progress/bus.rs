//! Publish/subscribe distribution of progress events
//!
//! Listeners join rooms keyed by job id (and, for subject-wide broadcasts,
//! by subject id). Delivery is best-effort: a listener whose receiver is
//! gone is pruned on the next publish, never retried. Subscriptions and jobs
//! have independent lifecycles; publishing into an empty room is a no-op.

use crate::progress::ProgressEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Opaque handle identifying one listener within one room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A live subscription: keep the receiver, read events until the job ends
/// or you drop it
pub struct Subscription {
    pub id: ListenerId,
    pub events: mpsc::UnboundedReceiver<ProgressEvent>,
}

type Room = HashMap<ListenerId, mpsc::UnboundedSender<ProgressEvent>>;

/// Job- and subject-keyed event rooms
///
/// The room maps are the one piece of state shared by every running job;
/// the mutex makes subscribe-and-deliver atomic per publish.
#[derive(Debug, Default)]
pub struct ProgressBus {
    job_rooms: Mutex<HashMap<String, Room>>,
    subject_rooms: Mutex<HashMap<String, Room>>,
    next_listener: AtomicU64,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    /// Joins the room for one job
    pub fn subscribe(&self, job_id: &str) -> Subscription {
        let id = self.next_id();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut rooms = self.job_rooms.lock().unwrap();
        rooms.entry(job_id.to_string()).or_default().insert(id, tx);

        tracing::debug!(job_id, listener = id.0, "listener joined job room");
        Subscription { id, events: rx }
    }

    /// Leaves the room for one job; the room itself disappears with its
    /// last listener
    pub fn unsubscribe(&self, job_id: &str, listener: ListenerId) {
        let mut rooms = self.job_rooms.lock().unwrap();
        if let Some(room) = rooms.get_mut(job_id) {
            room.remove(&listener);
            if room.is_empty() {
                rooms.remove(job_id);
            }
        }
    }

    /// Delivers an event to every current listener of the job
    ///
    /// Listeners that dropped their receiver are pruned here. No listeners
    /// is not an error.
    pub fn publish(&self, job_id: &str, event: ProgressEvent) {
        let mut rooms = self.job_rooms.lock().unwrap();
        deliver(&mut rooms, job_id, event);
    }

    /// Joins the room for all of a subject's notifications
    pub fn subscribe_subject(&self, subject_id: &str) -> Subscription {
        let id = self.next_id();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut rooms = self.subject_rooms.lock().unwrap();
        rooms
            .entry(subject_id.to_string())
            .or_default()
            .insert(id, tx);

        Subscription { id, events: rx }
    }

    /// Leaves a subject room
    pub fn unsubscribe_subject(&self, subject_id: &str, listener: ListenerId) {
        let mut rooms = self.subject_rooms.lock().unwrap();
        if let Some(room) = rooms.get_mut(subject_id) {
            room.remove(&listener);
            if room.is_empty() {
                rooms.remove(subject_id);
            }
        }
    }

    /// Delivers an event to every session watching the subject, outside any
    /// single job
    pub fn broadcast_to_subject(&self, subject_id: &str, event: ProgressEvent) {
        let mut rooms = self.subject_rooms.lock().unwrap();
        deliver(&mut rooms, subject_id, event);
    }

    /// Number of live listeners on a job room
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        let rooms = self.job_rooms.lock().unwrap();
        rooms.get(job_id).map(|room| room.len()).unwrap_or(0)
    }
}

fn deliver(rooms: &mut HashMap<String, Room>, key: &str, event: ProgressEvent) {
    let Some(room) = rooms.get_mut(key) else {
        tracing::trace!(key, "publish with no subscribers");
        return;
    };

    let mut dropped: Vec<ListenerId> = Vec::new();
    for (listener, tx) in room.iter() {
        if tx.send(event.clone()).is_err() {
            dropped.push(*listener);
        }
    }

    for listener in dropped {
        tracing::debug!(key, listener = ?listener, "pruning disconnected listener");
        room.remove(&listener);
    }

    if room.is_empty() {
        rooms.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressKind;

    fn event(job_id: &str, message: &str) -> ProgressEvent {
        ProgressEvent::progress(job_id, 1, 2, message)
    }

    #[tokio::test]
    async fn test_delivers_to_all_subscribers() {
        let bus = ProgressBus::new();
        let mut a = bus.subscribe("j1");
        let mut b = bus.subscribe("j1");

        bus.publish("j1", event("j1", "step"));

        assert_eq!(a.events.recv().await.unwrap().message, "step");
        assert_eq!(b.events.recv().await.unwrap().message, "step");
    }

    #[tokio::test]
    async fn test_rooms_are_job_scoped() {
        let bus = ProgressBus::new();
        let mut a = bus.subscribe("j1");
        let mut b = bus.subscribe("j2");

        bus.publish("j1", event("j1", "only j1"));

        assert_eq!(a.events.recv().await.unwrap().message, "only j1");
        assert!(b.events.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = ProgressBus::new();
        bus.publish("nobody-home", event("nobody-home", "hello"));
        assert_eq!(bus.subscriber_count("nobody-home"), 0);
    }

    #[tokio::test]
    async fn test_unsubscribed_listener_receives_nothing() {
        let bus = ProgressBus::new();
        let mut kept = bus.subscribe("j1");
        let mut gone = bus.subscribe("j1");

        bus.unsubscribe("j1", gone.id);
        bus.publish("j1", event("j1", "after-leave"));

        assert_eq!(kept.events.recv().await.unwrap().message, "after-leave");
        assert!(gone.events.try_recv().is_err());
    }

    #[test]
    fn test_empty_room_is_removed() {
        let bus = ProgressBus::new();
        let sub = bus.subscribe("j1");
        assert_eq!(bus.subscriber_count("j1"), 1);

        bus.unsubscribe("j1", sub.id);
        assert_eq!(bus.subscriber_count("j1"), 0);

        let rooms = bus.job_rooms.lock().unwrap();
        assert!(!rooms.contains_key("j1"));
    }

    #[tokio::test]
    async fn test_dropped_receiver_pruned_on_publish() {
        let bus = ProgressBus::new();
        let sub = bus.subscribe("j1");
        drop(sub.events);

        bus.publish("j1", event("j1", "one"));

        // The dead listener is gone and the room collapsed with it.
        assert_eq!(bus.subscriber_count("j1"), 0);
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let bus = ProgressBus::new();
        let mut sub = bus.subscribe("j1");

        for i in 0..5 {
            bus.publish("j1", event("j1", &format!("step-{}", i)));
        }

        for i in 0..5 {
            let received = sub.events.recv().await.unwrap();
            assert_eq!(received.message, format!("step-{}", i));
        }
    }

    #[tokio::test]
    async fn test_subject_broadcast_reaches_subject_room_only() {
        let bus = ProgressBus::new();
        let mut subject_sub = bus.subscribe_subject("user-1");
        let mut job_sub = bus.subscribe("j1");

        bus.broadcast_to_subject("user-1", event("j1", "account notice"));

        assert_eq!(
            subject_sub.events.recv().await.unwrap().message,
            "account notice"
        );
        assert!(job_sub.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subject_unsubscribe() {
        let bus = ProgressBus::new();
        let sub = bus.subscribe_subject("user-1");
        bus.unsubscribe_subject("user-1", sub.id);

        bus.broadcast_to_subject("user-1", event("j1", "x"));

        let rooms = bus.subject_rooms.lock().unwrap();
        assert!(rooms.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_event_passes_through() {
        let bus = ProgressBus::new();
        let mut sub = bus.subscribe("j1");

        bus.publish("j1", ProgressEvent::complete("j1", true, 2, 2, 50, vec![]));

        let received = sub.events.recv().await.unwrap();
        assert_eq!(received.kind, ProgressKind::Complete);
        assert!(received.is_terminal());
    }
}
