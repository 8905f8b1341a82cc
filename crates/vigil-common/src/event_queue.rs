// event_queue.rs — Decoded-event queueing between the network layer and
// the frame driver
//
// The network layer decodes wire bytes on its own thread and enqueues
// finished records here. The frame driver drains the queue once per
// frame; nothing in this module blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use crate::proto::ServerEvent;

/// Bounded queue of decoded server events.
///
/// When full, new events are dropped and counted (the producer never
/// blocks the decoder thread).
pub struct EventQueue {
    sender: Sender<ServerEvent>,
    receiver: Receiver<ServerEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle for the decoder side.
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Handle for the frame-driver side.
    pub fn receiver(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct EventSender {
    sender: Sender<ServerEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Enqueue an event; returns false if the queue was full and the
    /// event was dropped.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 1 {
                    log::warn!("event queue full, dropping decoded events");
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[derive(Clone)]
pub struct EventReceiver {
    receiver: Receiver<ServerEvent>,
}

impl EventReceiver {
    /// Take everything currently queued, in arrival order.
    pub fn drain(&self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.receiver.try_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::SnapshotHeader;

    #[test]
    fn test_send_and_drain_in_order() {
        let q = EventQueue::new(8);
        let tx = q.sender();
        let rx = q.receiver();

        for i in 0..3 {
            assert!(tx.send(ServerEvent::Snapshot(SnapshotHeader {
                time: i as f64,
                ..Default::default()
            })));
        }

        let times: Vec<f64> = rx
            .drain()
            .map(|e| match e {
                ServerEvent::Snapshot(h) => h.time,
                _ => panic!("unexpected event"),
            })
            .collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let q = EventQueue::new(2);
        let tx = q.sender();

        assert!(tx.send(ServerEvent::Disconnect { reason: "a".into() }));
        assert!(tx.send(ServerEvent::Disconnect { reason: "b".into() }));
        // Queue is full; this one is dropped, not blocked on.
        assert!(!tx.send(ServerEvent::Disconnect { reason: "c".into() }));
        assert_eq!(q.dropped(), 1);

        // The queued events are intact.
        assert_eq!(q.receiver().drain().count(), 2);
    }
}
