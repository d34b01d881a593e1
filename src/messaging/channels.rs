// Lock-free notification channel between the engine and its host

use crate::messaging::notification::Notification;
use ringbuf::traits::Producer;
use ringbuf::{HeapRb, traits::Split};
use std::sync::Mutex;

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Shared producer side of the notification channel
///
/// Producers on several threads take turns on the mutex; the critical section
/// is a single non-blocking push. When the ring is full the notification is
/// dropped and logged instead.
pub struct NotificationSink {
    tx: Mutex<NotificationProducer>,
}

impl NotificationSink {
    pub fn new(tx: NotificationProducer) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    /// Push a notification, returns false if it was dropped
    pub fn push(&self, notification: Notification) -> bool {
        let mut tx = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match tx.try_push(notification) {
            Ok(()) => true,
            Err(dropped) => {
                log::warn!(target: "Sequencer", "Notification channel full, dropped: {}", dropped);
                false
            }
        }
    }
}
