// Message Dispatcher - Fan-out of played events to external listeners
// Channel, meta and sysex streams plus the sequencer's own notifications

use crate::messaging::{Notification, NotificationCategory, NotificationSink};
use crate::midi::event::{ChannelMessage, MetaMessage, MidiMessage, SysExMessage};
use arc_swap::ArcSwap;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned by every `subscribe_*` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Copy-on-write subscriber list
///
/// Dispatch works on a snapshot, so listeners may subscribe or unsubscribe
/// from inside a callback without blocking the tick thread.
struct Subscribers<T: ?Sized> {
    list: ArcSwap<Vec<(ListenerId, Listener<T>)>>,
}

impl<T: ?Sized> Subscribers<T> {
    fn new() -> Self {
        Self {
            list: ArcSwap::from_pointee(Vec::new()),
        }
    }

    fn add(&self, id: ListenerId, listener: Listener<T>) {
        self.list.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push((id, Arc::clone(&listener)));
            next
        });
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.list.rcu(|current| {
            let next: Vec<_> = current.iter().filter(|(i, _)| *i != id).cloned().collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    fn len(&self) -> usize {
        self.list.load().len()
    }
}

/// Played-event fan-out with panic isolation
///
/// A panicking listener is reported on the notification side channel and
/// skipped; the remaining listeners still run.
pub struct MessageDispatcher {
    channel: Subscribers<ChannelMessage>,
    meta: Subscribers<MetaMessage>,
    sysex: Subscribers<SysExMessage>,
    chased: Subscribers<[ChannelMessage]>,
    stopped: Subscribers<[ChannelMessage]>,
    completed: Subscribers<()>,
    next_id: AtomicU64,
    notifications: NotificationSink,
}

impl MessageDispatcher {
    pub fn new(notifications: NotificationSink) -> Self {
        Self {
            channel: Subscribers::new(),
            meta: Subscribers::new(),
            sysex: Subscribers::new(),
            chased: Subscribers::new(),
            stopped: Subscribers::new(),
            completed: Subscribers::new(),
            next_id: AtomicU64::new(1),
            notifications,
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn subscribe_channel<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.channel.add(id, Arc::new(listener));
        id
    }

    pub fn subscribe_meta<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MetaMessage) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.meta.add(id, Arc::new(listener));
        id
    }

    pub fn subscribe_sysex<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SysExMessage) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.sysex.add(id, Arc::new(listener));
        id
    }

    /// Channel state reconstructed after a seek
    pub fn subscribe_chased<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[ChannelMessage]) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.chased.add(id, Arc::new(listener));
        id
    }

    /// Safety messages (note offs, all sound off) produced by a stop
    pub fn subscribe_stopped<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[ChannelMessage]) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.stopped.add(id, Arc::new(listener));
        id
    }

    pub fn subscribe_completed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.completed.add(id, Arc::new(move |_: &()| listener()));
        id
    }

    /// Remove a listener from whichever stream it was registered on
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.channel.remove(id)
            || self.meta.remove(id)
            || self.sysex.remove(id)
            || self.chased.remove(id)
            || self.stopped.remove(id)
            || self.completed.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.channel.len()
            + self.meta.len()
            + self.sysex.len()
            + self.chased.len()
            + self.stopped.len()
            + self.completed.len()
    }

    /// Route a played message to its stream
    pub fn dispatch(&self, message: &MidiMessage) {
        match message {
            MidiMessage::Channel(channel) => self.dispatch_channel(channel),
            MidiMessage::Meta(meta) => self.dispatch_meta(meta),
            MidiMessage::SysEx(sysex) => self.dispatch_sysex(sysex),
        }
    }

    pub fn dispatch_channel(&self, message: &ChannelMessage) {
        self.fan_out("channel", &self.channel, message);
    }

    pub fn dispatch_meta(&self, message: &MetaMessage) {
        self.fan_out("meta", &self.meta, message);
    }

    pub fn dispatch_sysex(&self, message: &SysExMessage) {
        self.fan_out("sysex", &self.sysex, message);
    }

    pub fn chased(&self, messages: &[ChannelMessage]) {
        self.fan_out("chased", &self.chased, messages);
    }

    pub fn stopped(&self, messages: &[ChannelMessage]) {
        self.fan_out("stopped", &self.stopped, messages);
    }

    pub fn completed(&self) {
        self.fan_out("completed", &self.completed, &());
    }

    /// Report a failure on the side channel
    pub fn report(&self, notification: Notification) {
        self.notifications.push(notification);
    }

    fn fan_out<T: ?Sized>(&self, stream: &str, subscribers: &Subscribers<T>, value: &T) {
        let snapshot = subscribers.list.load();
        for (id, listener) in snapshot.iter() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener(value)));
            if let Err(payload) = result {
                let reason = panic_message(payload.as_ref());
                log::error!(
                    target: "Dispatcher",
                    "Listener {:?} on {} stream panicked: {}",
                    id,
                    stream,
                    reason
                );
                self.report(Notification::error(
                    NotificationCategory::Dispatch,
                    format!("{} listener panicked: {}", stream, reason),
                ));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
