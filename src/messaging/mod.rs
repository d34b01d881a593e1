// Messaging - Side channel from the engine to its host

pub mod channels;
pub mod notification;

pub use channels::{
    NotificationConsumer, NotificationProducer, NotificationSink, create_notification_channel,
};
pub use notification::{Notification, NotificationCategory, NotificationLevel};
