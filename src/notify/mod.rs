mod channel;
mod dispatch;
mod event;
mod throttle;

pub use channel::{EmailChannel, FileLogChannel, NotificationChannel, NotifyError};
pub use dispatch::{queue, NotificationDispatcher};
pub use event::NotificationEvent;
pub use throttle::{NotificationSender, NotificationThrottler};
