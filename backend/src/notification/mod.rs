//! Ride event notifications

pub mod model;
pub mod service;

pub use model::{Notification, RideEvent};
pub use service::{NotificationService, PushTransport};
