//! Adapters implementing the domain ports against concrete backends.

pub mod broadcast;
pub mod email;
pub mod sqlite;
pub mod webhook;

pub use broadcast::{BroadcastPublisher, MONITOR_UPDATES_CHANNEL};
pub use email::SmtpEmailSink;
pub use webhook::HttpWebhookSink;
