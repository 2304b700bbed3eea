//! Pipeline stages for update detection and notification fanout.
//!
//! - `detect`: turn fresh chapter lists into new-chapter events
//! - `scheduler`: batched, concurrency-bounded polling cycles
//! - `dispatch`: bounded fanout of events to registered endpoints

pub mod detect;
pub mod dispatch;
pub mod scheduler;

pub use detect::{ChangeDetector, Detection};
pub use dispatch::{NotificationDispatcher, NotificationTransport, WebhookTransport};
pub use scheduler::PollScheduler;
