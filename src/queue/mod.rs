//! The spec's Work Broker (§2 item 4): a FIFO hand-off from the Scheduler
//! to the Worker pool with at-least-once delivery.

pub mod broker;
pub mod store;

pub use broker::{Broker, TicketEnvelope};
pub use store::{FjallQueue, QueueError, Ticket};
