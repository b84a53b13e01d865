//! Virtual-time clock and topic-based event bus underlying the data center simulator.

pub mod clock;
pub mod context;
pub mod event_bus;
pub mod payload;

pub use clock::{Clock, Time};
pub use context::SimContext;
pub use event_bus::EventBus;
pub use payload::Payload;
