//! Accessing the simulation's shared clock and event bus from components.

use std::cell::RefCell;
use std::rc::Rc;

use crate::clock::{Clock, Time};
use crate::event_bus::EventBus;
use crate::payload::Payload;

/// A facade for accessing the virtual clock and the event bus from simulation components.
///
/// Cheap to clone (two `Rc` bumps): every component that needs to read the time or
/// publish/subscribe holds its own `SimContext` rather than a reference to a single global.
/// `EventBus` carries its own interior mutability, so the bus itself is a bare `Rc<EventBus>` —
/// wrapping it in another `RefCell` here would let a handler publishing mid-dispatch re-enter a
/// borrow `run_until` is still holding on its way in.
#[derive(Clone)]
pub struct SimContext {
    bus: Rc<EventBus>,
    clock: Rc<RefCell<Clock>>,
}

impl SimContext {
    pub fn new() -> Self {
        Self {
            bus: Rc::new(EventBus::new()),
            clock: Rc::new(RefCell::new(Clock::new())),
        }
    }

    pub fn now(&self) -> Time {
        self.clock.borrow().now()
    }

    pub fn increase_clock(&self, delta: Time) {
        self.clock.borrow_mut().increase(delta);
    }

    pub fn reset_clock(&self) {
        self.clock.borrow_mut().reset();
    }

    pub fn publish<P: Payload>(&self, topic: &str, fire_at: Time, payload: P) {
        self.bus.publish(topic, fire_at, payload);
    }

    pub fn subscribe<P, F>(&self, topic: &str, handler: F)
    where
        P: Payload,
        F: FnMut(P, Time) + 'static,
    {
        self.bus.subscribe::<P, F>(topic, handler);
    }

    pub fn run_until(&self, now: Time) {
        self.bus.run_until(now);
    }

    pub fn bus_empty(&self) -> bool {
        self.bus.empty()
    }
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext").field("now", &self.now()).finish_non_exhaustive()
    }
}
