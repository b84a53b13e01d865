//! Fatal invariant violations.
//!
//! Expected-operational outcomes (no fit at placement, idle transitions, an ordinary
//! non-required rejection) are never represented here — they are returned as plain `bool`/
//! `Option` values. Only the two conditions the source treats as assertion failures get a typed
//! error: a `required` request rejection aborts the run, and a ledger-inconsistent
//! `container.stop` is a programming error in the control plane's own bookkeeping.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("required request for vm `{vm_name}` was rejected")]
    RequiredRequestRejected { vm_name: String },

    #[error("container.stop delivered for a container not tracked on node `{node_name}`")]
    ContainerNodeMismatch { node_name: String },
}

/// A slot a bus-subscribed closure can use to signal a fatal error back to the driver.
///
/// `EventBus` handlers are plain `FnMut(P, Time)` with no return value (see `simcore`), so a
/// handler that detects an invariant violation — a required-request rejection, a mismatched
/// `container.stop` — has no direct way to make that failure propagate out of `run()`. It stores
/// the error here instead; `Simulation::step` checks the slot immediately after every
/// `EventBus::run_until` call and turns a stored error into `Err(SimError)`, the Rust analogue of
/// the source's raised exception unwinding out of the same call.
pub type FaultSlot = Rc<RefCell<Option<SimError>>>;

pub fn new_fault_slot() -> FaultSlot {
    Rc::new(RefCell::new(None))
}
