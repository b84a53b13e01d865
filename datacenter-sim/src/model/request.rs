//! User-submitted allocation requests and the zero-argument callbacks they carry.
//!
//! The source models `Request` as a dataclass extending a minimal `Action` base
//! (`{ARRIVAL, EXECUTE}`). Rust has no data inheritance, so `Action` holds the shared fields and
//! `Request` embeds it by composition, the same pattern used for `AppCore`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use simcore::Time;

use super::{Handle, Vm};

/// A shared, clonable handle around a zero-argument callback.
///
/// Event payloads must be `Clone` (the bus hands each subscriber an independent copy) and
/// `Debug`, neither of which `Box<dyn FnMut()>` can satisfy on its own. Wrapping it in
/// `Rc<RefCell<dyn FnMut()>>` makes the callback itself cheap to clone (one `Rc` bump) while
/// keeping a single underlying closure shared across every clone.
#[derive(Clone)]
pub struct Callback(Rc<RefCell<dyn FnMut()>>);

impl Callback {
    pub fn new(f: impl FnMut() + 'static) -> Self {
        Self(Rc::new(RefCell::new(f)))
    }

    pub fn call(&self) {
        (self.0.borrow_mut())()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<callback>")
    }
}

/// The base every user-submitted action shares: when it fires, and what runs when it does.
#[derive(Debug, Clone)]
pub struct Action {
    pub arrival: Time,
    pub execute: Option<Callback>,
}

/// A request to allocate `vm` at `arrival`. `required` escalates a rejection to a fatal
/// simulation error; `ignored` excludes the request from acceptance statistics.
#[derive(Debug, Clone)]
pub struct Request {
    pub action: Action,
    pub vm: Handle<Vm>,
    pub required: bool,
    pub ignored: bool,
    pub on_success: Option<Callback>,
    pub on_failure: Option<Callback>,
}

impl Request {
    pub fn new(arrival: Time, vm: Handle<Vm>) -> Self {
        Self {
            action: Action { arrival, execute: None },
            vm,
            required: false,
            ignored: false,
            on_success: None,
            on_failure: None,
        }
    }

    pub fn arrival(&self) -> Time {
        self.action.arrival
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn ignored(mut self, ignored: bool) -> Self {
        self.ignored = ignored;
        self
    }

    pub fn with_execute(mut self, f: impl FnMut() + 'static) -> Self {
        self.action.execute = Some(Callback::new(f));
        self
    }

    pub fn with_on_success(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_success = Some(Callback::new(f));
        self
    }

    pub fn with_on_failure(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_failure = Some(Callback::new(f));
        self
    }
}

/// The synthetic user driving a run: an ordered list of timestamped requests.
#[derive(Debug, Clone, Default)]
pub struct User {
    pub name: String,
    pub requests: Vec<Request>,
}

impl User {
    pub fn new(name: impl Into<String>, requests: Vec<Request>) -> Self {
        Self { name: name.into(), requests }
    }
}
